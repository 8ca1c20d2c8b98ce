// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Protected data access lifecycle.

pub mod controller;
pub mod state;
pub mod validate;

pub use controller::{
    AccessLifecycleController, ConsumeOutcome, DedupeFailure, DedupeReport, GrantOutcome,
    ProtectOutcome, SessionSettings, SETTLED_DRAFT_LIMIT,
};
pub use state::{FailureReason, LifecycleEntry, LifecycleKey, LifecycleState};
