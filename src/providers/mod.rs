// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP clients for the external collaborators.

pub mod dataprotector;
pub mod registry;

pub use dataprotector::HttpDataProtector;
pub use registry::{HttpRegistry, RegistryError, UserRegistry};
