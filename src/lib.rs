// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational DataGuard - Protected Email Access Service
//!
//! Keeps the user's wallet on the iExec Sidechain and drives protected email
//! addresses through protection, grants, consumption and revocation against
//! the confidential-computing gateway.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `blockchain` - Wallet integration and chain synchronization
//! - `protector` - Data protector operation set and wire types
//! - `providers` - HTTP adapters for the gateway and the user registry
//! - `store` - Network-checked gateway access
//! - `lifecycle` - Per-record access lifecycle
//! - `directory` - Contacts the user may email

pub mod api;
pub mod blockchain;
pub mod config;
pub mod directory;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod protector;
pub mod providers;
pub mod state;
pub mod store;

#[cfg(test)]
mod test_support;
