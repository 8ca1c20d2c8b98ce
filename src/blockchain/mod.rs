// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet and network integration for the iExec Sidechain.
//!
//! This module provides functionality for:
//! - Talking to the user's wallet (chain id, account, switch and add chain)
//! - Keeping the wallet on the required network before privileged calls
//! - Following chain-change and disconnect notifications

pub mod client;
pub mod guard;
pub mod types;
pub mod wallet;

pub use client::RpcWallet;
pub use guard::ChainGuard;
pub use types::*;
pub use wallet::{
    WalletError, WalletEvent, WalletEvents, WalletProvider, UNRECOGNIZED_CHAIN_CODE,
    USER_REJECTED_CODE,
};
