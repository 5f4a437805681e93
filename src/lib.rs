/* This file is part of DarkFi (https://dark.fi)
 *
 * Copyright (C) 2020-2025 Dyne.org foundation
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Deployment sessions for smart-contract ledgers following the
//! store-code / instantiate / execute / query model.
//!
//! A [`session::DeploySession`] wraps a [`ledger::LedgerClient`] and an
//! [`identity::Identity`], submits signed transactions through a
//! [`submitter::TxSubmitter`] and keeps a registry of what has been
//! deployed so far, so later steps of a script can reference the code
//! ids and contract addresses produced by earlier ones.

/// Error codes and call outcomes
pub mod error;
pub use error::{CallFailure, CallResult, Error, FailureKind, Result};

/// Coins and fee policies
pub mod fee;

/// Signing identities
pub mod identity;

/// Ledger messages
pub mod msg;

/// Transaction bodies, envelopes and broadcast acknowledgements
pub mod tx;

/// JSON-RPC 2.0 client-side implementation
pub mod rpc;

/// Ledger client interface and implementations
pub mod ledger;

/// Transaction submission
pub mod submitter;

/// Extraction of typed values from raw ledger payloads
pub mod extract;

/// Persistent artifact bookkeeping
pub mod registry;

/// Deployment session
pub mod session;

/// Deployment plans made of named steps
pub mod plan;

/// Various utility functions
pub mod util;
