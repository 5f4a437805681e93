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

//! The ledger client seam. A session never talks to the network
//! directly; everything goes through a [`LedgerClient`].

use async_trait::async_trait;
use tinyjson::JsonValue;

use crate::{tx::TxEnvelope, Result};

/// JSON-RPC backed ledger client
pub mod rpc;
pub use rpc::RpcLedgerClient;

/// In-memory ledger used for dry runs
pub mod memory;
pub use memory::MemoryLedger;

/// Remote interface to a ledger node.
///
/// Errors returned from these methods are transport-level failures;
/// a ledger that received a transaction and rejected it reports that
/// through the result code of the broadcast acknowledgement instead.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Next expected transaction sequence number of an account.
    async fn account_sequence(&self, address: &str) -> Result<u64>;

    /// Submit a signed transaction and return the raw acknowledgement.
    /// Returns once the ledger has accepted or rejected the transaction
    /// for inclusion; does not wait for finality.
    async fn broadcast(&self, tx: &TxEnvelope) -> Result<JsonValue>;

    /// Run a read-only query against a contract and return the decoded
    /// response.
    async fn contract_query(&self, contract: &str, query: &JsonValue) -> Result<JsonValue>;
}
