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

use std::time::Duration;

use async_trait::async_trait;
use tinyjson::JsonValue;
use tracing::{debug, info};
use url::Url;

use super::LedgerClient;
use crate::{
    rpc::{client::RpcClient, jsonrpc::JsonRequest},
    tx::TxEnvelope,
    Error, Result,
};

/// Ledger client speaking JSON-RPC to a node:
///
/// * `auth.account_sequence [address]` -> number
/// * `tx.broadcast_sync [envelope]` -> broadcast acknowledgement
/// * `wasm.contract_query [contract, query]` -> query response
pub struct RpcLedgerClient {
    rpc_client: RpcClient,
}

impl RpcLedgerClient {
    pub async fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let rpc_client = RpcClient::with_timeout(endpoint.clone(), timeout).await?;
        info!(target: "wasmdeploy::ledger", "Connected to ledger node: {endpoint}");
        Ok(Self { rpc_client })
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn account_sequence(&self, address: &str) -> Result<u64> {
        let req = JsonRequest::new(
            "auth.account_sequence",
            JsonValue::Array(vec![JsonValue::String(address.to_string())]),
        );

        match self.rpc_client.request(req).await? {
            JsonValue::Number(n) if n >= 0.0 && n.fract() == 0.0 => Ok(n as u64),
            JsonValue::String(s) => Ok(s.parse()?),
            _ => Err(Error::ParseFailed("Invalid account sequence in reply")),
        }
    }

    async fn broadcast(&self, tx: &TxEnvelope) -> Result<JsonValue> {
        debug!(target: "wasmdeploy::ledger", "Broadcasting transaction {}", tx.hash()?);
        let req = JsonRequest::new("tx.broadcast_sync", JsonValue::Array(vec![tx.to_json()]));
        self.rpc_client.request(req).await
    }

    async fn contract_query(&self, contract: &str, query: &JsonValue) -> Result<JsonValue> {
        let req = JsonRequest::new(
            "wasm.contract_query",
            JsonValue::Array(vec![JsonValue::String(contract.to_string()), query.clone()]),
        );
        self.rpc_client.request(req).await
    }
}
