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

//! A ledger that lives in memory. It verifies envelopes, assigns code
//! ids and contract addresses, and emits the same events a node would,
//! which makes it suitable for dry-running deployment plans.

use std::collections::HashMap;

use async_trait::async_trait;
use ed25519_compact::PublicKey;
use smol::lock::Mutex;
use tinyjson::JsonValue;
use tracing::debug;

use super::LedgerClient;
use crate::{identity::derive_address, msg::WasmMsg, tx::TxEnvelope, Error, Result};

// Result codes
pub const CODE_OK: u32 = 0;
pub const CODE_WRONG_CHAIN: u32 = 2;
pub const CODE_UNAUTHORIZED: u32 = 4;
pub const CODE_NOT_FOUND: u32 = 5;
pub const CODE_WRONG_SEQUENCE: u32 = 32;

#[derive(Clone, Debug)]
struct StoredContract {
    code_id: u64,
    admin: Option<String>,
    label: Option<String>,
    init_msg: JsonValue,
    executions: Vec<JsonValue>,
}

#[derive(Clone, Debug, Default)]
struct LedgerState {
    height: u64,
    /// BLAKE3 digests of stored code, indexed by `code_id - 1`
    codes: Vec<blake3::Hash>,
    contracts: HashMap<String, StoredContract>,
    sequences: HashMap<String, u64>,
    instances: u64,
}

/// In-memory ledger
pub struct MemoryLedger {
    chain_id: String,
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new(chain_id: &str) -> Self {
        Self { chain_id: chain_id.to_string(), state: Mutex::new(LedgerState::default()) }
    }

    /// Number of code uploads accepted so far
    pub async fn code_count(&self) -> usize {
        self.state.lock().await.codes.len()
    }

    /// Whether a contract instance exists at `address`
    pub async fn has_contract(&self, address: &str) -> bool {
        self.state.lock().await.contracts.contains_key(address)
    }

    fn rejection(txhash: &str, height: u64, code: u32, log: String) -> JsonValue {
        JsonValue::Object(HashMap::from([
            ("height".to_string(), JsonValue::Number(height as f64)),
            ("txhash".to_string(), JsonValue::String(txhash.to_string())),
            ("code".to_string(), JsonValue::Number(code as f64)),
            ("raw_log".to_string(), JsonValue::String(log)),
            ("logs".to_string(), JsonValue::Array(vec![])),
        ]))
    }

    /// Apply a single message to the staged state, returning its events.
    fn apply(
        state: &mut LedgerState,
        msg: &WasmMsg,
    ) -> std::result::Result<Vec<JsonValue>, (u32, String)> {
        match msg {
            WasmMsg::StoreCode { sender, wasm_byte_code } => {
                state.codes.push(blake3::hash(wasm_byte_code));
                let code_id = state.codes.len() as u64;
                Ok(vec![event(
                    "store_code",
                    &[("sender", sender.clone()), ("code_id", code_id.to_string())],
                )])
            }

            WasmMsg::InstantiateContract { sender, admin, code_id, label, init_msg, .. } => {
                if *code_id == 0 || *code_id > state.codes.len() as u64 {
                    return Err((CODE_NOT_FOUND, format!("code id {code_id} not found")))
                }

                state.instances += 1;
                let mut hasher = blake3::Hasher::new();
                hasher.update(b"contract");
                hasher.update(&code_id.to_le_bytes());
                hasher.update(&state.instances.to_le_bytes());
                let address = bs58::encode(&hasher.finalize().as_bytes()[..20]).into_string();

                state.contracts.insert(
                    address.clone(),
                    StoredContract {
                        code_id: *code_id,
                        admin: admin.clone(),
                        label: label.clone(),
                        init_msg: init_msg.clone(),
                        executions: vec![],
                    },
                );

                Ok(vec![event(
                    "instantiate_contract",
                    &[
                        ("owner", sender.clone()),
                        ("code_id", code_id.to_string()),
                        ("contract_address", address),
                    ],
                )])
            }

            WasmMsg::ExecuteContract { sender, contract, msg, .. } => {
                let Some(stored) = state.contracts.get_mut(contract) else {
                    return Err((CODE_NOT_FOUND, format!("contract {contract} not found")))
                };
                stored.executions.push(msg.clone());

                Ok(vec![event(
                    "execute_contract",
                    &[("sender", sender.clone()), ("contract_address", contract.clone())],
                )])
            }

            WasmMsg::Send { from_address, to_address, amount } => {
                let amount: Vec<String> = amount.iter().map(|c| c.to_string()).collect();
                Ok(vec![event(
                    "transfer",
                    &[
                        ("sender", from_address.clone()),
                        ("recipient", to_address.clone()),
                        ("amount", amount.join(",")),
                    ],
                )])
            }
        }
    }
}

fn event(kind: &str, attributes: &[(&str, String)]) -> JsonValue {
    let attributes = attributes
        .iter()
        .map(|(k, v)| {
            JsonValue::Object(HashMap::from([
                ("key".to_string(), JsonValue::String(k.to_string())),
                ("value".to_string(), JsonValue::String(v.clone())),
            ]))
        })
        .collect();

    JsonValue::Object(HashMap::from([
        ("type".to_string(), JsonValue::String(kind.to_string())),
        ("attributes".to_string(), JsonValue::Array(attributes)),
    ]))
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn account_sequence(&self, address: &str) -> Result<u64> {
        Ok(self.state.lock().await.sequences.get(address).copied().unwrap_or(0))
    }

    async fn broadcast(&self, tx: &TxEnvelope) -> Result<JsonValue> {
        let txhash = tx.hash()?;
        let mut state = self.state.lock().await;
        let height = state.height + 1;

        if tx.body.chain_id != self.chain_id {
            let log = format!("chain id {} does not match {}", tx.body.chain_id, self.chain_id);
            return Ok(Self::rejection(&txhash, height, CODE_WRONG_CHAIN, log))
        }

        if tx.verify().is_err() {
            let log = "signature verification failed".to_string();
            return Ok(Self::rejection(&txhash, height, CODE_UNAUTHORIZED, log))
        }

        let pk = PublicKey::from_slice(&hex::decode(&tx.public_key)?)?;
        let signer = derive_address(&pk);
        if let Some(msg) = tx.body.messages.iter().find(|m| m.signer() != signer) {
            let log = format!("{} is not authorized to sign for {}", signer, msg.signer());
            return Ok(Self::rejection(&txhash, height, CODE_UNAUTHORIZED, log))
        }

        let expected = state.sequences.get(&signer).copied().unwrap_or(0);
        if tx.body.sequence != expected {
            let got = tx.body.sequence;
            let log = format!("incorrect account sequence: expected {expected}, got {got}");
            return Ok(Self::rejection(&txhash, height, CODE_WRONG_SEQUENCE, log))
        }

        // Messages apply atomically: work on a copy, commit on success.
        let mut staged = state.clone();
        let mut logs = vec![];
        for (i, msg) in tx.body.messages.iter().enumerate() {
            match Self::apply(&mut staged, msg) {
                Ok(events) => logs.push(JsonValue::Object(HashMap::from([
                    ("msg_index".to_string(), JsonValue::Number(i as f64)),
                    ("events".to_string(), JsonValue::Array(events)),
                ]))),
                Err((code, log)) => {
                    let log = format!("failed to execute message; message index: {i}: {log}");
                    return Ok(Self::rejection(&txhash, height, code, log))
                }
            }
        }

        staged.height = height;
        staged.sequences.insert(signer, expected + 1);
        *state = staged;

        debug!(target: "wasmdeploy::ledger::memory", "Accepted {txhash} at height {height}");

        Ok(JsonValue::Object(HashMap::from([
            ("height".to_string(), JsonValue::Number(height as f64)),
            ("txhash".to_string(), JsonValue::String(txhash)),
            ("code".to_string(), JsonValue::Number(CODE_OK as f64)),
            ("raw_log".to_string(), JsonValue::String(String::new())),
            ("logs".to_string(), JsonValue::Array(logs)),
        ])))
    }

    async fn contract_query(&self, contract: &str, query: &JsonValue) -> Result<JsonValue> {
        let state = self.state.lock().await;
        let Some(stored) = state.contracts.get(contract) else {
            return Err(Error::ContractNotFound(contract.to_string()))
        };

        let opt = |v: &Option<String>| match v {
            Some(s) => JsonValue::String(s.clone()),
            None => JsonValue::Null,
        };

        Ok(JsonValue::Object(HashMap::from([
            ("code_id".to_string(), JsonValue::Number(stored.code_id as f64)),
            ("admin".to_string(), opt(&stored.admin)),
            ("label".to_string(), opt(&stored.label)),
            ("init_msg".to_string(), stored.init_msg.clone()),
            ("executions".to_string(), JsonValue::Number(stored.executions.len() as f64)),
            ("query".to_string(), query.clone()),
        ])))
    }
}
