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

use std::{fmt, path::Path};

use smol::lock::Mutex;
use tinyjson::JsonValue;
use tracing::{debug, info};

use crate::{
    error::{CallFailure, CallResult, FailureKind, RpcError},
    extract::{extract_code_id, extract_contract_address, extract_query_payload},
    fee::{Coin, FeePolicy},
    msg::WasmMsg,
    registry::{ArtifactRegistry, ArtifactStage, DeployedArtifact},
    submitter::TxSubmitter,
    tx::TxResponse,
    Error, Result,
};

/// Target of an execute or query call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContractRef {
    /// Logical name, resolved through the artifact registry
    Name(String),
    /// Literal contract address, used as given
    Address(String),
}

impl ContractRef {
    pub fn name(name: &str) -> Self {
        Self::Name(name.to_string())
    }

    pub fn address(address: &str) -> Self {
        Self::Address(address.to_string())
    }
}

impl fmt::Display for ContractRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(n) => write!(f, "\"{n}\""),
            Self::Address(a) => write!(f, "{a}"),
        }
    }
}

/// Optional parameters of an instantiation
#[derive(Clone, Debug, Default)]
pub struct InstantiateOptions {
    pub admin: Option<String>,
    /// Instance label, defaults to the logical name
    pub label: Option<String>,
    pub funds: Vec<Coin>,
    /// Overrides the session fee policy
    pub fee: Option<FeePolicy>,
}

/// A deployment session: one identity, one ledger, and the record of
/// everything deployed through it.
///
/// Operations return [`CallResult`]s. A failed call leaves the registry
/// exactly as it was before the call, so a script can inspect the
/// failure and carry on from the last successful step.
pub struct DeploySession {
    submitter: TxSubmitter,
    registry: Mutex<ArtifactRegistry>,
}

impl DeploySession {
    pub fn new(submitter: TxSubmitter) -> Self {
        Self { submitter, registry: Mutex::new(ArtifactRegistry::new()) }
    }

    /// Start from a previously saved registry.
    pub fn with_registry(mut self, registry: ArtifactRegistry) -> Self {
        self.registry = Mutex::new(registry);
        self
    }

    /// Account address the session signs with
    pub fn address(&self) -> &str {
        self.submitter.address()
    }

    pub async fn artifact(&self, name: &str) -> Option<DeployedArtifact> {
        self.registry.lock().await.get(name).cloned()
    }

    pub async fn artifacts(&self) -> Vec<DeployedArtifact> {
        self.registry.lock().await.artifacts()
    }

    pub async fn stage(&self, name: &str) -> ArtifactStage {
        match self.registry.lock().await.get(name) {
            Some(a) => a.stage(),
            None => ArtifactStage::Unknown,
        }
    }

    pub async fn save_registry(&self, path: &Path) -> Result<()> {
        let registry = self.registry.lock().await.clone();
        registry.save(path)
    }

    /// Turn a contract reference into an address.
    pub async fn resolve(&self, target: &ContractRef) -> CallResult<String> {
        match target {
            ContractRef::Address(a) => Ok(a.clone()),
            ContractRef::Name(n) => {
                let registry = self.registry.lock().await;
                let address = registry.get(n).and_then(|a| a.address()).map(String::from);
                address.ok_or_else(|| CallFailure::unknown_contract(n))
            }
        }
    }

    /// Upload contract bytecode and record the assigned code id under
    /// `name`.
    pub async fn store_contract(&self, name: &str, wasm: &[u8]) -> CallResult<u64> {
        info!(target: "wasmdeploy::session", "Storing \"{name}\" ({} bytes)", wasm.len());

        let msg = WasmMsg::StoreCode {
            sender: self.address().to_string(),
            wasm_byte_code: wasm.to_vec(),
        };

        let rep = self.submitter.submit(vec![msg], None).await?;
        let code_id = extract_code_id(&rep.raw)?;

        self.registry.lock().await.entry(name).set_code_id(code_id);
        info!(target: "wasmdeploy::session", "Stored \"{name}\" as code id {code_id}");
        Ok(code_id)
    }

    /// Read bytecode from `path` and store it.
    pub async fn store_contract_file(&self, name: &str, path: &Path) -> CallResult<u64> {
        let wasm = smol::fs::read(path).await.map_err(|e| {
            CallFailure::precondition(format!("cannot read bytecode from {path:?}: {e}"))
        })?;
        self.store_contract(name, &wasm).await
    }

    /// Instantiate a contract. Without an explicit `code_id`, the one
    /// recorded for `name` is used.
    pub async fn instantiate_contract(
        &self,
        name: &str,
        code_id: Option<u64>,
        init_msg: JsonValue,
    ) -> CallResult<String> {
        self.instantiate_contract_with(name, code_id, init_msg, InstantiateOptions::default()).await
    }

    pub async fn instantiate_contract_with(
        &self,
        name: &str,
        code_id: Option<u64>,
        init_msg: JsonValue,
        options: InstantiateOptions,
    ) -> CallResult<String> {
        let recorded = self.registry.lock().await.get(name).and_then(|a| a.code_id());
        let Some(code_id) = code_id.or(recorded) else {
            return Err(CallFailure::precondition(format!(
                "no code id recorded or supplied for \"{name}\""
            )))
        };

        info!(target: "wasmdeploy::session", "Instantiating \"{name}\" from code id {code_id}");

        let msg = WasmMsg::InstantiateContract {
            sender: self.address().to_string(),
            admin: options.admin,
            code_id,
            label: Some(options.label.unwrap_or_else(|| name.to_string())),
            init_msg,
            funds: options.funds,
        };

        let rep = self.submitter.submit(vec![msg], options.fee.as_ref()).await?;
        let address = extract_contract_address(&rep.raw)?;

        self.registry.lock().await.entry(name).set_instance(code_id, &address);
        info!(target: "wasmdeploy::session", "Instantiated \"{name}\" at {address}");
        Ok(address)
    }

    pub async fn execute_contract(
        &self,
        target: &ContractRef,
        msg: JsonValue,
    ) -> CallResult<TxResponse> {
        self.execute_contract_with(target, msg, vec![], None).await
    }

    /// Execute `msg` against a contract, attaching `funds`. The registry
    /// is not modified.
    pub async fn execute_contract_with(
        &self,
        target: &ContractRef,
        msg: JsonValue,
        funds: Vec<Coin>,
        fee: Option<&FeePolicy>,
    ) -> CallResult<TxResponse> {
        let contract = self.resolve(target).await?;
        info!(target: "wasmdeploy::session", "Executing on {target} ({contract})");

        let msg = WasmMsg::ExecuteContract {
            sender: self.address().to_string(),
            contract,
            msg,
            funds,
        };

        self.submitter.submit(vec![msg], fee).await
    }

    /// Read-only query. Every call contacts the ledger.
    pub async fn query_contract(
        &self,
        target: &ContractRef,
        msg: &JsonValue,
    ) -> CallResult<JsonValue> {
        let contract = self.resolve(target).await?;
        debug!(target: "wasmdeploy::session", "Querying {target} ({contract})");

        match self.submitter.ledger().contract_query(&contract, msg).await {
            Ok(raw) => Ok(extract_query_payload(raw)),
            Err(e) => Err(query_failure(&e)),
        }
    }

    /// Bank transfer from the session account.
    pub async fn send_funds(&self, to: &str, amount: Vec<Coin>) -> CallResult<TxResponse> {
        if amount.is_empty() {
            return Err(CallFailure::precondition("nothing to send"))
        }

        info!(target: "wasmdeploy::session", "Sending {amount:?} to {to}");

        let msg = WasmMsg::Send {
            from_address: self.address().to_string(),
            to_address: to.to_string(),
            amount,
        };

        self.submitter.submit(vec![msg], None).await
    }
}

/// A node that answered but refused the query rejected it; anything
/// else is a transport problem.
fn query_failure(err: &Error) -> CallFailure {
    match err {
        Error::ContractNotFound(_) | Error::RpcClientError(RpcError::ServerError(..)) => {
            CallFailure::new(FailureKind::ChainRejected, err.to_string())
        }
        _ => CallFailure::transport(err),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{identity::Identity, ledger::MemoryLedger};

    fn session() -> DeploySession {
        let ledger = Arc::new(MemoryLedger::new("testnet"));
        let identity = Identity::from_seed([4u8; 32]);
        let submitter = TxSubmitter::new(ledger, identity, "testnet", FeePolicy::default());
        DeploySession::new(submitter)
    }

    #[test]
    fn full_lifecycle_on_memory_ledger() {
        smol::block_on(async {
            let s = session();

            let code_id = s.store_contract("vault", b"\0asm-vault").await.unwrap();
            assert_eq!(s.stage("vault").await, ArtifactStage::CodeStored(code_id));

            let init: JsonValue = r#"{"owner":"me"}"#.parse().unwrap();
            let addr = s.instantiate_contract("vault", None, init.clone()).await.unwrap();
            assert_eq!(s.resolve(&ContractRef::name("vault")).await.unwrap(), addr);

            let msg: JsonValue = r#"{"deposit":{}}"#.parse().unwrap();
            s.execute_contract(&ContractRef::name("vault"), msg).await.unwrap();

            let q: JsonValue = r#"{"state":{}}"#.parse().unwrap();
            let rep = s.query_contract(&ContractRef::address(&addr), &q).await.unwrap();
            let JsonValue::Object(rep) = rep else { panic!("query reply is not an object") };
            assert_eq!(rep["init_msg"], init);
            assert_eq!(rep["label"], JsonValue::String("vault".to_string()));
            assert_eq!(rep["executions"], JsonValue::Number(1.0));
        });
    }

    #[test]
    fn chain_rejection_keeps_registry() {
        smol::block_on(async {
            let s = session();

            // Unknown code id is rejected by the ledger
            let err = s
                .instantiate_contract("ghost", Some(99), JsonValue::Object(Default::default()))
                .await
                .unwrap_err();
            assert_eq!(err.kind, FailureKind::ChainRejected);
            assert!(err.raw.is_some());
            assert!(s.artifact("ghost").await.is_none());

            let err = s
                .query_contract(&ContractRef::address("nowhere"), &JsonValue::Null)
                .await
                .unwrap_err();
            assert_eq!(err.kind, FailureKind::ChainRejected);
        });
    }

    #[test]
    fn send_requires_coins() {
        smol::block_on(async {
            let s = session();
            let err = s.send_funds("someone", vec![]).await.unwrap_err();
            assert_eq!(err.kind, FailureKind::Precondition);

            s.send_funds("someone", vec![Coin::new(5, "uluna")]).await.unwrap();
        });
    }

    #[test]
    fn unreadable_bytecode_is_a_precondition() {
        smol::block_on(async {
            let s = session();
            let err = s
                .store_contract_file("x", Path::new("/nonexistent/contract.wasm"))
                .await
                .unwrap_err();
            assert_eq!(err.kind, FailureKind::Precondition);
            assert_eq!(s.stage("x").await, ArtifactStage::Unknown);
        });
    }
}
