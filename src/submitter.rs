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

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    error::{CallFailure, CallResult, FailureKind},
    fee::FeePolicy,
    identity::Identity,
    ledger::LedgerClient,
    msg::WasmMsg,
    tx::{TxBody, TxResponse},
};

/// Builds, signs and broadcasts transactions on behalf of one identity.
///
/// Submission returns once the ledger acknowledges the broadcast. There
/// is no finality polling and no automatic retry.
pub struct TxSubmitter {
    ledger: Arc<dyn LedgerClient>,
    identity: Identity,
    chain_id: String,
    memo: String,
    fee: FeePolicy,
}

impl TxSubmitter {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        identity: Identity,
        chain_id: &str,
        fee: FeePolicy,
    ) -> Self {
        Self { ledger, identity, chain_id: chain_id.to_string(), memo: String::new(), fee }
    }

    /// Attach a memo to every transaction submitted from now on.
    pub fn with_memo(mut self, memo: &str) -> Self {
        self.memo = memo.to_string();
        self
    }

    /// Account address of the signing identity
    pub fn address(&self) -> &str {
        self.identity.address()
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Session default fee policy
    pub fn fee(&self) -> &FeePolicy {
        &self.fee
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    /// Sign and broadcast `messages` as one transaction. `fee` overrides
    /// the default fee policy for this call only.
    pub async fn submit(
        &self,
        messages: Vec<WasmMsg>,
        fee: Option<&FeePolicy>,
    ) -> CallResult<TxResponse> {
        let fee = fee.unwrap_or(&self.fee).clone();

        let sequence = match self.ledger.account_sequence(self.address()).await {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "wasmdeploy::submitter", "Failed fetching account sequence: {e}");
                return Err(CallFailure::transport(&e))
            }
        };

        let body = TxBody {
            chain_id: self.chain_id.clone(),
            sequence,
            messages,
            fee,
            memo: self.memo.clone(),
        };

        let envelope = body.sign(&self.identity).map_err(|e| CallFailure::signing(&e))?;
        let txhash = envelope.hash().map_err(|e| CallFailure::signing(&e))?;
        debug!(target: "wasmdeploy::submitter", "Broadcasting {txhash} (sequence {sequence})");

        let raw = match self.ledger.broadcast(&envelope).await {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "wasmdeploy::submitter", "Broadcast of {txhash} failed: {e}");
                return Err(CallFailure::transport(&e))
            }
        };

        let response = match TxResponse::try_from(&raw) {
            Ok(v) => v,
            Err(e) => return Err(CallFailure::malformed(e.to_string(), raw)),
        };

        if !response.is_success() {
            warn!(
                target: "wasmdeploy::submitter",
                "Transaction {} rejected with code {}: {}",
                response.txhash, response.code, response.raw_log,
            );
            return Err(CallFailure::with_raw(
                FailureKind::ChainRejected,
                format!("code {}: {}", response.code, response.raw_log),
                raw,
            ))
        }

        info!(target: "wasmdeploy::submitter", "Transaction {} accepted", response.txhash);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use tinyjson::JsonValue;

    use super::*;
    use crate::{tx::TxEnvelope, Error, Result};

    /// Ledger returning a fixed broadcast reply
    struct Fixed {
        sequence: Result<u64>,
        reply: Result<JsonValue>,
    }

    #[async_trait]
    impl LedgerClient for Fixed {
        async fn account_sequence(&self, _address: &str) -> Result<u64> {
            self.sequence.clone()
        }

        async fn broadcast(&self, tx: &TxEnvelope) -> Result<JsonValue> {
            tx.verify()?;
            self.reply.clone()
        }

        async fn contract_query(&self, _c: &str, _q: &JsonValue) -> Result<JsonValue> {
            Ok(JsonValue::Null)
        }
    }

    fn submitter(sequence: Result<u64>, reply: Result<JsonValue>) -> TxSubmitter {
        TxSubmitter::new(
            Arc::new(Fixed { sequence, reply }),
            Identity::from_seed([9u8; 32]),
            "testnet",
            FeePolicy::default(),
        )
    }

    fn send(s: &TxSubmitter) -> Vec<WasmMsg> {
        vec![WasmMsg::Send {
            from_address: s.address().to_string(),
            to_address: "someone".to_string(),
            amount: vec![],
        }]
    }

    fn reply(code: f64) -> JsonValue {
        JsonValue::Object(HashMap::from([
            ("txhash".to_string(), JsonValue::String("ab".to_string())),
            ("code".to_string(), JsonValue::Number(code)),
            ("raw_log".to_string(), JsonValue::String("out of gas".to_string())),
        ]))
    }

    #[test]
    fn classify_outcomes() {
        smol::block_on(async {
            let s = submitter(Ok(3), Ok(reply(0.0)));
            let rep = s.submit(send(&s), None).await.unwrap();
            assert_eq!(rep.txhash, "ab");

            let s = submitter(Ok(3), Ok(reply(11.0)));
            let err = s.submit(send(&s), None).await.unwrap_err();
            assert_eq!(err.kind, FailureKind::ChainRejected);
            assert_eq!(err.raw, Some(reply(11.0)));

            let s = submitter(Err(Error::ConnectFailed), Ok(reply(0.0)));
            let err = s.submit(send(&s), None).await.unwrap_err();
            assert_eq!(err.kind, FailureKind::Transport);
            assert!(err.raw.is_none());

            let s = submitter(Ok(0), Err(Error::NetworkOperationFailed));
            let err = s.submit(send(&s), None).await.unwrap_err();
            assert_eq!(err.kind, FailureKind::Transport);

            let s = submitter(Ok(0), Ok(JsonValue::String("accepted".to_string())));
            let err = s.submit(send(&s), None).await.unwrap_err();
            assert_eq!(err.kind, FailureKind::Malformed);
            assert_eq!(err.raw, Some(JsonValue::String("accepted".to_string())));
        });
    }

    #[test]
    fn unencodable_body_is_a_signing_failure() {
        smol::block_on(async {
            let s = submitter(Ok(0), Ok(reply(0.0)));
            let msg = WasmMsg::ExecuteContract {
                sender: s.address().to_string(),
                contract: "a".to_string(),
                msg: JsonValue::Object(HashMap::from([(
                    "x".to_string(),
                    JsonValue::Number(f64::NAN),
                )])),
                funds: vec![],
            };

            let err = s.submit(vec![msg], None).await.unwrap_err();
            assert_eq!(err.kind, FailureKind::Signing);
            assert!(err.raw.is_none());
        });
    }
}
