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

//! Transaction bodies, signed envelopes and broadcast acknowledgements.
//!
//! The signature covers the canonical encoding of the body: its JSON
//! representation with object keys sorted and no insignificant
//! whitespace. Ledgers recompute the same encoding to verify.

use std::collections::HashMap;

use tinyjson::JsonValue;

use crate::{
    error::RpcError,
    fee::FeePolicy,
    identity::{verify_signature, Identity},
    msg::WasmMsg,
    Result,
};

/// Unsigned transaction contents
#[derive(Clone, Debug, PartialEq)]
pub struct TxBody {
    pub chain_id: String,
    pub sequence: u64,
    pub messages: Vec<WasmMsg>,
    pub fee: FeePolicy,
    pub memo: String,
}

impl TxBody {
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(HashMap::from([
            ("chain_id".to_string(), JsonValue::String(self.chain_id.clone())),
            ("sequence".to_string(), JsonValue::String(self.sequence.to_string())),
            (
                "messages".to_string(),
                JsonValue::Array(self.messages.iter().map(WasmMsg::to_json).collect()),
            ),
            ("fee".to_string(), self.fee.to_json()),
            ("memo".to_string(), JsonValue::String(self.memo.clone())),
        ]))
    }

    /// Bytes covered by the signature
    pub fn sign_bytes(&self) -> Result<Vec<u8>> {
        Ok(canonical_json(&self.to_json())?.into_bytes())
    }

    /// Sign the body with the given identity, producing a broadcastable
    /// envelope.
    pub fn sign(self, identity: &Identity) -> Result<TxEnvelope> {
        let signature = identity.sign(&self.sign_bytes()?)?;
        Ok(TxEnvelope {
            body: self,
            public_key: identity.public_key_hex(),
            signature: hex::encode(*signature),
        })
    }
}

/// A signed transaction
#[derive(Clone, Debug, PartialEq)]
pub struct TxEnvelope {
    pub body: TxBody,
    /// Hex-encoded signer public key
    pub public_key: String,
    /// Hex-encoded signature over [`TxBody::sign_bytes`]
    pub signature: String,
}

impl TxEnvelope {
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(HashMap::from([
            ("body".to_string(), self.body.to_json()),
            ("public_key".to_string(), JsonValue::String(self.public_key.clone())),
            ("signature".to_string(), JsonValue::String(self.signature.clone())),
        ]))
    }

    /// Check the signature against the embedded public key.
    pub fn verify(&self) -> Result<()> {
        verify_signature(&self.public_key, &self.body.sign_bytes()?, &self.signature)
    }

    /// Hash identifying this transaction: BLAKE3 over the canonical
    /// envelope encoding, hex-encoded.
    pub fn hash(&self) -> Result<String> {
        let encoded = canonical_json(&self.to_json())?;
        Ok(blake3::hash(encoded.as_bytes()).to_hex().to_string())
    }
}

/// Broadcast acknowledgement returned by the ledger. This is not a
/// finality confirmation.
#[derive(Clone, Debug, PartialEq)]
pub struct TxResponse {
    pub txhash: String,
    /// Result code, zero on success
    pub code: u32,
    pub raw_log: String,
    /// The full acknowledgement as received
    pub raw: JsonValue,
}

impl TxResponse {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

impl TryFrom<&JsonValue> for TxResponse {
    type Error = RpcError;

    fn try_from(value: &JsonValue) -> std::result::Result<Self, Self::Error> {
        let Some(map) = value.get::<HashMap<String, JsonValue>>() else {
            return Err(RpcError::InvalidJson("Broadcast reply is not an Object".to_string()))
        };

        let Some(JsonValue::String(txhash)) = map.get("txhash") else {
            return Err(RpcError::InvalidJson(
                "Broadcast reply does not contain valid \"txhash\" field".to_string(),
            ))
        };

        let code = match map.get("code") {
            None | Some(JsonValue::Null) => 0,
            Some(JsonValue::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => *n as u32,
            Some(_) => {
                return Err(RpcError::InvalidJson(
                    "Broadcast reply does not contain valid \"code\" field".to_string(),
                ))
            }
        };

        let raw_log = match map.get("raw_log") {
            Some(JsonValue::String(s)) => s.clone(),
            _ => String::new(),
        };

        Ok(Self { txhash: txhash.clone(), code, raw_log, raw: value.clone() })
    }
}

/// Encode a JSON value with object keys sorted and no whitespace.
pub fn canonical_json(value: &JsonValue) -> Result<String> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &JsonValue, out: &mut String) -> Result<()> {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&JsonValue::String(key.clone()).stringify()?);
                out.push(':');
                write_canonical(&map[key], out)?;
            }
            out.push('}');
        }

        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }

        scalar => out.push_str(&scalar.stringify()?),
    }

    Ok(())
}
