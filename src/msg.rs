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

use std::collections::HashMap;

use tinyjson::JsonValue;

use crate::fee::{coins_to_json, Coin};

/// Messages understood by the ledger. Contract payloads (`init_msg`,
/// `msg`) are opaque JSON and are not validated against any schema.
#[derive(Clone, Debug, PartialEq)]
pub enum WasmMsg {
    /// Upload contract bytecode
    StoreCode { sender: String, wasm_byte_code: Vec<u8> },

    /// Create a contract instance from stored code
    InstantiateContract {
        sender: String,
        admin: Option<String>,
        code_id: u64,
        label: Option<String>,
        init_msg: JsonValue,
        funds: Vec<Coin>,
    },

    /// Send a state-changing message to a contract instance
    ExecuteContract { sender: String, contract: String, msg: JsonValue, funds: Vec<Coin> },

    /// Plain bank transfer
    Send { from_address: String, to_address: String, amount: Vec<Coin> },
}

impl WasmMsg {
    /// Message type tag used on the wire
    pub fn type_url(&self) -> &'static str {
        match self {
            Self::StoreCode { .. } => "wasm/MsgStoreCode",
            Self::InstantiateContract { .. } => "wasm/MsgInstantiateContract",
            Self::ExecuteContract { .. } => "wasm/MsgExecuteContract",
            Self::Send { .. } => "bank/MsgSend",
        }
    }

    /// Address the message is signed for
    pub fn signer(&self) -> &str {
        match self {
            Self::StoreCode { sender, .. } |
            Self::InstantiateContract { sender, .. } |
            Self::ExecuteContract { sender, .. } => sender,
            Self::Send { from_address, .. } => from_address,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        let s = |v: &str| JsonValue::String(v.to_string());

        let value = match self {
            Self::StoreCode { sender, wasm_byte_code } => HashMap::from([
                ("sender".to_string(), s(sender)),
                ("wasm_byte_code".to_string(), JsonValue::String(hex::encode(wasm_byte_code))),
            ]),

            Self::InstantiateContract { sender, admin, code_id, label, init_msg, funds } => {
                let mut map = HashMap::from([
                    ("sender".to_string(), s(sender)),
                    ("code_id".to_string(), JsonValue::String(code_id.to_string())),
                    ("init_msg".to_string(), init_msg.clone()),
                    ("funds".to_string(), coins_to_json(funds)),
                ]);
                if let Some(admin) = admin {
                    map.insert("admin".to_string(), s(admin));
                }
                if let Some(label) = label {
                    map.insert("label".to_string(), s(label));
                }
                map
            }

            Self::ExecuteContract { sender, contract, msg, funds } => HashMap::from([
                ("sender".to_string(), s(sender)),
                ("contract".to_string(), s(contract)),
                ("msg".to_string(), msg.clone()),
                ("funds".to_string(), coins_to_json(funds)),
            ]),

            Self::Send { from_address, to_address, amount } => HashMap::from([
                ("from_address".to_string(), s(from_address)),
                ("to_address".to_string(), s(to_address)),
                ("amount".to_string(), coins_to_json(amount)),
            ]),
        };

        JsonValue::Object(HashMap::from([
            ("type".to_string(), s(self.type_url())),
            ("value".to_string(), JsonValue::Object(value)),
        ]))
    }
}
