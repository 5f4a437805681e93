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

//! Pure functions turning raw ledger payloads into typed values.
//!
//! Broadcast acknowledgements carry events either per message under
//! `logs[*].events[*]` or flattened under a top-level `events` array.
//! Each event is `{"type": .., "attributes": [{"key": .., "value": ..}]}`.

use std::collections::HashMap;

use tinyjson::JsonValue;

use crate::error::{CallFailure, CallResult};

/// Event types emitted when code is stored
const STORE_EVENTS: &[&str] = &["store_code"];
const CODE_ID_KEYS: &[&str] = &["code_id"];

/// Event types emitted when a contract is instantiated
const INSTANTIATE_EVENTS: &[&str] = &["instantiate_contract", "instantiate"];
const ADDRESS_KEYS: &[&str] = &["contract_address", "_contract_address"];

/// Collect every event object in a raw acknowledgement.
fn events(raw: &JsonValue) -> Vec<&HashMap<String, JsonValue>> {
    let mut ret = vec![];
    let Some(map) = raw.get::<HashMap<String, JsonValue>>() else { return ret };

    if let Some(JsonValue::Array(logs)) = map.get("logs") {
        for log in logs {
            let events = log.get::<HashMap<String, JsonValue>>().and_then(|l| l.get("events"));
            let Some(JsonValue::Array(evs)) = events else { continue };
            ret.extend(evs.iter().filter_map(|e| e.get::<HashMap<String, JsonValue>>()));
        }
    }

    if let Some(JsonValue::Array(evs)) = map.get("events") {
        ret.extend(evs.iter().filter_map(|e| e.get::<HashMap<String, JsonValue>>()));
    }

    ret
}

/// Find the first attribute value among events of the given types.
fn find_attribute(raw: &JsonValue, types: &[&str], keys: &[&str]) -> Option<String> {
    for event in events(raw) {
        let Some(JsonValue::String(kind)) = event.get("type") else { continue };
        if !types.contains(&kind.as_str()) {
            continue
        }

        let Some(JsonValue::Array(attrs)) = event.get("attributes") else { continue };
        for attr in attrs.iter().filter_map(|a| a.get::<HashMap<String, JsonValue>>()) {
            let Some(JsonValue::String(key)) = attr.get("key") else { continue };
            if !keys.contains(&key.as_str()) {
                continue
            }

            match attr.get("value") {
                Some(JsonValue::String(v)) => return Some(v.clone()),
                Some(JsonValue::Number(n)) if n.fract() == 0.0 => return Some(format!("{n:.0}")),
                _ => continue,
            }
        }
    }

    None
}

/// Extract the code id assigned by a store-code transaction.
pub fn extract_code_id(raw: &JsonValue) -> CallResult<u64> {
    let Some(value) = find_attribute(raw, STORE_EVENTS, CODE_ID_KEYS) else {
        return Err(CallFailure::malformed("no store_code event with a code_id", raw.clone()))
    };

    value.parse().map_err(|_| {
        CallFailure::malformed(format!("code_id \"{value}\" is not a number"), raw.clone())
    })
}

/// Extract the contract address assigned by an instantiate transaction.
pub fn extract_contract_address(raw: &JsonValue) -> CallResult<String> {
    match find_attribute(raw, INSTANTIATE_EVENTS, ADDRESS_KEYS) {
        Some(address) if !address.is_empty() => Ok(address),
        _ => Err(CallFailure::malformed(
            "no instantiate event with a contract address",
            raw.clone(),
        )),
    }
}

/// Query responses are handed back verbatim.
pub fn extract_query_payload(raw: JsonValue) -> JsonValue {
    raw
}
