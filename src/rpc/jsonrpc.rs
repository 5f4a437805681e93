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

//! JSON-RPC 2.0 objects as exchanged with a ledger node.
//!
//! Every object on the wire carries `"jsonrpc": "2.0"`. Requests and
//! replies are matched by a numeric `id`; notifications carry none.

use std::collections::HashMap;

use rand::{rngs::OsRng, Rng};
use tinyjson::JsonValue;

use crate::{error::RpcError, Result};

const JSONRPC_VERSION: &str = "2.0";

type RpcResult<T> = std::result::Result<T, RpcError>;
type JsonMap = HashMap<String, JsonValue>;

/// Predefined error codes, `[-32768, -32000]` is reserved.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    /// Implementation-defined server error
    ServerError(i32),
}

impl ErrorCode {
    pub fn code(&self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerError(c) => *c,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::ParseError => "parse error",
            Self::InvalidRequest => "invalid request",
            Self::MethodNotFound => "method not found",
            Self::InvalidParams => "invalid params",
            Self::InternalError => "internal error",
            Self::ServerError(_) => "server error",
        }
    }
}

/// Build a JSON-RPC object from its members, adding the version tag.
fn envelope<const N: usize>(fields: [(&str, JsonValue); N]) -> JsonValue {
    let mut map: JsonMap = fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    map.insert("jsonrpc".to_string(), JsonValue::String(JSONRPC_VERSION.to_string()));
    JsonValue::Object(map)
}

/// Check that `value` is a JSON-RPC 2.0 object and return its members.
fn members<'a>(value: &'a JsonValue, kind: &str) -> RpcResult<&'a JsonMap> {
    let Some(map) = value.get::<JsonMap>() else {
        return Err(RpcError::InvalidJson(format!("{kind} is not a JSON object")))
    };

    match map.get("jsonrpc") {
        Some(JsonValue::String(v)) if v == JSONRPC_VERSION => Ok(map),
        _ => Err(RpcError::InvalidJson(format!("{kind} has no valid \"jsonrpc\" member"))),
    }
}

fn id_member(map: &JsonMap, kind: &str) -> RpcResult<u16> {
    match map.get("id") {
        Some(JsonValue::Number(n)) if n.fract() == 0.0 && (0.0..=u16::MAX as f64).contains(n) => {
            Ok(*n as u16)
        }
        _ => Err(RpcError::InvalidJson(format!("{kind} has no valid \"id\" member"))),
    }
}

fn method_member(map: &JsonMap, kind: &str) -> RpcResult<String> {
    match map.get("method") {
        Some(JsonValue::String(m)) => Ok(m.clone()),
        _ => Err(RpcError::InvalidJson(format!("{kind} has no valid \"method\" member"))),
    }
}

/// Anything a client can read back from the server
#[derive(Clone, Debug)]
pub enum JsonResult {
    Response(JsonResponse),
    Error(JsonError),
    Notification(JsonNotification),
}

impl JsonResult {
    pub fn try_from_value(value: &JsonValue) -> Result<Self> {
        let map = members(value, "Reply")?;

        if map.contains_key("result") {
            return Ok(Self::Response(JsonResponse::try_from(value)?))
        }
        if map.contains_key("error") {
            return Ok(Self::Error(JsonError::try_from(value)?))
        }
        if map.contains_key("method") {
            return Ok(Self::Notification(JsonNotification::try_from(value)?))
        }

        let msg = "Reply is neither a response, an error nor a notification";
        Err(RpcError::InvalidJson(msg.to_string()).into())
    }

    pub fn stringify(&self) -> Result<String> {
        match self {
            Self::Response(v) => v.stringify(),
            Self::Error(v) => v.stringify(),
            Self::Notification(v) => v.stringify(),
        }
    }
}

impl From<JsonResponse> for JsonResult {
    fn from(rep: JsonResponse) -> Self {
        Self::Response(rep)
    }
}

impl From<JsonError> for JsonResult {
    fn from(err: JsonError) -> Self {
        Self::Error(err)
    }
}

impl From<JsonNotification> for JsonResult {
    fn from(notif: JsonNotification) -> Self {
        Self::Notification(notif)
    }
}

#[derive(Clone, Debug)]
pub struct JsonRequest {
    pub id: u16,
    pub method: String,
    /// Positional (array) or named (object) parameters
    pub params: JsonValue,
}

impl JsonRequest {
    /// Create a request with a random id.
    pub fn new(method: &str, params: JsonValue) -> Self {
        debug_assert!(params.is_object() || params.is_array());
        Self { id: OsRng.gen(), method: method.to_string(), params }
    }

    pub fn to_json(&self) -> JsonValue {
        envelope([
            ("id", JsonValue::Number(self.id.into())),
            ("method", JsonValue::String(self.method.clone())),
            ("params", self.params.clone()),
        ])
    }

    pub fn stringify(&self) -> Result<String> {
        Ok(self.to_json().stringify()?)
    }
}

impl TryFrom<&JsonValue> for JsonRequest {
    type Error = RpcError;

    fn try_from(value: &JsonValue) -> RpcResult<Self> {
        let map = members(value, "Request")?;
        let id = id_member(map, "Request")?;
        let method = method_member(map, "Request")?;

        match map.get("params") {
            Some(p) if p.is_object() || p.is_array() => Ok(Self { id, method, params: p.clone() }),
            _ => Err(RpcError::InvalidJson("Request has no valid \"params\" member".to_string())),
        }
    }
}

/// Server-initiated message without an id
#[derive(Clone, Debug)]
pub struct JsonNotification {
    pub method: String,
    pub params: JsonValue,
}

impl JsonNotification {
    pub fn stringify(&self) -> Result<String> {
        let v = envelope([
            ("method", JsonValue::String(self.method.clone())),
            ("params", self.params.clone()),
        ]);
        Ok(v.stringify()?)
    }
}

impl TryFrom<&JsonValue> for JsonNotification {
    type Error = RpcError;

    fn try_from(value: &JsonValue) -> RpcResult<Self> {
        let map = members(value, "Notification")?;
        if map.contains_key("id") {
            return Err(RpcError::InvalidJson("Notification must not carry an \"id\"".to_string()))
        }

        let method = method_member(map, "Notification")?;
        let params = map.get("params").cloned().unwrap_or(JsonValue::Array(vec![]));
        Ok(Self { method, params })
    }
}

/// Successful reply to a request
#[derive(Clone, Debug)]
pub struct JsonResponse {
    pub id: u16,
    pub result: JsonValue,
}

impl JsonResponse {
    pub fn new(result: JsonValue, id: u16) -> Self {
        Self { id, result }
    }

    pub fn stringify(&self) -> Result<String> {
        let v =
            envelope([("id", JsonValue::Number(self.id.into())), ("result", self.result.clone())]);
        Ok(v.stringify()?)
    }
}

impl TryFrom<&JsonValue> for JsonResponse {
    type Error = RpcError;

    fn try_from(value: &JsonValue) -> RpcResult<Self> {
        let map = members(value, "Response")?;
        let id = id_member(map, "Response")?;

        match map.get("result") {
            Some(result) => Ok(Self { id, result: result.clone() }),
            None => Err(RpcError::InvalidJson("Response has no \"result\" member".to_string())),
        }
    }
}

/// The `error` member of an error reply
#[derive(Clone, Debug)]
pub struct JsonErrorVal {
    pub code: i32,
    pub message: String,
}

/// Failed reply to a request
#[derive(Clone, Debug)]
pub struct JsonError {
    pub id: u16,
    pub error: JsonErrorVal,
}

impl JsonError {
    /// Create an error reply. Without a message, the generic one for
    /// the code is used.
    pub fn new(code: ErrorCode, message: Option<String>, id: u16) -> Self {
        let message = message.unwrap_or_else(|| code.message().to_string());
        Self { id, error: JsonErrorVal { code: code.code(), message } }
    }

    pub fn stringify(&self) -> Result<String> {
        let error = JsonValue::Object(HashMap::from([
            ("code".to_string(), JsonValue::Number(self.error.code.into())),
            ("message".to_string(), JsonValue::String(self.error.message.clone())),
        ]));
        let v = envelope([("id", JsonValue::Number(self.id.into())), ("error", error)]);
        Ok(v.stringify()?)
    }
}

impl TryFrom<&JsonValue> for JsonError {
    type Error = RpcError;

    fn try_from(value: &JsonValue) -> RpcResult<Self> {
        let map = members(value, "Error")?;
        let id = id_member(map, "Error")?;

        let Some(JsonValue::Object(error)) = map.get("error") else {
            return Err(RpcError::InvalidJson("Error has no valid \"error\" member".to_string()))
        };

        match (error.get("code"), error.get("message")) {
            (Some(JsonValue::Number(code)), Some(JsonValue::String(message))) => Ok(Self {
                id,
                error: JsonErrorVal { code: *code as i32, message: message.clone() },
            }),
            _ => Err(RpcError::InvalidJson("Error has no valid code and message".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(s: &str) -> JsonValue {
        s.parse().unwrap()
    }

    #[test]
    fn request_survives_the_wire() {
        let req = JsonRequest::new("wasm.contract_query", JsonValue::Array(vec![]));
        let back = JsonRequest::try_from(&json(&req.stringify().unwrap())).unwrap();
        assert_eq!(back.id, req.id);
        assert_eq!(back.method, "wasm.contract_query");
    }

    #[test]
    fn classify_results() {
        let rep = json(r#"{"jsonrpc":"2.0","id":7,"result":"pong"}"#);
        assert!(matches!(
            JsonResult::try_from_value(&rep),
            Ok(JsonResult::Response(r)) if r.id == 7
        ));

        let err = json(
            r#"{"jsonrpc":"2.0","id":7,"error":{"code":-32601,"message":"method not found"}}"#,
        );
        assert!(matches!(
            JsonResult::try_from_value(&err),
            Ok(JsonResult::Error(e)) if e.error.code == ErrorCode::MethodNotFound.code()
        ));

        let notif = json(r#"{"jsonrpc":"2.0","method":"blocks.subscribe","params":[]}"#);
        assert!(matches!(JsonResult::try_from_value(&notif), Ok(JsonResult::Notification(_))));

        let old = json(r#"{"jsonrpc":"1.0","id":7,"result":1}"#);
        assert!(JsonResult::try_from_value(&old).is_err());

        let fractional_id = json(r#"{"jsonrpc":"2.0","id":1.5,"result":1}"#);
        assert!(JsonResult::try_from_value(&fractional_id).is_err());
    }

    #[test]
    fn error_without_code_is_rejected() {
        let err = json(r#"{"jsonrpc":"2.0","id":1,"error":{"message":"boom"}}"#);
        assert!(JsonError::try_from(&err).is_err());
    }

    #[test]
    fn default_error_message() {
        let err = JsonError::new(ErrorCode::InvalidParams, None, 3);
        assert_eq!(err.error.message, "invalid params");
        let back = JsonError::try_from(&json(&err.stringify().unwrap())).unwrap();
        assert_eq!(back.error.code, -32602);
    }
}
