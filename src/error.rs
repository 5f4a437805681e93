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

// Hello developer. Please add your error to the according subsection
// that is commented, or make a new subsection. Keep it clean.

use std::fmt;

use tinyjson::JsonValue;

/// Main result type used throughout the codebase.
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a ledger-facing operation. Failures are values a driving
/// script can inspect and branch on.
pub type CallResult<T> = std::result::Result<T, CallFailure>;

/// General library errors used throughout the codebase.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    // ==============
    // Parsing errors
    // ==============
    #[error("Parse failed: {0}")]
    ParseFailed(&'static str),

    #[error(transparent)]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error("Invalid coin: {0}")]
    InvalidCoin(String),

    // ===============
    // Encoding errors
    // ===============
    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("JSON generate error: {0}")]
    JsonGenerateError(String),

    #[error(transparent)]
    Bs58DecodeError(#[from] bs58::decode::Error),

    #[error(transparent)]
    HexDecodeError(#[from] hex::FromHexError),

    // ======================
    // Network-related errors
    // ======================
    #[error("Unsupported network transport: {0}")]
    UnsupportedTransport(String),

    #[error("Connection failed")]
    ConnectFailed,

    #[error("Connection timed out")]
    ConnectTimeout,

    #[error("Network operation failed")]
    NetworkOperationFailed,

    // =============
    // Crypto errors
    // =============
    #[error("Invalid secret key")]
    InvalidSecretKey,

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Signature verification failed")]
    InvalidSignature,

    // ===============
    // RPC errors
    // ===============
    #[error(transparent)]
    RpcClientError(#[from] RpcError),

    // ===============
    // Ledger errors
    // ===============
    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    // ===================
    // Configuration errors
    // ===================
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid deployment plan: {0}")]
    PlanError(String),

    // ===============
    // General errors
    // ===============
    #[error("IO error: {0:?}")]
    Io(std::io::ErrorKind),
}

/// JSON-RPC protocol errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("Server error {0}: {1}")]
    ServerError(i32, String),

    #[error("Connection closed by peer")]
    ConnectionClosed,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.kind())
    }
}

impl From<tinyjson::JsonParseError> for Error {
    fn from(err: tinyjson::JsonParseError) -> Self {
        Self::JsonParseError(err.to_string())
    }
}

impl From<tinyjson::JsonGenerateError> for Error {
    fn from(err: tinyjson::JsonGenerateError) -> Self {
        Self::JsonGenerateError(err.to_string())
    }
}

impl From<ed25519_compact::Error> for Error {
    fn from(err: ed25519_compact::Error) -> Self {
        Self::SigningFailed(err.to_string())
    }
}

/// Classification of a failed ledger-facing call.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The ledger could not be reached, or the client failed talking to it
    Transport,
    /// The identity could not produce a valid signature
    Signing,
    /// The ledger executed the transaction and rejected it
    ChainRejected,
    /// The response did not have the expected shape
    Malformed,
    /// A required prior step has not completed
    Precondition,
    /// A logical contract name could not be resolved to an address
    UnknownContract,
}

impl FailureKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Signing => "signing",
            Self::ChainRejected => "chain rejected",
            Self::Malformed => "malformed",
            Self::Precondition => "precondition",
            Self::UnknownContract => "unknown contract",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A failed call. `raw` holds the ledger response when one was received.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CallFailure {
    pub kind: FailureKind,
    pub message: String,
    pub raw: Option<JsonValue>,
}

impl CallFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), raw: None }
    }

    pub fn with_raw(kind: FailureKind, message: impl Into<String>, raw: JsonValue) -> Self {
        Self { kind, message: message.into(), raw: Some(raw) }
    }

    pub fn transport(err: &Error) -> Self {
        Self::new(FailureKind::Transport, err.to_string())
    }

    pub fn signing(err: &Error) -> Self {
        Self::new(FailureKind::Signing, err.to_string())
    }

    pub fn malformed(message: impl Into<String>, raw: JsonValue) -> Self {
        Self::with_raw(FailureKind::Malformed, message, raw)
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Precondition, message)
    }

    pub fn unknown_contract(name: &str) -> Self {
        Self::new(FailureKind::UnknownContract, format!("no address on record for \"{name}\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_failure_display() {
        let f = CallFailure::unknown_contract("vault");
        assert_eq!(f.kind, FailureKind::UnknownContract);
        assert_eq!(f.to_string(), "unknown contract: no address on record for \"vault\"");
        assert!(f.raw.is_none());
    }

    #[test]
    fn io_error_keeps_kind() {
        let err: Error = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(matches!(err, Error::Io(std::io::ErrorKind::NotFound)));
    }
}
