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

//! JSON-RPC client-side implementation.
use std::time::Duration;

use smol::{io::BufReader, lock::Mutex, net::TcpStream};
use tinyjson::JsonValue;
use tracing::{debug, error, warn};
use url::Url;

use super::{
    common::{io_timeout, read_from_stream, write_to_stream, CONNECT_TIMEOUT, READ_TIMEOUT},
    jsonrpc::{JsonError, JsonRequest, JsonResponse, JsonResult},
};
use crate::{error::RpcError, Error, Result};

/// Both halves of an open connection. Kept behind one lock so a request
/// and its reply are never interleaved with another call.
struct RpcStream {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    /// Set after a read timed out, until a matching reply is read again
    desynced: bool,
}

/// JSON-RPC client over a line-delimited TCP connection.
pub struct RpcClient {
    endpoint: Url,
    stream: Mutex<RpcStream>,
    read_timeout: Duration,
}

impl RpcClient {
    /// Instantiate a new JSON-RPC client that will connect to the given URL.
    /// Only `tcp://` endpoints are supported.
    pub async fn new(endpoint: Url) -> Result<Self> {
        Self::with_timeout(endpoint, READ_TIMEOUT).await
    }

    /// Same as [`RpcClient::new`], with a custom reply timeout.
    pub async fn with_timeout(endpoint: Url, read_timeout: Duration) -> Result<Self> {
        if endpoint.scheme() != "tcp" {
            return Err(Error::UnsupportedTransport(endpoint.scheme().to_string()))
        }

        let Some(host) = endpoint.host_str() else {
            return Err(Error::ParseFailed("Endpoint has no host"))
        };
        let Some(port) = endpoint.port() else {
            return Err(Error::ParseFailed("Endpoint has no port"))
        };

        let stream = match io_timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                error!(target: "wasmdeploy::rpc", "Connection to {endpoint} timed out");
                return Err(Error::ConnectTimeout)
            }
            Err(e) => {
                error!(target: "wasmdeploy::rpc", "Connection to {endpoint} failed: {e}");
                return Err(Error::ConnectFailed)
            }
        };

        debug!(target: "wasmdeploy::rpc", "Connected to {endpoint}");

        let stream =
            RpcStream { reader: BufReader::new(stream.clone()), writer: stream, desynced: false };
        Ok(Self { endpoint, stream: Mutex::new(stream), read_timeout })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send a given JSON-RPC request and wait for its reply. Returns the
    /// `result` member of a successful response.
    ///
    /// Replies carrying another id are leftovers of earlier requests that
    /// timed out, and are skipped along with notifications.
    pub async fn request(&self, req: JsonRequest) -> Result<JsonValue> {
        let req_str = req.stringify()?;
        debug!(target: "wasmdeploy::rpc", "--> {req_str}");

        let mut stream = self.stream.lock().await;

        if let Err(e) = write_to_stream(&mut stream.writer, &req_str).await {
            error!(target: "wasmdeploy::rpc", "Unable to send to {}: {e}", self.endpoint);
            return Err(Error::NetworkOperationFailed)
        }

        let mut buf = vec![];
        loop {
            let read = read_from_stream(&mut stream.reader, &mut buf);
            match io_timeout(self.read_timeout, read).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionAborted => {
                    return Err(RpcError::ConnectionClosed.into())
                }
                Err(e) => {
                    // A late reply may still arrive, possibly cut in half
                    // by the timeout.
                    stream.desynced = true;
                    error!(target: "wasmdeploy::rpc", "Unable to read from {}: {e}", self.endpoint);
                    return Err(e.into())
                }
            }

            let reply: JsonValue = match String::from_utf8_lossy(&buf).parse() {
                Ok(v) => v,
                Err(e) if stream.desynced => {
                    warn!(target: "wasmdeploy::rpc", "Skipping unparseable stale line: {e}");
                    continue
                }
                Err(e) => return Err(e.into()),
            };
            debug!(target: "wasmdeploy::rpc", "<-- {}", reply.stringify()?);

            match JsonResult::try_from_value(&reply)? {
                JsonResult::Response(rep) if rep.id == req.id => {
                    stream.desynced = false;
                    return Ok(rep.result)
                }
                JsonResult::Error(e) if e.id == req.id => {
                    stream.desynced = false;
                    return Err(RpcError::ServerError(e.error.code, e.error.message).into())
                }
                JsonResult::Response(JsonResponse { id, .. }) |
                JsonResult::Error(JsonError { id, .. }) => {
                    warn!(
                        target: "wasmdeploy::rpc",
                        "Skipping stale reply {id}, waiting for {}", req.id,
                    );
                }
                JsonResult::Notification(n) => {
                    debug!(target: "wasmdeploy::rpc", "Ignoring notification \"{}\"", n.method);
                }
            }
        }
    }
}
