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

use std::{collections::HashMap, sync::Arc, time::Duration};

use smol::{
    io::BufReader,
    net::{TcpListener, TcpStream},
};
use tinyjson::JsonValue;
use url::Url;

use wasmdeploy::{
    error::RpcError,
    fee::FeePolicy,
    identity::Identity,
    ledger::{LedgerClient, RpcLedgerClient},
    rpc::{
        client::RpcClient,
        common::{read_from_stream, write_to_stream},
        jsonrpc::{ErrorCode, JsonError, JsonNotification, JsonRequest, JsonResponse, JsonResult},
    },
    session::{ContractRef, DeploySession},
    submitter::TxSubmitter,
    Error, FailureKind, Result,
};

fn store_ack() -> JsonValue {
    r#"{"height":10,"txhash":"5EA1","code":0,"raw_log":"","logs":[{"msg_index":0,"events":[
        {"type":"store_code","attributes":[{"key":"code_id","value":"42"}]}]}]}"#
        .parse()
        .unwrap()
}

/// Delay before the node answers `slow`
const SLOW_REPLY: Duration = Duration::from_millis(300);

/// Answer one request the way a ledger node would.
fn handle_request(req: JsonRequest) -> JsonResult {
    let JsonValue::Array(params) = &req.params else {
        return JsonError::new(ErrorCode::InvalidParams, None, req.id).into()
    };

    match req.method.as_str() {
        "auth.account_sequence" => JsonResponse::new(JsonValue::Number(7.0), req.id).into(),

        "tx.broadcast_sync" => {
            let Some(JsonValue::Object(tx)) = params.first() else {
                return JsonError::new(ErrorCode::InvalidParams, None, req.id).into()
            };
            assert!(tx.contains_key("signature"));
            assert!(tx.contains_key("public_key"));
            JsonResponse::new(store_ack(), req.id).into()
        }

        // Echo the query back
        "wasm.contract_query" => match params.as_slice() {
            [JsonValue::String(contract), query] if contract != "missing" => {
                let rep = HashMap::from([
                    ("contract".to_string(), JsonValue::String(contract.clone())),
                    ("query".to_string(), query.clone()),
                ]);
                JsonResponse::new(JsonValue::Object(rep), req.id).into()
            }
            _ => {
                let msg = Some("not found".to_string());
                JsonError::new(ErrorCode::ServerError(-32001), msg, req.id).into()
            }
        },

        "slow" | "fast" => JsonResponse::new(JsonValue::String(req.method.clone()), req.id).into(),

        _ => JsonError::new(ErrorCode::MethodNotFound, None, req.id).into(),
    }
}

async fn handle_conn(stream: TcpStream) -> Result<()> {
    let mut reader = BufReader::new(stream.clone());
    let mut writer = stream;
    let mut buf = vec![];

    loop {
        if read_from_stream(&mut reader, &mut buf).await.is_err() {
            return Ok(())
        }

        let value: JsonValue = String::from_utf8_lossy(&buf).parse()?;
        let req = JsonRequest::try_from(&value)?;

        match req.method.as_str() {
            "slow" => {
                smol::Timer::after(SLOW_REPLY).await;
            }
            // Noise ahead of the real reply: an error meant for some
            // other request, and a notification
            "noisy" => {
                let stray = JsonError::new(ErrorCode::InternalError, None, req.id.wrapping_add(1));
                write_to_stream(&mut writer, &stray.stringify()?).await?;
                let notif = JsonNotification {
                    method: "blocks.subscribe".to_string(),
                    params: JsonValue::Array(vec![]),
                };
                write_to_stream(&mut writer, &notif.stringify()?).await?;
            }
            _ => {}
        }

        let rep = match req.method.as_str() {
            "noisy" => JsonResponse::new(JsonValue::String("quiet".to_string()), req.id).into(),
            _ => handle_request(req),
        };
        write_to_stream(&mut writer, &rep.stringify()?).await?;
    }
}

/// Spawn a line-delimited JSON-RPC server on a free local port.
async fn spawn_server() -> Result<Url> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = Url::parse(&format!("tcp://127.0.0.1:{}", listener.local_addr()?.port()))?;

    smol::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            smol::spawn(handle_conn(stream)).detach();
        }
    })
    .detach();

    Ok(endpoint)
}

#[test]
fn jsonrpc_reqrep() -> Result<()> {
    smol::block_on(async {
        let endpoint = spawn_server().await?;
        let client = RpcClient::new(endpoint).await?;

        let req = JsonRequest::new("auth.account_sequence", JsonValue::Array(vec![]));
        assert_eq!(client.request(req).await?, JsonValue::Number(7.0));

        let req = JsonRequest::new("nope", JsonValue::Array(vec![]));
        match client.request(req).await {
            Err(Error::RpcClientError(RpcError::ServerError(code, _))) => {
                assert_eq!(code, ErrorCode::MethodNotFound.code())
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        // Replies for other ids and notifications are passed over
        let req = JsonRequest::new("noisy", JsonValue::Array(vec![]));
        assert_eq!(client.request(req).await?, JsonValue::String("quiet".to_string()));

        // The connection stays usable after error replies
        let req = JsonRequest::new("auth.account_sequence", JsonValue::Array(vec![]));
        assert_eq!(client.request(req).await?, JsonValue::Number(7.0));

        Ok(())
    })
}

#[test]
fn recovers_after_timeout() -> Result<()> {
    smol::block_on(async {
        let endpoint = spawn_server().await?;
        let client = RpcClient::with_timeout(endpoint, Duration::from_millis(100)).await?;

        let req = JsonRequest::new("slow", JsonValue::Array(vec![]));
        assert!(matches!(client.request(req).await, Err(Error::Io(std::io::ErrorKind::TimedOut))));

        // Let the late reply land in the stream
        smol::Timer::after(SLOW_REPLY * 2).await;

        for _ in 0..3 {
            let req = JsonRequest::new("fast", JsonValue::Array(vec![]));
            assert_eq!(client.request(req).await?, JsonValue::String("fast".to_string()));
        }

        Ok(())
    })
}

#[test]
fn ledger_over_tcp() -> Result<()> {
    smol::block_on(async {
        let endpoint = spawn_server().await?;
        let ledger = RpcLedgerClient::new(endpoint, Duration::from_secs(5)).await?;
        assert_eq!(ledger.account_sequence("someone").await?, 7);

        let submitter = TxSubmitter::new(
            Arc::new(ledger),
            Identity::from_seed([7u8; 32]),
            "localterra",
            FeePolicy::default(),
        );
        let session = DeploySession::new(submitter);

        let code_id = session.store_contract("vault", b"\0asm").await.unwrap();
        assert_eq!(code_id, 42);

        let q: JsonValue = r#"{"config":{}}"#.parse().unwrap();
        let JsonValue::Object(rep) =
            session.query_contract(&ContractRef::address("addr1"), &q).await.unwrap()
        else {
            panic!("query reply is not an object")
        };
        assert_eq!(rep["query"], q);

        let err = session.query_contract(&ContractRef::address("missing"), &q).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::ChainRejected);

        Ok(())
    })
}

#[test]
fn connect_errors() -> Result<()> {
    smol::block_on(async {
        let url = Url::parse("http://127.0.0.1:1")?;
        assert!(matches!(RpcClient::new(url).await, Err(Error::UnsupportedTransport(_))));

        // Bind and drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        drop(listener);

        let url = Url::parse(&format!("tcp://127.0.0.1:{port}"))?;
        assert!(matches!(RpcClient::new(url).await, Err(Error::ConnectFailed)));

        Ok(())
    })
}
