//! # RPC Gateway
//!
//! Thin JSON-RPC client for the node. Every other component reaches the chain through
//! the [`RpcClient`] trait, so tests swap in a stub at the JSON level.
//!
//! - Administrative namespaces (`admin_`, `debug_`, ...) are rejected before any I/O
//! - Non-2xx responses, JSON-RPC `error` envelopes and timeouts surface as [`RpcError`]
//! - No retries here: callers own the retry policy (see `log_fetcher`)

use crate::metrics;
use crate::types::conversions::timestamp_from_unix;
use crate::types::{BlockHead, RawLog};
use async_trait::async_trait;
use ethers::types::{Filter, Log, U256, U64};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Method prefixes that are never forwarded to the node.
pub const DENIED_NAMESPACES: &[&str] = &[
    "admin_", "debug_", "personal_", "miner_", "txpool_", "clique_", "engine_", "les_",
];

/// Provider messages that mean "ask for less".
const OVERLOAD_HINTS: &[&str] = &[
    "too many results",
    "query returned more than",
    "response size exceeded",
    "range is too large",
    "range too large",
    "exceeds max block range",
    "exceed maximum block range",
    "timeout",
    "timed out",
];

const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("RPC method {0} is not allowed")]
    MethodDenied(String),
    #[error("RPC call {method} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },
    #[error("Transport error calling {method}: {message}")]
    Transport { method: String, message: String },
    #[error("HTTP {status} from RPC endpoint: {body}")]
    Http { status: u16, body: String },
    #[error("Provider error {code}: {message}")]
    Provider { code: i64, message: String },
    #[error("Response to {0} has neither result nor error")]
    MissingResult(String),
    #[error("Failed to decode {method} response: {message}")]
    Decode { method: String, message: String },
    #[error("Block {0} not found")]
    BlockNotFound(u64),
}

impl RpcError {
    /// True when a smaller request is likely to succeed.
    pub fn is_overload(&self) -> bool {
        match self {
            RpcError::Timeout { .. } => true,
            RpcError::Provider { message, .. } => is_overload_message(message),
            RpcError::Http { status, body } => *status == 413 || is_overload_message(body),
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::MethodDenied(_) => "denied",
            RpcError::Timeout { .. } => "timeout",
            RpcError::Transport { .. } => "transport",
            RpcError::Http { .. } => "http",
            RpcError::Provider { .. } => "provider",
            RpcError::MissingResult(_) => "missing_result",
            RpcError::Decode { .. } => "decode",
            RpcError::BlockNotFound(_) => "block_not_found",
        }
    }
}

fn is_overload_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    OVERLOAD_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Fails with `MethodDenied` for administrative namespaces.
pub fn ensure_method_allowed(method: &str) -> Result<(), RpcError> {
    if DENIED_NAMESPACES
        .iter()
        .any(|prefix| method.starts_with(prefix))
    {
        return Err(RpcError::MethodDenied(method.to_string()));
    }
    Ok(())
}

/// JSON-RPC access to the node.
///
/// Implementors provide `call`; the typed helpers are built on top of it.
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError>;

    /// `eth_blockNumber`
    async fn block_number(&self) -> Result<u64, RpcError> {
        let value = self.call("eth_blockNumber", json!([])).await?;
        let number: U64 = decode_value("eth_blockNumber", value)?;
        Ok(number.as_u64())
    }

    /// `eth_getBlockByNumber` without transactions, reduced to number and timestamp.
    async fn block_header(&self, number: u64) -> Result<BlockHead, RpcError> {
        let method = "eth_getBlockByNumber";
        let value = self
            .call(method, json!([U64::from(number), false]))
            .await?;
        if value.is_null() {
            return Err(RpcError::BlockNotFound(number));
        }
        let header: HeaderResponse = decode_value(method, value)?;
        header.into_head(method)
    }

    /// `eth_getLogs` for a single filter. Logs that cannot be attributed to a mined
    /// block (pending, removed) are dropped here.
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<RawLog>, RpcError> {
        let value = self.call("eth_getLogs", json!([filter])).await?;
        let logs: Vec<Log> = decode_value("eth_getLogs", value)?;
        let total = logs.len();
        let raw: Vec<RawLog> = logs
            .into_iter()
            .filter_map(|log| match RawLog::try_from(log) {
                Ok(raw) => Some(raw),
                Err(e) => {
                    debug!("[RpcGateway] Dropping log: {}", e);
                    None
                }
            })
            .collect();
        metrics::increment_logs_fetched(total);
        Ok(raw)
    }
}

#[derive(Debug, Deserialize)]
struct HeaderResponse {
    number: Option<U64>,
    timestamp: U256,
}

impl HeaderResponse {
    fn into_head(self, method: &str) -> Result<BlockHead, RpcError> {
        let number = self.number.ok_or_else(|| RpcError::Decode {
            method: method.to_string(),
            message: "block has no number (pending?)".to_string(),
        })?;
        if self.timestamp > U256::from(u64::MAX) {
            return Err(RpcError::Decode {
                method: method.to_string(),
                message: format!("timestamp {} out of range", self.timestamp),
            });
        }
        let timestamp =
            timestamp_from_unix(self.timestamp.as_u64()).map_err(|e| RpcError::Decode {
                method: method.to_string(),
                message: e.to_string(),
            })?;
        Ok(BlockHead {
            number: number.as_u64(),
            timestamp,
        })
    }
}

fn decode_value<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, RpcError> {
    serde_json::from_value(value).map_err(|e| RpcError::Decode {
        method: method.to_string(),
        message: e.to_string(),
    })
}

/// Splits a JSON-RPC response envelope into result or error.
pub fn parse_envelope(method: &str, mut envelope: Value) -> Result<Value, RpcError> {
    if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(RpcError::Provider { code, message });
    }
    match envelope.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(RpcError::MissingResult(method.to_string())),
    }
}

/// HTTP implementation of [`RpcClient`].
pub struct HttpRpcGateway {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    next_id: AtomicU64,
}

impl HttpRpcGateway {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport {
                method: "client_init".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            url,
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    async fn send(&self, method: &str, body: &Value) -> Result<Value, RpcError> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(method, e))?;

        let status = response.status();
        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            return Err(RpcError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| self.map_reqwest_error(method, e))?;
        parse_envelope(method, envelope)
    }

    fn map_reqwest_error(&self, method: &str, e: reqwest::Error) -> RpcError {
        if e.is_timeout() {
            RpcError::Timeout {
                method: method.to_string(),
                timeout: self.timeout,
            }
        } else if e.is_decode() {
            RpcError::Decode {
                method: method.to_string(),
                message: e.to_string(),
            }
        } else {
            RpcError::Transport {
                method: method.to_string(),
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl RpcClient for HttpRpcGateway {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        ensure_method_allowed(method)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let start = Instant::now();
        metrics::increment_rpc_call(method);
        let result = self.send(method, &body).await;
        let duration = start.elapsed();
        metrics::record_rpc_latency(method, duration);

        match &result {
            Ok(_) => debug!("[RPC_TRACE] {} ok in {:?}", method, duration),
            Err(e) => {
                metrics::increment_rpc_error(method, e.kind());
                debug!("[RPC_TRACE] {} failed in {:?}: {}", method, duration, e);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Address, H256};
    use std::sync::Mutex;

    struct CannedRpc {
        responses: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl RpcClient for CannedRpc {
        async fn call(&self, method: &str, _params: Value) -> Result<Value, RpcError> {
            ensure_method_allowed(method)?;
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    #[tokio::test]
    async fn test_denied_namespace_rejected_before_io() {
        // Nothing listens on port 9; a network attempt would be a Transport error.
        let gateway = HttpRpcGateway::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        for method in ["admin_peers", "debug_traceTransaction", "personal_unlockAccount"] {
            let err = gateway.call(method, json!([])).await.unwrap_err();
            assert!(matches!(err, RpcError::MethodDenied(_)), "{method}: {err:?}");
        }
        assert!(ensure_method_allowed("eth_getLogs").is_ok());
    }

    /// Serves one connection: reads the request, then writes `reply` unless it is `None`,
    /// in which case the socket is held open without answering.
    async fn one_shot_server(reply: Option<&'static str>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            match reply {
                Some(raw) => {
                    socket.write_all(raw.as_bytes()).await.unwrap();
                    let _ = socket.shutdown().await;
                }
                None => tokio::time::sleep(Duration::from_secs(5)).await,
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_non_success_status_maps_to_http_error() {
        let url = one_shot_server(Some(
            "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 11\r\nconnection: close\r\n\r\nnode broken",
        ))
        .await;
        let gateway = HttpRpcGateway::new(url, Duration::from_secs(5)).unwrap();

        let err = gateway.call("eth_blockNumber", json!([])).await.unwrap_err();
        match &err {
            RpcError::Http { status, body } => {
                assert_eq!(*status, 500);
                assert_eq!(body, "node broken");
            }
            other => panic!("expected Http, got {other:?}"),
        }
        assert!(!err.is_overload());
    }

    #[tokio::test]
    async fn test_payload_too_large_is_overload() {
        let url = one_shot_server(Some(
            "HTTP/1.1 413 Payload Too Large\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        ))
        .await;
        let gateway = HttpRpcGateway::new(url, Duration::from_secs(5)).unwrap();

        let err = gateway.call("eth_getLogs", json!([{}])).await.unwrap_err();
        assert!(matches!(err, RpcError::Http { status: 413, .. }), "{err:?}");
        assert!(err.is_overload());
    }

    #[tokio::test]
    async fn test_silent_node_maps_to_timeout() {
        let url = one_shot_server(None).await;
        let gateway = HttpRpcGateway::new(url, Duration::from_millis(100)).unwrap();

        let err = gateway.call("eth_blockNumber", json!([])).await.unwrap_err();
        match &err {
            RpcError::Timeout { method, timeout } => {
                assert_eq!(method, "eth_blockNumber");
                assert_eq!(*timeout, Duration::from_millis(100));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
        assert!(err.is_overload());
    }

    #[test]
    fn test_overload_classification() {
        let too_many = RpcError::Provider {
            code: -32005,
            message: "query returned more than 10000 results".to_string(),
        };
        assert!(too_many.is_overload());

        let timeout = RpcError::Timeout {
            method: "eth_getLogs".to_string(),
            timeout: Duration::from_secs(60),
        };
        assert!(timeout.is_overload());

        let bad_params = RpcError::Provider {
            code: -32602,
            message: "invalid argument 0: hex string without 0x prefix".to_string(),
        };
        assert!(!bad_params.is_overload());

        let capped = RpcError::Provider {
            code: -32600,
            message: "eth_getLogs block range too large, max 2000".to_string(),
        };
        assert!(capped.is_overload());

        let malformed_range = RpcError::Provider {
            code: -32602,
            message: "invalid block range params".to_string(),
        };
        assert!(!malformed_range.is_overload());
        assert!(!RpcError::MethodDenied("admin_peers".into()).is_overload());
    }

    #[test]
    fn test_parse_envelope() {
        let ok = parse_envelope("eth_blockNumber", json!({"jsonrpc": "2.0", "id": 1, "result": "0x10"}));
        assert_eq!(ok.unwrap(), json!("0x10"));

        let null = parse_envelope("eth_getBlockByNumber", json!({"jsonrpc": "2.0", "id": 1, "result": null}));
        assert_eq!(null.unwrap(), Value::Null);

        let err = parse_envelope(
            "eth_getLogs",
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32005, "message": "too many results"}}),
        )
        .unwrap_err();
        assert!(matches!(err, RpcError::Provider { code: -32005, .. }));

        let missing = parse_envelope("eth_chainId", json!({"jsonrpc": "2.0", "id": 1}));
        assert!(matches!(missing, Err(RpcError::MissingResult(_))));
    }

    #[tokio::test]
    async fn test_typed_helpers_decode_node_json() {
        let log = Log {
            address: Address::repeat_byte(0xaa),
            topics: vec![H256::repeat_byte(0x01)],
            block_number: Some(U64::from(5)),
            transaction_hash: Some(H256::repeat_byte(0x02)),
            log_index: Some(U256::from(3)),
            ..Default::default()
        };
        let rpc = CannedRpc {
            responses: Mutex::new(vec![
                json!("0x2a"),
                json!({"number": "0x2a", "timestamp": "0x65000000", "hash": "0x00"}),
                Value::Null,
                serde_json::to_value(vec![log]).unwrap(),
            ]),
        };

        assert_eq!(rpc.block_number().await.unwrap(), 42);

        let head = rpc.block_header(42).await.unwrap();
        assert_eq!(head.number, 42);
        assert_eq!(head.timestamp.timestamp(), 0x6500_0000);

        assert!(matches!(
            rpc.block_header(43).await,
            Err(RpcError::BlockNotFound(43))
        ));

        let logs = rpc.get_logs(&Filter::new()).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].block_number, 5);
        assert_eq!(logs[0].log_index, 3);
    }
}
