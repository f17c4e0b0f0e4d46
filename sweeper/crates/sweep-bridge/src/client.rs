use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::discover::InputInfo;
use crate::error::BridgeError;

/// Async Unix-socket JSON-RPC client for the in-page agent.
///
/// Protocol: newline-delimited JSON, one request then one response.
/// Requests are serialised on a single reused connection; any transport
/// error drops the connection and the next call reconnects.
pub struct PageBridgeClient {
    sock_path: PathBuf,
    rpc_timeout: Duration,
    conn: Mutex<Option<BridgeConn>>,
    next_id: AtomicU64,
}

struct BridgeConn {
    reader: BufReader<tokio::io::ReadHalf<UnixStream>>,
    writer: tokio::io::WriteHalf<UnixStream>,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    id: u64,
    ok: bool,
    result: Option<Value>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FoundReply {
    #[serde(default)]
    found: bool,
}

#[derive(Debug, Deserialize)]
struct MetricsReply {
    #[serde(default)]
    found: bool,
    #[serde(default)]
    metrics: HashMap<String, Option<String>>,
}

#[derive(Debug, Deserialize)]
struct RowsReply {
    #[serde(default)]
    found: bool,
    #[serde(default)]
    rows: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct InputsReply {
    #[serde(default)]
    found: bool,
    #[serde(default)]
    inputs: Vec<InputInfo>,
}

#[derive(Debug, Deserialize)]
struct TextReply {
    #[serde(default)]
    found: bool,
    text: Option<String>,
}

impl BridgeConn {
    async fn exchange(&mut self, line: &str) -> Result<RpcResponse, BridgeError> {
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(BridgeError::Write)?;
        self.writer.flush().await.map_err(BridgeError::Write)?;

        let mut resp_line = String::new();
        self.reader
            .read_line(&mut resp_line)
            .await
            .map_err(BridgeError::Read)?;
        if resp_line.is_empty() {
            return Err(BridgeError::Closed);
        }
        serde_json::from_str(&resp_line).map_err(BridgeError::Decode)
    }
}

impl PageBridgeClient {
    pub fn new(sock_path: PathBuf, rpc_timeout: Duration) -> Self {
        Self {
            sock_path,
            rpc_timeout,
            conn: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    async fn connect(&self) -> Result<BridgeConn, BridgeError> {
        let stream = UnixStream::connect(&self.sock_path)
            .await
            .map_err(|source| BridgeError::Connect {
                path: self.sock_path.clone(),
                source,
            })?;
        let (read_half, write_half) = tokio::io::split(stream);
        Ok(BridgeConn {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let rid = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = RpcRequest {
            id: rid,
            method,
            params,
        };
        let mut line = serde_json::to_string(&req).map_err(BridgeError::Encode)?;
        line.push('\n');

        let mut guard = self.conn.lock().await;

        // Taken out for the exchange; only put back once it completes cleanly.
        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => self.connect().await?,
        };

        let resp = match tokio::time::timeout(self.rpc_timeout, conn.exchange(&line)).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                debug!(method, error = %e, "bridge connection dropped");
                return Err(e);
            }
            Err(_) => {
                debug!(method, "bridge request timed out, connection dropped");
                return Err(BridgeError::Timeout {
                    method: method.to_string(),
                    after_ms: self.rpc_timeout.as_millis() as u64,
                });
            }
        };

        if resp.id != rid {
            return Err(BridgeError::IdMismatch {
                sent: rid,
                got: resp.id,
            });
        }
        *guard = Some(conn);

        if !resp.ok {
            return Err(BridgeError::Remote(
                resp.error.unwrap_or_else(|| "agent error".to_string()),
            ));
        }
        Ok(resp.result.unwrap_or(Value::Null))
    }

    async fn rpc_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, BridgeError> {
        let result = self.rpc(method, params).await?;
        serde_json::from_value(result).map_err(BridgeError::Decode)
    }

    /// Health check.
    pub async fn health(&self) -> Result<Value, BridgeError> {
        self.rpc("health", json!({})).await
    }

    pub async fn find_input(&self, name: &str) -> Result<bool, BridgeError> {
        let reply: FoundReply = self.rpc_as("find_input", json!({ "name": name })).await?;
        Ok(reply.found)
    }

    /// Set the control's value and fire its change notifications.
    pub async fn set_input(&self, name: &str, value: &str) -> Result<(), BridgeError> {
        self.rpc("set_input", json!({ "name": name, "value": value }))
            .await?;
        Ok(())
    }

    pub async fn find_apply(&self) -> Result<bool, BridgeError> {
        let reply: FoundReply = self.rpc_as("find_apply", json!({})).await?;
        Ok(reply.found)
    }

    pub async fn click_apply(&self) -> Result<(), BridgeError> {
        self.rpc("click_apply", json!({})).await?;
        Ok(())
    }

    pub async fn find_results(&self) -> Result<bool, BridgeError> {
        let reply: FoundReply = self.rpc_as("find_results", json!({})).await?;
        Ok(reply.found)
    }

    /// Raw metric texts keyed by metric name. `None` when the region is gone.
    pub async fn read_metrics(
        &self,
    ) -> Result<Option<HashMap<String, Option<String>>>, BridgeError> {
        let reply: MetricsReply = self.rpc_as("read_metrics", json!({})).await?;
        Ok(reply.found.then_some(reply.metrics))
    }

    /// Cell texts of each trade-list row. `None` when the list is not rendered.
    pub async fn read_trades(&self) -> Result<Option<Vec<Vec<String>>>, BridgeError> {
        let reply: RowsReply = self.rpc_as("read_trades", json!({})).await?;
        Ok(reply.found.then_some(reply.rows))
    }

    /// Text of a single labelled readout such as `balance` or `drawdown`.
    pub async fn read_text(&self, key: &str) -> Result<Option<String>, BridgeError> {
        let reply: TextReply = self.rpc_as("read_text", json!({ "key": key })).await?;
        Ok(if reply.found { reply.text } else { None })
    }

    /// Controls of the open strategy settings dialog, in page order.
    /// `None` when the dialog is not open.
    pub async fn list_inputs(&self) -> Result<Option<Vec<InputInfo>>, BridgeError> {
        let reply: InputsReply = self.rpc_as("list_inputs", json!({})).await?;
        Ok(reply.found.then_some(reply.inputs))
    }
}
