//! Content-Length framed JSON-RPC over a child process's stdio
//!
//! One reader task demultiplexes responses into per-request oneshot channels;
//! one drain task keeps the child's stderr from ever backpressuring the
//! server. Writes are serialized through the shared writer mutex.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};

use crate::LspError;

struct Shared {
    writer: Mutex<ChildStdin>,
    pending: DashMap<i64, oneshot::Sender<Result<Value, LspError>>>,
    alive: AtomicBool,
}

/// A live JSON-RPC connection to one language-server process.
pub struct Transport {
    shared: Arc<Shared>,
    next_id: AtomicI64,
    child: Mutex<Child>,
}

/// Serialize a JSON-RPC message with the LSP base-protocol header.
pub(crate) fn encode_frame(message: &Value) -> Vec<u8> {
    let body = serde_json::to_vec(message).unwrap_or_default();
    let mut out = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    out.extend_from_slice(&body);
    out
}

/// Read one framed message; `Ok(None)` on clean EOF.
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<Option<Value>, LspError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        if let Some(value) = trimmed.strip_prefix("Content-Length:") {
            content_length = value.trim().parse().ok();
        }
    }
    let len = content_length.ok_or_else(|| LspError::Protocol("missing Content-Length".into()))?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}

impl Transport {
    /// Spawn the server process and start the reader and stderr-drain tasks.
    pub async fn spawn(
        program: &str,
        args: &[String],
        cwd: &std::path::Path,
    ) -> Result<Self, LspError> {
        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LspError::Unavailable(format!("{program}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::Protocol("child stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::Protocol("child stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LspError::Protocol("child stderr not captured".into()))?;

        let shared = Arc::new(Shared {
            writer: Mutex::new(stdin),
            pending: DashMap::new(),
            alive: AtomicBool::new(true),
        });

        let reader_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(message)) => Self::dispatch(&reader_shared, message).await,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!(error = %e, "language server read error");
                        break;
                    }
                }
            }
            reader_shared.alive.store(false, Ordering::SeqCst);
            // Fail anything still waiting so callers can restart.
            let ids: Vec<i64> = reader_shared.pending.iter().map(|e| *e.key()).collect();
            for id in ids {
                if let Some((_, tx)) = reader_shared.pending.remove(&id) {
                    let _ = tx.send(Err(LspError::Closed));
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::trace!(target: "codecanvas::lsp", stderr = %line);
            }
        });

        Ok(Transport {
            shared,
            next_id: AtomicI64::new(1),
            child: Mutex::new(child),
        })
    }

    async fn dispatch(shared: &Arc<Shared>, message: Value) {
        let id = message.get("id").and_then(Value::as_i64);
        let method = message.get("method").and_then(Value::as_str);
        match (id, method) {
            (Some(id), None) => {
                if let Some((_, tx)) = shared.pending.remove(&id) {
                    let _ = tx.send(Ok(message));
                }
            }
            (Some(_), Some(_)) => {
                // Server-to-client request. Answer null so the server never
                // stalls waiting on a capability we do not implement.
                let reply = json!({"jsonrpc": "2.0", "id": message["id"], "result": null});
                let mut writer = shared.writer.lock().await;
                let _ = writer.write_all(&encode_frame(&reply)).await;
                let _ = writer.flush().await;
            }
            (None, Some(method)) => {
                tracing::trace!(target: "codecanvas::lsp", method, "server notification");
            }
            (None, None) => {}
        }
    }

    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    async fn write_message(&self, message: &Value) -> Result<(), LspError> {
        if !self.is_alive() {
            return Err(LspError::Closed);
        }
        let mut writer = self.shared.writer.lock().await;
        writer.write_all(&encode_frame(message)).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Issue a request and await its response within `timeout`. On expiry a
    /// best-effort `$/cancelRequest` is sent before the error returns.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, LspError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(id, tx);
        let message = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        if let Err(e) = self.write_message(&message).await {
            self.shared.pending.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => {
                let message = result?;
                if let Some(error) = message.get("error") {
                    return Err(LspError::Protocol(error.to_string()));
                }
                Ok(message.get("result").cloned().unwrap_or(Value::Null))
            }
            Ok(Err(_)) => Err(LspError::Closed),
            Err(_) => {
                self.shared.pending.remove(&id);
                let _ = self
                    .notify("$/cancelRequest", json!({"id": id}))
                    .await;
                Err(LspError::Timeout(timeout))
            }
        }
    }

    pub async fn notify(&self, method: &str, params: Value) -> Result<(), LspError> {
        let message = json!({"jsonrpc": "2.0", "method": method, "params": params});
        self.write_message(&message).await
    }

    /// Best-effort orderly shutdown, then kill.
    pub async fn shutdown(&self) {
        let _ = self
            .request("shutdown", Value::Null, Duration::from_millis(500))
            .await;
        let _ = self.notify("exit", Value::Null).await;
        self.shared.alive.store(false, Ordering::SeqCst);
        let mut child = self.child.lock().await;
        let _ = child.kill().await;
    }
}
