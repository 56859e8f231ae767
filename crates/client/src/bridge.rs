//! Live debug bridge into the running Plaud Desktop app.
//!
//! Instead of holding a credential of our own, attach to the desktop process:
//! `SIGUSR1` makes its Electron main process open the Node inspector, the
//! inspector's HTTP endpoint hands out a WebSocket debugger URL, and API calls
//! are then `Runtime.evaluate` of `fetch` expressions executed inside the
//! app's already-authenticated context.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::Config;
use crate::error::{ClientError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Process names the desktop app registers under.
const PROCESS_NAMES: &[&str] = &["Plaud", "plaud", "Plaud Desktop"];
/// Poll interval while waiting for the inspector to come up.
const HANDSHAKE_POLL: Duration = Duration::from_millis(250);
/// Per-evaluate response deadline.
const EVALUATE_TIMEOUT: Duration = Duration::from_secs(30);

/// A live inspector connection. One logical caller at a time; the stream sits
/// behind a mutex only so the handle can be shared with the cached session.
pub struct BridgeHandle {
    ws: Mutex<WsStream>,
    next_id: AtomicI64,
    pid: i32,
}

impl std::fmt::Debug for BridgeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHandle").field("pid", &self.pid).finish()
    }
}

/// Attach to the running desktop app.
pub async fn attach(config: &Config) -> Result<BridgeHandle> {
    let pid = find_desktop_pid()?;
    log::info!("attaching to Plaud Desktop (pid {pid})");
    signal_inspector_open(pid)?;

    let ws_url = tokio::time::timeout(
        config.handshake_timeout,
        wait_for_debugger_url(config.bridge_port),
    )
    .await
    .map_err(|_| {
        ClientError::BridgeHandshakeFailed(format!(
            "inspector did not come up on port {} within {:?}",
            config.bridge_port, config.handshake_timeout
        ))
    })??;

    let (ws, _response) = connect_async(&ws_url)
        .await
        .map_err(|e| ClientError::BridgeHandshakeFailed(format!("websocket connect: {e}")))?;
    log::debug!("bridge connected to {ws_url}");

    Ok(BridgeHandle {
        ws: Mutex::new(ws),
        next_id: AtomicI64::new(1),
        pid,
    })
}

impl BridgeHandle {
    /// Run `fetch(url)` inside the app and return `(status, body)`.
    pub async fn evaluate_fetch(&self, url: &str) -> Result<(u16, String)> {
        let url_literal = serde_json::to_string(url)
            .map_err(|e| ClientError::InvalidInput(format!("unencodable url: {e}")))?;
        let expression = format!(
            "(async () => {{ \
               const resp = await fetch({url_literal}); \
               const body = await resp.text(); \
               return {{ status: resp.status, body }}; \
             }})()"
        );
        let value = self.evaluate(&expression).await?;

        let status = value
            .get("status")
            .and_then(Value::as_u64)
            .ok_or_else(|| remote_protocol_error("fetch result missing status"))?
            as u16;
        let body = value
            .get("body")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok((status, body))
    }

    /// One `Runtime.evaluate` round trip, returning the by-value result.
    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "id": id,
            "method": "Runtime.evaluate",
            "params": {
                "expression": expression,
                "awaitPromise": true,
                "returnByValue": true,
            }
        });

        let mut ws = self.ws.lock().await;
        ws.send(Message::Text(request.to_string().into()))
            .await
            .map_err(|e| ClientError::BridgeHandshakeFailed(format!("bridge send: {e}")))?;

        let reply = tokio::time::timeout(EVALUATE_TIMEOUT, async {
            // The inspector interleaves event notifications; skip until our id.
            loop {
                let msg = ws.next().await.ok_or_else(|| {
                    ClientError::BridgeHandshakeFailed("bridge connection closed".to_string())
                })??;
                if let Message::Text(text) = msg {
                    let value: Value = serde_json::from_str(&text)
                        .map_err(|e| remote_protocol_error(&format!("bad bridge frame: {e}")))?;
                    if value.get("id").and_then(Value::as_i64) == Some(id) {
                        return Ok::<Value, ClientError>(value);
                    }
                }
            }
        })
        .await
        .map_err(|_| ClientError::Timeout("bridge evaluate".to_string()))??;

        if let Some(exception) = reply.pointer("/result/exceptionDetails") {
            return Err(remote_protocol_error(&format!(
                "evaluate threw: {}",
                exception
                    .pointer("/exception/description")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown exception")
            )));
        }
        reply
            .pointer("/result/result/value")
            .cloned()
            .ok_or_else(|| remote_protocol_error("evaluate returned no value"))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::BridgeHandshakeFailed(format!("bridge transport: {err}"))
    }
}

fn remote_protocol_error(message: &str) -> ClientError {
    ClientError::RemoteError {
        status: 0,
        message: message.to_string(),
    }
}

/// Ask the process to open its inspector port.
fn signal_inspector_open(pid: i32) -> Result<()> {
    // SIGUSR1 is Node's documented "start inspector" signal; Electron's main
    // process inherits it.
    let rc = unsafe { libc::kill(pid, libc::SIGUSR1) };
    if rc != 0 {
        return Err(ClientError::BridgeHandshakeFailed(format!(
            "failed to signal pid {pid}: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Poll the inspector's discovery endpoint until a debuggable target appears.
async fn wait_for_debugger_url(port: u16) -> Result<String> {
    let http = reqwest::Client::new();
    let list_url = format!("http://127.0.0.1:{port}/json/list");
    loop {
        if let Ok(resp) = http.get(&list_url).send().await {
            if let Ok(targets) = resp.json::<Value>().await {
                if let Some(url) = targets
                    .as_array()
                    .and_then(|arr| arr.first())
                    .and_then(|t| t.get("webSocketDebuggerUrl"))
                    .and_then(Value::as_str)
                {
                    return Ok(url.to_string());
                }
            }
        }
        tokio::time::sleep(HANDSHAKE_POLL).await;
    }
}

/// Find the desktop app's main process.
#[cfg(target_os = "linux")]
fn find_desktop_pid() -> Result<i32> {
    let proc = std::path::Path::new("/proc");
    let entries = std::fs::read_dir(proc)
        .map_err(|e| ClientError::ProcessNotRunning(format!("cannot scan /proc: {e}")))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<i32>() else {
            continue;
        };
        let Ok(comm) = std::fs::read_to_string(entry.path().join("comm")) else {
            continue;
        };
        if PROCESS_NAMES.iter().any(|name| comm.trim() == *name) {
            return Ok(pid);
        }
    }
    Err(ClientError::ProcessNotRunning(
        "Plaud Desktop process not found; launch the app and sign in".to_string(),
    ))
}

#[cfg(not(target_os = "linux"))]
fn find_desktop_pid() -> Result<i32> {
    for name in PROCESS_NAMES {
        let output = std::process::Command::new("pgrep")
            .args(["-x", name])
            .output()
            .map_err(|e| ClientError::ProcessNotRunning(format!("pgrep failed: {e}")))?;
        if output.status.success() {
            if let Some(pid) = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .and_then(|line| line.trim().parse::<i32>().ok())
            {
                return Ok(pid);
            }
        }
    }
    Err(ClientError::ProcessNotRunning(
        "Plaud Desktop process not found; launch the app and sign in".to_string(),
    ))
}
