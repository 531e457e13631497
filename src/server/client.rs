//! Minimal lifecycle client for the Marksman server.
//!
//! Speaks just enough LSP to supervise the process: spawn with piped stdio,
//! Content-Length framing, the initialize handshake advertising the
//! experimental capability flags, and dispatch of `marksman/status`
//! notifications. Document synchronization stays with the host editor.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdout, Command};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::status::{STATUS_NOTIFICATION, StatusPayload};
use super::{BoxFuture, LaunchFuture, Session, SessionHandle, SessionLauncher};
use crate::resolver::ServerSpec;

/// LSP request timeout in milliseconds.
const REQUEST_TIMEOUT_MS: u64 = 2000;

/// Grace period for the server to exit after the `exit` notification.
const SHUTDOWN_GRACE_MS: u64 = 2000;

/// Session client error types.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to spawn server: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("request timeout")]
    Timeout,

    #[error("channel closed")]
    ChannelClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Events the controller observes from a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A `marksman/status` notification arrived.
    Status(StatusPayload),
    /// The server process stopped: exit, crash, or a spawn that never came up.
    Stopped,
}

/// LSP request message.
#[derive(Debug, Serialize)]
struct LspRequest {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    params: JsonValue,
}

/// LSP notification message.
#[derive(Debug, Serialize)]
struct LspNotification {
    jsonrpc: &'static str,
    method: String,
    params: JsonValue,
}

/// Any framed message coming back from the server. Responses carry an `id`
/// and no `method`; notifications and server-to-client requests carry one.
#[derive(Debug, Deserialize)]
struct IncomingMessage {
    id: Option<u64>,
    method: Option<String>,
    params: Option<JsonValue>,
    result: Option<JsonValue>,
    error: Option<JsonValue>,
}

/// State shared between the client handle and its background tasks.
struct ClientShared {
    writer_tx: mpsc::Sender<String>,
    pending: Mutex<HashMap<u64, oneshot::Sender<JsonValue>>>,
    next_id: AtomicU64,
}

impl ClientShared {
    /// Sends a request and waits for its response.
    async fn request(&self, method: &str, params: JsonValue) -> Result<JsonValue, SessionError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let msg = serde_json::to_string(&LspRequest {
            jsonrpc: "2.0",
            id,
            method: method.to_string(),
            params,
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.pending.lock().await.insert(id, response_tx);

        self.writer_tx
            .send(msg)
            .await
            .map_err(|_| SessionError::ChannelClosed)?;

        match tokio::time::timeout(Duration::from_millis(REQUEST_TIMEOUT_MS), response_rx).await
        {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(SessionError::ChannelClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(SessionError::Timeout)
            }
        }
    }

    /// Sends a notification; no response is expected.
    async fn notify(&self, method: &str, params: JsonValue) -> Result<(), SessionError> {
        let msg = serde_json::to_string(&LspNotification {
            jsonrpc: "2.0",
            method: method.to_string(),
            params,
        })?;
        self.writer_tx
            .send(msg)
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        Ok(())
    }
}

/// Client connection to a spawned Marksman server process.
pub struct LspClient {
    shared: Arc<ClientShared>,
    kill_tx: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<bool>,
    drain: Option<tokio::task::JoinHandle<()>>,
    output_path: PathBuf,
}

impl LspClient {
    /// Spawns the server and wires up its background tasks.
    ///
    /// The initialize handshake runs in the background; a server that never
    /// comes up surfaces as a [`SessionEvent::Stopped`] once its process
    /// dies, not as a spawn error.
    pub async fn spawn(
        spec: &ServerSpec,
        output_path: PathBuf,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), SessionError> {
        debug!(
            "spawning marksman server: {} {:?}",
            spec.command.display(),
            spec.args
        );

        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        let mut child = command.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::Spawn(std::io::Error::other("missing stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::Spawn(std::io::Error::other("missing stdout")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SessionError::Spawn(std::io::Error::other("missing stderr")))?;

        let (writer_tx, mut writer_rx) = mpsc::channel::<String>(64);
        let (events_tx, events_rx) = mpsc::channel::<SessionEvent>(16);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (exited_tx, exited_rx) = watch::channel(false);

        let shared = Arc::new(ClientShared {
            writer_tx,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        });

        // Writer task: frame and forward messages to the server's stdin.
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = writer_rx.recv().await {
                let header = format!("Content-Length: {}\r\n\r\n", msg.len());
                if stdin.write_all(header.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.write_all(msg.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        // Reader task: parse framed messages, resolve pending requests,
        // forward status notifications.
        let reader_shared = Arc::clone(&shared);
        let reader_events = events_tx.clone();
        tokio::spawn(async move {
            read_loop(BufReader::new(stdout), reader_shared, reader_events).await;
        });

        // Output channel: drain the server's stderr into its log file. The
        // handle is kept so stop() can wait for the log to be closed.
        let stderr_path = output_path.clone();
        let drain = tokio::spawn(async move {
            let mut log = match tokio::fs::File::create(&stderr_path).await {
                Ok(file) => file,
                Err(e) => {
                    warn!("couldn't create server output log: {}", e);
                    return;
                }
            };
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = log.write_all(line.as_bytes()).await;
                let _ = log.write_all(b"\n").await;
            }
            let _ = log.flush().await;
        });

        // Watch task: owns the child, reports its exit, handles kill requests.
        let watch_events = events_tx;
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => info!("server process exited with {}", status),
                    Err(e) => warn!("failed waiting on server process: {}", e),
                },
                _ = kill_rx => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
            let _ = watch_events.send(SessionEvent::Stopped).await;
            let _ = exited_tx.send(true);
        });

        // Handshake in the background, like the rest of the lifecycle.
        let handshake_shared = Arc::clone(&shared);
        let root = spec
            .cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        tokio::spawn(async move {
            if let Err(e) = initialize(&handshake_shared, &root).await {
                warn!("initialize handshake failed: {}", e);
            }
        });

        let client = Self {
            shared,
            kill_tx: Some(kill_tx),
            exited: exited_rx,
            drain: Some(drain),
            output_path,
        };
        Ok((client, events_rx))
    }
}

impl SessionHandle for LspClient {
    fn stop(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if !*self.exited.borrow() {
                // Graceful LSP shutdown first, then make sure the process is
                // gone.
                let _ = self.shared.request("shutdown", JsonValue::Null).await;
                let _ = self.shared.notify("exit", JsonValue::Null).await;

                let graceful = tokio::time::timeout(
                    Duration::from_millis(SHUTDOWN_GRACE_MS),
                    self.exited.wait_for(|stopped| *stopped),
                )
                .await
                .is_err();
                if graceful {
                    if let Some(kill_tx) = self.kill_tx.take() {
                        let _ = kill_tx.send(());
                    }
                    let _ = self.exited.wait_for(|stopped| *stopped).await;
                }
            }

            // Stderr EOFs once the process is dead, so the drain task is
            // guaranteed to finish. Waiting for it closes the output log
            // before any successor session recreates the same file.
            if let Some(drain) = self.drain.take() {
                let _ = drain.await;
            }
            debug!("server session stopped");
        })
    }

    fn output_path(&self) -> &Path {
        &self.output_path
    }
}

/// Production launcher backed by [`LspClient`].
pub struct StdioLauncher {
    output_path: PathBuf,
}

impl StdioLauncher {
    /// Launcher whose sessions log server stderr to `output_path`.
    #[must_use]
    pub fn new(output_path: PathBuf) -> Self {
        Self { output_path }
    }
}

impl SessionLauncher for StdioLauncher {
    fn launch(&self, spec: &ServerSpec) -> LaunchFuture {
        let spec = spec.clone();
        let output_path = self.output_path.clone();
        Box::pin(async move {
            let (client, events) = LspClient::spawn(&spec, output_path).await?;
            Ok(Session {
                handle: Box::new(client),
                events,
            })
        })
    }
}

/// Builds a `file:` URI for a root path. Windows paths get their
/// separators normalized and the drive letter placed after the URI's
/// third slash, per RFC 8089.
fn file_uri(path: &Path) -> String {
    let text = path.display().to_string().replace('\\', "/");
    if text.starts_with('/') {
        format!("file://{}", text)
    } else {
        format!("file:///{}", text)
    }
}

/// Performs the initialize handshake, advertising the experimental
/// capability flags the server looks for. All three are fixed `true`.
async fn initialize(shared: &ClientShared, root: &Path) -> Result<(), SessionError> {
    let params = json!({
        "processId": std::process::id(),
        "rootUri": file_uri(root),
        "capabilities": {
            "experimental": {
                "codeLensShowReferences": true,
                "followLinks": true,
                "statusNotification": true,
            },
        },
    });

    let result = shared.request("initialize", params).await?;
    if let Ok(init) = serde_json::from_value::<lsp_types::InitializeResult>(result) {
        if let Some(server) = init.server_info {
            debug!(
                "connected to {} {}",
                server.name,
                server.version.unwrap_or_default()
            );
        }
    }

    shared.notify("initialized", json!({})).await?;
    debug!("server initialized");
    Ok(())
}

/// Reads framed messages from the server until EOF.
async fn read_loop(
    mut reader: BufReader<ChildStdout>,
    shared: Arc<ClientShared>,
    events_tx: mpsc::Sender<SessionEvent>,
) {
    loop {
        let mut content_length: usize = 0;

        // Headers.
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) => return, // EOF
                Ok(_) => {
                    if line == "\r\n" || line == "\n" {
                        break;
                    }
                    if line.to_lowercase().starts_with("content-length:") {
                        if let Some(len_str) = line.split(':').nth(1) {
                            content_length = len_str.trim().parse().unwrap_or(0);
                        }
                    }
                }
                Err(_) => return,
            }
        }

        if content_length == 0 {
            continue;
        }

        let mut content = vec![0u8; content_length];
        if reader.read_exact(&mut content).await.is_err() {
            return;
        }
        let Ok(text) = String::from_utf8(content) else {
            continue;
        };
        let Ok(message) = serde_json::from_str::<IncomingMessage>(&text) else {
            continue;
        };

        dispatch(message, &shared, &events_tx).await;
    }
}

/// Routes one incoming message: status notifications become session events,
/// responses resolve their pending request, everything else is logged.
async fn dispatch(
    message: IncomingMessage,
    shared: &ClientShared,
    events_tx: &mpsc::Sender<SessionEvent>,
) {
    match message.method.as_deref() {
        Some(STATUS_NOTIFICATION) => {
            let payload = message
                .params
                .and_then(|params| serde_json::from_value::<StatusPayload>(params).ok());
            if let Some(payload) = payload {
                debug!("got {} notification: {:?}", STATUS_NOTIFICATION, payload);
                let _ = events_tx.send(SessionEvent::Status(payload)).await;
            }
        }
        Some(method) => {
            // Requests and notifications outside the supervised surface.
            debug!("ignoring server message: {}", method);
        }
        None => {
            let Some(id) = message.id else { return };
            if let Some(response_tx) = shared.pending.lock().await.remove(&id) {
                if let Some(error) = message.error {
                    warn!("server returned an error: {}", error);
                    let _ = response_tx.send(JsonValue::Null);
                } else {
                    let _ = response_tx.send(message.result.unwrap_or(JsonValue::Null));
                }
            }
        }
    }
}
