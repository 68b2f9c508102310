//! Live kernel channel adapter for a running Jupyter server.
//!
//! Resolves the kernel attached to the notebook through the sessions REST
//! API, then speaks the kernel wire protocol over the multiplexed
//! `/api/kernels/{id}/channels` websocket. Interrupt and restart are REST
//! posts against the kernel resource.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::kernel::channel::{KernelChannel, KernelEvent};
use crate::kernel::wire;
use crate::{AppError, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Bounded event queue between the websocket reader task and `next_event`.
const EVENT_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Deserialize)]
struct SessionEntry {
    path: String,
    kernel: KernelEntry,
}

#[derive(Debug, Deserialize)]
struct KernelEntry {
    id: String,
}

/// Kernel channel bound to one kernel on a Jupyter server.
pub struct JupyterKernel {
    http: reqwest::Client,
    server_url: String,
    token: String,
    kernel_id: String,
    writer: Mutex<WsSink>,
    events: Mutex<mpsc::Receiver<KernelEvent>>,
    client_session: String,
    reader: tokio::task::JoinHandle<()>,
}

impl JupyterKernel {
    /// Connect to the kernel currently attached to `notebook_path`.
    ///
    /// Follows the sessions API: the kernel whose session path matches the
    /// notebook is preferred; when none matches, the first running session's
    /// kernel is used so the agent shares whatever the operator has open.
    ///
    /// # Errors
    ///
    /// Returns `AppError::KernelUnavailable` when no session is running, or
    /// `AppError::AttachFailed` when the server or websocket is unreachable.
    pub async fn connect(server_url: &str, token: &str, notebook_path: &str) -> Result<Self> {
        let http = reqwest::Client::new();
        let kernel_id = resolve_kernel_id(&http, server_url, token, notebook_path).await?;
        info!(kernel_id, notebook_path, "resolved kernel for notebook");

        let client_session = Uuid::new_v4().to_string();
        let ws_url = channels_url(server_url, &kernel_id, &client_session, token)?;

        let (socket, _response) = connect_async(ws_url.as_str())
            .await
            .map_err(|err| AppError::AttachFailed(format!("kernel websocket: {err}")))?;
        let (writer, mut read) = socket.split();

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let reader = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                let Ok(Message::Text(text)) = frame else {
                    continue;
                };
                let Ok(message) = serde_json::from_str::<wire::WireMessage>(&text) else {
                    debug!("skipping unparseable kernel frame");
                    continue;
                };
                if let Some(event) = wire::parse_event(&message) {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
            debug!("kernel websocket reader finished");
        });

        Ok(Self {
            http,
            server_url: server_url.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
            kernel_id,
            writer: Mutex::new(writer),
            events: Mutex::new(rx),
            client_session,
            reader,
        })
    }

    async fn kernel_action(&self, action: &str) -> Result<()> {
        let url = format!(
            "{}/api/kernels/{}/{action}",
            self.server_url, self.kernel_id
        );
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("token {}", self.token))
            .send()
            .await
            .map_err(|err| AppError::KernelFault(format!("{action} request failed: {err}")))?;
        if !response.status().is_success() {
            return Err(AppError::KernelFault(format!(
                "{action} returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl KernelChannel for JupyterKernel {
    async fn submit(&self, code: &str) -> Result<String> {
        let (execution_id, message) = wire::execute_request(&self.client_session, code);
        let text = serde_json::to_string(&message)
            .map_err(|err| AppError::KernelFault(format!("encode execute_request: {err}")))?;

        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Text(text))
            .await
            .map_err(|err| AppError::KernelUnavailable(format!("kernel channel closed: {err}")))?;

        debug!(execution_id, "submitted execute_request");
        Ok(execution_id)
    }

    async fn next_event(&self) -> Result<KernelEvent> {
        self.events
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| AppError::KernelFault("kernel event stream closed".into()))
    }

    async fn interrupt(&self) -> Result<()> {
        info!(kernel_id = %self.kernel_id, "interrupting kernel");
        self.kernel_action("interrupt").await
    }

    async fn restart(&self) -> Result<()> {
        info!(kernel_id = %self.kernel_id, "restarting kernel");
        self.kernel_action("restart").await
    }

    async fn disconnect(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        if let Err(err) = writer.send(Message::Close(None)).await {
            warn!(%err, "error closing kernel websocket");
        }
        self.reader.abort();
        Ok(())
    }
}

/// Resolve the kernel id for a notebook from the running sessions.
async fn resolve_kernel_id(
    http: &reqwest::Client,
    server_url: &str,
    token: &str,
    notebook_path: &str,
) -> Result<String> {
    let url = format!("{}/api/sessions", server_url.trim_end_matches('/'));
    let response = http
        .get(&url)
        .header("Authorization", format!("token {token}"))
        .send()
        .await
        .map_err(|err| AppError::AttachFailed(format!("sessions query failed: {err}")))?;

    if response.status() == reqwest::StatusCode::UNAUTHORIZED
        || response.status() == reqwest::StatusCode::FORBIDDEN
    {
        return Err(AppError::AttachFailed(
            "jupyter server rejected the bearer credential".into(),
        ));
    }

    let sessions: Vec<SessionEntry> = response
        .json()
        .await
        .map_err(|err| AppError::AttachFailed(format!("invalid sessions payload: {err}")))?;

    if let Some(entry) = sessions.iter().find(|entry| entry.path == notebook_path) {
        return Ok(entry.kernel.id.clone());
    }

    // No kernel for this notebook: fall back to the first running session so
    // the agent shares the kernel the operator already has open.
    if let Some(entry) = sessions.first() {
        info!(
            notebook_path,
            fallback = %entry.path,
            "no kernel for notebook, using first running session"
        );
        return Ok(entry.kernel.id.clone());
    }

    Err(AppError::KernelUnavailable(
        "no active notebook sessions found; open a notebook in Jupyter first".into(),
    ))
}

/// Build the multiplexed channels websocket URL for a kernel.
fn channels_url(
    server_url: &str,
    kernel_id: &str,
    client_session: &str,
    token: &str,
) -> Result<Url> {
    let mut url = Url::parse(server_url)
        .map_err(|err| AppError::AttachFailed(format!("invalid server url: {err}")))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|()| AppError::AttachFailed("cannot derive websocket scheme".into()))?;
    url.set_path(&format!("api/kernels/{kernel_id}/channels"));
    url.query_pairs_mut()
        .append_pair("session_id", client_session);
    if !token.is_empty() {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}
