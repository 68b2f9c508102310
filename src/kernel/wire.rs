//! Jupyter kernel wire protocol (v5.x) message codec.
//!
//! The Jupyter server multiplexes all kernel channels over one websocket;
//! each JSON frame carries a `channel` field plus the standard
//! header/parent-header/content envelope. Only the message types the
//! coordination core consumes are modeled here.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::kernel::channel::KernelEvent;
use crate::models::cell::OutputFragment;

/// Protocol version spoken on the shell channel.
const PROTOCOL_VERSION: &str = "5.3";

/// Standard message header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageHeader {
    /// Unique message id; doubles as the execution id for requests.
    pub msg_id: String,
    /// Message type, e.g. `execute_request` or `stream`.
    pub msg_type: String,
    /// Client username (informational).
    pub username: String,
    /// Client session id.
    pub session: String,
    /// ISO-8601 timestamp.
    pub date: String,
    /// Wire protocol version.
    pub version: String,
}

/// One websocket frame exchanged with the kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Message header.
    pub header: MessageHeader,
    /// Header of the request this message replies to (empty object for
    /// client-originated requests).
    #[serde(default)]
    pub parent_header: Value,
    /// Transport metadata (unused by this core).
    #[serde(default)]
    pub metadata: Value,
    /// Type-specific payload.
    #[serde(default)]
    pub content: Value,
    /// Kernel channel: `shell` or `iopub`.
    #[serde(default)]
    pub channel: String,
}

/// Build an `execute_request` frame; returns `(execution_id, frame)`.
#[must_use]
pub fn execute_request(client_session: &str, code: &str) -> (String, WireMessage) {
    let msg_id = Uuid::new_v4().to_string();
    let message = WireMessage {
        header: MessageHeader {
            msg_id: msg_id.clone(),
            msg_type: "execute_request".into(),
            username: "notebook-mcp".into(),
            session: client_session.to_owned(),
            date: Utc::now().to_rfc3339(),
            version: PROTOCOL_VERSION.into(),
        },
        parent_header: Value::Object(serde_json::Map::new()),
        metadata: Value::Object(serde_json::Map::new()),
        content: serde_json::json!({
            "code": code,
            "silent": false,
            "store_history": true,
            "user_expressions": {},
            "allow_stdin": false,
            "stop_on_error": true,
        }),
        channel: "shell".into(),
    };
    (msg_id, message)
}

/// Map an incoming frame to a [`KernelEvent`], if it carries one.
///
/// Frames without a parent `msg_id` (kernel-originated status chatter) and
/// message types the core does not consume yield `None`. The iopub `error`
/// frame is intentionally skipped: the shell `execute_reply` carries the
/// same ename/evalue/traceback and the state machine reconciles the error
/// output from the terminal event, so mapping both would duplicate it.
#[must_use]
pub fn parse_event(message: &WireMessage) -> Option<KernelEvent> {
    let execution_id = message
        .parent_header
        .get("msg_id")
        .and_then(Value::as_str)?
        .to_owned();

    match message.header.msg_type.as_str() {
        "stream" => {
            let name = content_str(&message.content, "name")?;
            let text = joined_text(message.content.get("text")?);
            Some(KernelEvent::Fragment {
                execution_id,
                fragment: OutputFragment::Stream { name, text },
            })
        }
        "display_data" => {
            let data = content_map(&message.content, "data")?;
            Some(KernelEvent::Fragment {
                execution_id,
                fragment: OutputFragment::DisplayData { data },
            })
        }
        "execute_result" => {
            let data = content_map(&message.content, "data")?;
            let execution_count = content_count(&message.content);
            Some(KernelEvent::Fragment {
                execution_id,
                fragment: OutputFragment::ExecuteResult {
                    data,
                    execution_count,
                },
            })
        }
        "execute_reply" => {
            let status = content_str(&message.content, "status")?;
            match status.as_str() {
                "ok" => Some(KernelEvent::Completed {
                    execution_id,
                    execution_count: content_count(&message.content),
                }),
                "aborted" => Some(KernelEvent::Interrupted { execution_id }),
                _ => {
                    let ename = content_str(&message.content, "ename").unwrap_or_default();
                    if ename == "KeyboardInterrupt" {
                        return Some(KernelEvent::Interrupted { execution_id });
                    }
                    Some(KernelEvent::Failed {
                        execution_id,
                        evalue: content_str(&message.content, "evalue").unwrap_or_default(),
                        traceback: traceback_lines(&message.content),
                        ename,
                    })
                }
            }
        }
        _ => None,
    }
}

fn content_str(content: &Value, key: &str) -> Option<String> {
    content.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn content_map(content: &Value, key: &str) -> Option<serde_json::Map<String, Value>> {
    content.get(key).and_then(Value::as_object).cloned()
}

fn content_count(content: &Value) -> Option<u32> {
    content
        .get("execution_count")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

fn traceback_lines(content: &Value) -> Vec<String> {
    content
        .get("traceback")
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Join nbformat-style text, which may be a plain string or a line list.
fn joined_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(lines) => lines
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .concat(),
        _ => String::new(),
    }
}
