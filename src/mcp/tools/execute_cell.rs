//! `execute_cell` MCP tool handler.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use tokio::time::Duration;
use tracing::{info_span, Instrument};

use crate::mcp::handler::NotebookServer;
use crate::mcp::tools::util::{error_data, json_result, parse_args};

#[derive(Debug, serde::Deserialize)]
struct ExecuteCellInput {
    notebook_path: String,
    cell_id: String,
    expected_revision: Option<u64>,
    /// Overrides the configured execute timeout.
    timeout_seconds: Option<u64>,
}

/// Handle the `execute_cell` tool call.
///
/// A runtime error in the executed code is a successful tool reply with
/// `status = "error"`; only infrastructure failures become MCP errors.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` on busy session, guard rejection, timeout,
/// or kernel loss.
pub async fn handle(
    context: ToolCallContext<'_, NotebookServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let args = context.arguments.unwrap_or_default();
    let input: ExecuteCellInput = parse_args("execute_cell", args)?;

    let timeout = Duration::from_secs(
        input
            .timeout_seconds
            .unwrap_or(state.config.timeouts.execute_seconds),
    );
    let span = info_span!(
        "execute_cell",
        notebook_path = %input.notebook_path,
        cell_id = %input.cell_id,
    );
    async move {
        let session = state
            .registry
            .get(&input.notebook_path)
            .await
            .map_err(error_data)?;
        let outcome = session
            .execute_cell(&input.cell_id, input.expected_revision, timeout)
            .await
            .map_err(error_data)?;

        let mut payload = serde_json::to_value(&outcome).map_err(|err| {
            rmcp::ErrorData::internal_error(
                format!("failed to serialize execution outcome: {err}"),
                None,
            )
        })?;
        if let serde_json::Value::Object(ref mut map) = payload {
            map.insert(
                "notebook_path".into(),
                serde_json::Value::String(session.notebook_path().to_owned()),
            );
            map.insert(
                "cell_id".into(),
                serde_json::Value::String(input.cell_id.clone()),
            );
        }
        json_result(payload)
    }
    .instrument(span)
    .await
}
