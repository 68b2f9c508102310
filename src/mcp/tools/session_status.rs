//! `session_status` MCP tool handler.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use tracing::{info_span, Instrument};

use crate::mcp::handler::NotebookServer;
use crate::mcp::tools::util::{error_data, json_result, parse_args};

#[derive(Debug, serde::Deserialize)]
struct SessionStatusInput {
    notebook_path: String,
}

/// Handle the `session_status` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` when no session is attached for the path.
pub async fn handle(
    context: ToolCallContext<'_, NotebookServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let args = context.arguments.unwrap_or_default();
    let input: SessionStatusInput = parse_args("session_status", args)?;

    let span = info_span!("session_status", notebook_path = %input.notebook_path);
    async move {
        let session = state
            .registry
            .get(&input.notebook_path)
            .await
            .map_err(error_data)?;
        let status = session.status();

        let payload = serde_json::to_value(&status).map_err(|err| {
            rmcp::ErrorData::internal_error(
                format!("failed to serialize session status: {err}"),
                None,
            )
        })?;
        json_result(payload)
    }
    .instrument(span)
    .await
}
