//! `attach_session` MCP tool handler.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use tracing::{info_span, Instrument};

use crate::mcp::handler::NotebookServer;
use crate::mcp::tools::util::{error_data, json_result, parse_args};

#[derive(Debug, serde::Deserialize)]
struct AttachSessionInput {
    /// Server-relative notebook path.
    notebook_path: String,
}

/// Handle the `attach_session` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` when a session is already attached for the
/// path or either binding cannot be established.
pub async fn handle(
    context: ToolCallContext<'_, NotebookServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let args = context.arguments.unwrap_or_default();
    let input: AttachSessionInput = parse_args("attach_session", args)?;

    let span = info_span!("attach_session", notebook_path = %input.notebook_path);
    async move {
        let session = state
            .registry
            .attach(&input.notebook_path)
            .await
            .map_err(error_data)?;
        let status = session.status();

        json_result(serde_json::json!({
            "notebook_path": session.notebook_path(),
            "lifecycle": status.lifecycle,
            "document_revision": status.document_revision,
        }))
    }
    .instrument(span)
    .await
}
