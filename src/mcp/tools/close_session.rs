//! `close_session` MCP tool handler.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use tracing::{info_span, Instrument};

use crate::mcp::handler::NotebookServer;
use crate::mcp::tools::util::{error_data, json_result, parse_args};
use crate::session::registry::ensure_ipynb_extension;

#[derive(Debug, serde::Deserialize)]
struct CloseSessionInput {
    notebook_path: String,
}

/// Handle the `close_session` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` when no session is attached for the path.
pub async fn handle(
    context: ToolCallContext<'_, NotebookServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let args = context.arguments.unwrap_or_default();
    let input: CloseSessionInput = parse_args("close_session", args)?;

    let span = info_span!("close_session", notebook_path = %input.notebook_path);
    async move {
        state
            .registry
            .close(&input.notebook_path)
            .await
            .map_err(error_data)?;

        json_result(serde_json::json!({
            "notebook_path": ensure_ipynb_extension(&input.notebook_path),
            "closed": true,
        }))
    }
    .instrument(span)
    .await
}
