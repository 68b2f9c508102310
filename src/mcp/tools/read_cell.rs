//! `read_cell` MCP tool handler.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use tracing::{info_span, Instrument};

use crate::mcp::handler::NotebookServer;
use crate::mcp::tools::util::{error_data, json_result, parse_args};

#[derive(Debug, serde::Deserialize)]
struct ReadCellInput {
    notebook_path: String,
    cell_id: String,
}

/// Handle the `read_cell` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` when the session or cell does not exist.
pub async fn handle(
    context: ToolCallContext<'_, NotebookServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let args = context.arguments.unwrap_or_default();
    let input: ReadCellInput = parse_args("read_cell", args)?;

    let span = info_span!(
        "read_cell",
        notebook_path = %input.notebook_path,
        cell_id = %input.cell_id,
    );
    async move {
        let session = state
            .registry
            .get(&input.notebook_path)
            .await
            .map_err(error_data)?;
        let cell = session
            .read_cell(&input.cell_id)
            .await
            .map_err(error_data)?;

        json_result(serde_json::json!({
            "notebook_path": session.notebook_path(),
            "cell": cell,
        }))
    }
    .instrument(span)
    .await
}
