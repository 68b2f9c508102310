//! `delete_cell` MCP tool handler.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use tracing::{info_span, Instrument};

use crate::mcp::handler::NotebookServer;
use crate::mcp::tools::util::{error_data, json_result, parse_args};

#[derive(Debug, serde::Deserialize)]
struct DeleteCellInput {
    notebook_path: String,
    cell_id: String,
    expected_revision: u64,
}

/// Handle the `delete_cell` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` on busy session, unknown cell, or stale
/// revision.
pub async fn handle(
    context: ToolCallContext<'_, NotebookServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let args = context.arguments.unwrap_or_default();
    let input: DeleteCellInput = parse_args("delete_cell", args)?;

    let span = info_span!(
        "delete_cell",
        notebook_path = %input.notebook_path,
        cell_id = %input.cell_id,
    );
    async move {
        let session = state
            .registry
            .get(&input.notebook_path)
            .await
            .map_err(error_data)?;
        session
            .delete_cell(&input.cell_id, input.expected_revision)
            .await
            .map_err(error_data)?;
        let revision = session.list_cells().await.map_err(error_data)?.revision;

        json_result(serde_json::json!({
            "notebook_path": session.notebook_path(),
            "deleted_cell_id": input.cell_id,
            "revision": revision,
        }))
    }
    .instrument(span)
    .await
}
