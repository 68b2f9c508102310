//! `add_cell` MCP tool handler.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use tracing::{info_span, Instrument};

use crate::mcp::handler::NotebookServer;
use crate::mcp::tools::util::{error_data, json_result, parse_args};
use crate::models::cell::CellKind;

#[derive(Debug, serde::Deserialize)]
struct AddCellInput {
    notebook_path: String,
    source: String,
    #[serde(default = "default_kind")]
    kind: CellKind,
    after_cell_id: Option<String>,
    expected_revision: Option<u64>,
}

fn default_kind() -> CellKind {
    CellKind::Code
}

/// Handle the `add_cell` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` on busy session, missing anchor cell, or
/// stale revision.
pub async fn handle(
    context: ToolCallContext<'_, NotebookServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let args = context.arguments.unwrap_or_default();
    let input: AddCellInput = parse_args("add_cell", args)?;

    let span = info_span!("add_cell", notebook_path = %input.notebook_path);
    async move {
        let session = state
            .registry
            .get(&input.notebook_path)
            .await
            .map_err(error_data)?;
        let cell_id = session
            .add_cell(
                input.after_cell_id.as_deref(),
                input.kind,
                &input.source,
                input.expected_revision,
            )
            .await
            .map_err(error_data)?;
        // The insert bumped the revision; report the post-insert value.
        let revision = session.list_cells().await.map_err(error_data)?.revision;

        json_result(serde_json::json!({
            "notebook_path": session.notebook_path(),
            "cell_id": cell_id,
            "revision": revision,
        }))
    }
    .instrument(span)
    .await
}
