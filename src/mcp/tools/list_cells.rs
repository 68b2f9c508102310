//! `list_cells` MCP tool handler.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use tracing::{info_span, Instrument};

use crate::mcp::handler::NotebookServer;
use crate::mcp::tools::util::{error_data, json_result, parse_args};

#[derive(Debug, serde::Deserialize)]
struct ListCellsInput {
    notebook_path: String,
}

/// Handle the `list_cells` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` when no session is attached for the path.
pub async fn handle(
    context: ToolCallContext<'_, NotebookServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let args = context.arguments.unwrap_or_default();
    let input: ListCellsInput = parse_args("list_cells", args)?;

    let span = info_span!("list_cells", notebook_path = %input.notebook_path);
    async move {
        let session = state
            .registry
            .get(&input.notebook_path)
            .await
            .map_err(error_data)?;
        let snapshot = session.list_cells().await.map_err(error_data)?;

        json_result(serde_json::json!({
            "notebook_path": session.notebook_path(),
            "revision": snapshot.revision,
            "cells": snapshot.cells,
        }))
    }
    .instrument(span)
    .await
}
