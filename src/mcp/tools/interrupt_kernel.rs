//! `interrupt_kernel` MCP tool handler.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use tracing::{info_span, Instrument};

use crate::mcp::handler::NotebookServer;
use crate::mcp::tools::util::{error_data, json_result, parse_args};

#[derive(Debug, serde::Deserialize)]
struct InterruptKernelInput {
    notebook_path: String,
}

/// Handle the `interrupt_kernel` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` when no session is attached or the signal
/// cannot be delivered.
pub async fn handle(
    context: ToolCallContext<'_, NotebookServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let args = context.arguments.unwrap_or_default();
    let input: InterruptKernelInput = parse_args("interrupt_kernel", args)?;

    let span = info_span!("interrupt_kernel", notebook_path = %input.notebook_path);
    async move {
        let session = state
            .registry
            .get(&input.notebook_path)
            .await
            .map_err(error_data)?;
        session.interrupt().await.map_err(error_data)?;

        json_result(serde_json::json!({
            "notebook_path": session.notebook_path(),
            "interrupt_requested": true,
            "lifecycle": session.lifecycle(),
        }))
    }
    .instrument(span)
    .await
}
