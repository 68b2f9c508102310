//! `install_packages` MCP tool handler.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use tokio::time::Duration;
use tracing::{info_span, Instrument};

use crate::mcp::handler::NotebookServer;
use crate::mcp::tools::util::{error_data, json_result, parse_args};

#[derive(Debug, serde::Deserialize)]
struct InstallPackagesInput {
    notebook_path: String,
    packages: Vec<String>,
    timeout_seconds: Option<u64>,
}

/// Handle the `install_packages` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` on empty package list, busy session, or
/// execution infrastructure failure.
pub async fn handle(
    context: ToolCallContext<'_, NotebookServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let args = context.arguments.unwrap_or_default();
    let input: InstallPackagesInput = parse_args("install_packages", args)?;

    if input.packages.is_empty() {
        return Err(rmcp::ErrorData::invalid_params(
            "packages must not be empty",
            None,
        ));
    }
    if let Some(bad) = input
        .packages
        .iter()
        .find(|p| p.chars().any(char::is_whitespace) || p.is_empty())
    {
        return Err(rmcp::ErrorData::invalid_params(
            format!("invalid package name: {bad:?}"),
            None,
        ));
    }

    let timeout = Duration::from_secs(
        input
            .timeout_seconds
            .unwrap_or(state.config.timeouts.execute_seconds),
    );
    let span = info_span!(
        "install_packages",
        notebook_path = %input.notebook_path,
        packages = %input.packages.join(" "),
    );
    async move {
        let session = state
            .registry
            .get(&input.notebook_path)
            .await
            .map_err(error_data)?;
        let outcome = session
            .install_packages(&input.packages.join(" "), timeout)
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
        }
        json_result(payload)
    }
    .instrument(span)
    .await
}
