//! Shared utilities for MCP tool handlers.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::AppError;

/// Deserialize tool arguments into the handler's input struct.
///
/// # Errors
///
/// Returns `rmcp::ErrorData::invalid_params` with the serde message when
/// the arguments do not match the tool's schema.
pub fn parse_args<T: DeserializeOwned>(
    tool: &str,
    args: serde_json::Map<String, Value>,
) -> Result<T, rmcp::ErrorData> {
    serde_json::from_value(Value::Object(args)).map_err(|err| {
        rmcp::ErrorData::invalid_params(format!("invalid {tool} parameters: {err}"), None)
    })
}

/// Map a domain error to the MCP error surface.
///
/// Precondition failures the caller can repair (bad cell identity, stale
/// revision, busy session, duplicate attach, closed session) map to
/// `invalid_params`; infrastructure failures map to `internal_error`.
#[must_use]
pub fn error_data(err: AppError) -> rmcp::ErrorData {
    match err {
        AppError::CellNotFound(_)
        | AppError::StaleRevision { .. }
        | AppError::SessionBusy(_)
        | AppError::AlreadyAttached(_)
        | AppError::SessionClosed(_) => rmcp::ErrorData::invalid_params(err.to_string(), None),
        _ => rmcp::ErrorData::internal_error(err.to_string(), None),
    }
}

/// Wrap a JSON payload as a successful tool result.
///
/// # Errors
///
/// Returns `rmcp::ErrorData::internal_error` if the payload cannot be
/// serialized.
pub fn json_result(value: Value) -> Result<rmcp::model::CallToolResult, rmcp::ErrorData> {
    Ok(rmcp::model::CallToolResult::success(vec![
        rmcp::model::Content::json(value).map_err(|err| {
            rmcp::ErrorData::internal_error(format!("failed to serialize response: {err}"), None)
        })?,
    ]))
}
