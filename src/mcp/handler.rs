//! MCP server handler, shared application state, and tool router.

use std::future::Future;
use std::sync::Arc;

use rmcp::handler::server::{
    tool::{ToolCallContext, ToolRoute, ToolRouter},
    ServerHandler,
};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ListToolsResult, PaginatedRequestParam, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use tracing::info_span;

use crate::config::GlobalConfig;
use crate::session::SessionRegistry;

/// Shared application state accessible by all MCP tool handlers.
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Registry of live notebook sessions.
    pub registry: Arc<SessionRegistry>,
}

/// MCP server implementation exposing the notebook session tools.
pub struct NotebookServer {
    state: Arc<AppState>,
}

impl NotebookServer {
    /// Create a new MCP server bound to shared application state.
    #[must_use]
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Access the shared application state.
    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    fn tool_router() -> ToolRouter<Self> {
        let mut router = ToolRouter::new();

        for tool in Self::all_tools() {
            let name = tool.name.to_string();
            match name.as_str() {
                "attach_session" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(crate::mcp::tools::attach_session::handle(context))
                    }));
                }
                "list_cells" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(crate::mcp::tools::list_cells::handle(context))
                    }));
                }
                "read_cell" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(crate::mcp::tools::read_cell::handle(context))
                    }));
                }
                "add_cell" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(crate::mcp::tools::add_cell::handle(context))
                    }));
                }
                "edit_cell" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(crate::mcp::tools::edit_cell::handle(context))
                    }));
                }
                "delete_cell" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(crate::mcp::tools::delete_cell::handle(context))
                    }));
                }
                "execute_cell" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(crate::mcp::tools::execute_cell::handle(context))
                    }));
                }
                "install_packages" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(crate::mcp::tools::install_packages::handle(context))
                    }));
                }
                "session_status" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(crate::mcp::tools::session_status::handle(context))
                    }));
                }
                "interrupt_kernel" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(crate::mcp::tools::interrupt_kernel::handle(context))
                    }));
                }
                "restart_kernel" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(crate::mcp::tools::restart_kernel::handle(context))
                    }));
                }
                "close_session" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(crate::mcp::tools::close_session::handle(context))
                    }));
                }
                _ => {
                    router.add_route(ToolRoute::new_dyn(tool, |_context| {
                        Box::pin(async {
                            Err(rmcp::ErrorData::internal_error(
                                "tool not implemented",
                                None,
                            ))
                        })
                    }));
                }
            }
        }

        router
    }

    /// Convert a `serde_json::Value::Object` into the `Arc<Map>` expected by `Tool`.
    fn schema(value: serde_json::Value) -> Arc<serde_json::Map<String, serde_json::Value>> {
        match value {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::default()),
        }
    }

    #[allow(clippy::too_many_lines)] // Tool definitions are intentionally verbose for clarity.
    fn all_tools() -> Vec<Tool> {
        vec![
            Tool {
                name: "attach_session".into(),
                description: Some(
                    "Attach a coordination session to a notebook on the Jupyter server, \
                     binding its kernel channel and document. Fails if a session for \
                     this notebook is already attached."
                        .into(),
                ),
                input_schema: Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "notebook_path": { "type": "string", "description": "Server-relative notebook path; .ipynb is appended when missing" }
                    },
                    "required": ["notebook_path"]
                })),
                output_schema: None,
                annotations: None,
                title: None,
                icons: None,
                meta: None,
            },
            Tool {
                name: "list_cells".into(),
                description: Some(
                    "Return a point-in-time snapshot of the notebook: document revision \
                     plus every cell's id, position, kind, source, execution count, and \
                     outputs."
                        .into(),
                ),
                input_schema: Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "notebook_path": { "type": "string" }
                    },
                    "required": ["notebook_path"]
                })),
                output_schema: None,
                annotations: None,
                title: None,
                icons: None,
                meta: None,
            },
            Tool {
                name: "read_cell".into(),
                description: Some(
                    "Read one cell by its stable identity, including source and outputs.".into(),
                ),
                input_schema: Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "notebook_path": { "type": "string" },
                        "cell_id": { "type": "string" }
                    },
                    "required": ["notebook_path", "cell_id"]
                })),
                output_schema: None,
                annotations: None,
                title: None,
                icons: None,
                meta: None,
            },
            Tool {
                name: "add_cell".into(),
                description: Some(
                    "Insert a new cell. Placed after the referenced cell, or appended \
                     at the end when no reference is given. Returns the new cell's id \
                     and the resulting document revision."
                        .into(),
                ),
                input_schema: Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "notebook_path": { "type": "string" },
                        "source": { "type": "string" },
                        "kind": { "type": "string", "enum": ["code", "markdown"], "default": "code" },
                        "after_cell_id": { "type": "string", "description": "Insert after this cell; omit to append at the end" },
                        "expected_revision": { "type": "integer", "description": "Reject with stale_revision if the document has moved past this revision" }
                    },
                    "required": ["notebook_path", "source"]
                })),
                output_schema: None,
                annotations: None,
                title: None,
                icons: None,
                meta: None,
            },
            Tool {
                name: "edit_cell".into(),
                description: Some(
                    "Replace a cell's source text. Requires the revision the caller \
                     last observed; a concurrent edit is rejected, never merged."
                        .into(),
                ),
                input_schema: Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "notebook_path": { "type": "string" },
                        "cell_id": { "type": "string" },
                        "source": { "type": "string" },
                        "expected_revision": { "type": "integer" }
                    },
                    "required": ["notebook_path", "cell_id", "source", "expected_revision"]
                })),
                output_schema: None,
                annotations: None,
                title: None,
                icons: None,
                meta: None,
            },
            Tool {
                name: "delete_cell".into(),
                description: Some(
                    "Delete a cell. Requires the revision the caller last observed.".into(),
                ),
                input_schema: Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "notebook_path": { "type": "string" },
                        "cell_id": { "type": "string" },
                        "expected_revision": { "type": "integer" }
                    },
                    "required": ["notebook_path", "cell_id", "expected_revision"]
                })),
                output_schema: None,
                annotations: None,
                title: None,
                icons: None,
                meta: None,
            },
            Tool {
                name: "execute_cell".into(),
                description: Some(
                    "Execute a code cell and wait for its terminal event. Output \
                     fragments are written to the document as they stream. A runtime \
                     error in the code is reported in the result payload, with a \
                     bounded automatic retry after installing a missing dependency. \
                     On timeout the execution continues in the background."
                        .into(),
                ),
                input_schema: Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "notebook_path": { "type": "string" },
                        "cell_id": { "type": "string" },
                        "expected_revision": { "type": "integer" },
                        "timeout_seconds": { "type": "integer", "description": "Overrides the configured execute timeout" }
                    },
                    "required": ["notebook_path", "cell_id"]
                })),
                output_schema: None,
                annotations: None,
                title: None,
                icons: None,
                meta: None,
            },
            Tool {
                name: "install_packages".into(),
                description: Some(
                    "Add a cell that installs the given packages into the kernel \
                     environment and execute it, so the install is part of the \
                     notebook's history."
                        .into(),
                ),
                input_schema: Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "notebook_path": { "type": "string" },
                        "packages": {
                            "type": "array",
                            "items": { "type": "string" },
                            "minItems": 1
                        },
                        "timeout_seconds": { "type": "integer" }
                    },
                    "required": ["notebook_path", "packages"]
                })),
                output_schema: None,
                annotations: None,
                title: None,
                icons: None,
                meta: None,
            },
            Tool {
                name: "session_status".into(),
                description: Some(
                    "Report a session's lifecycle state, in-flight execution, and the \
                     most recently observed document revision."
                        .into(),
                ),
                input_schema: Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "notebook_path": { "type": "string" }
                    },
                    "required": ["notebook_path"]
                })),
                output_schema: None,
                annotations: None,
                title: None,
                icons: None,
                meta: None,
            },
            Tool {
                name: "interrupt_kernel".into(),
                description: Some(
                    "Best-effort signal to abort the running execution. A no-op when \
                     nothing is running."
                        .into(),
                ),
                input_schema: Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "notebook_path": { "type": "string" }
                    },
                    "required": ["notebook_path"]
                })),
                output_schema: None,
                annotations: None,
                title: None,
                icons: None,
                meta: None,
            },
            Tool {
                name: "restart_kernel".into(),
                description: Some(
                    "Restart the kernel, discarding all interpreter state. Cell \
                     outputs and execution counts in the document are preserved."
                        .into(),
                ),
                input_schema: Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "notebook_path": { "type": "string" }
                    },
                    "required": ["notebook_path"]
                })),
                output_schema: None,
                annotations: None,
                title: None,
                icons: None,
                meta: None,
            },
            Tool {
                name: "close_session".into(),
                description: Some(
                    "Release a session's kernel and document bindings. Terminal; \
                     attach again to resume work on the notebook."
                        .into(),
                ),
                input_schema: Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "notebook_path": { "type": "string" }
                    },
                    "required": ["notebook_path"]
                })),
                output_schema: None,
                annotations: None,
                title: None,
                icons: None,
                meta: None,
            },
        ]
    }
}

impl ServerHandler for NotebookServer {
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, rmcp::ErrorData>> + Send + '_ {
        let router = Self::tool_router();
        let _span = info_span!("call_tool", tool = %request.name).entered();

        async move {
            router
                .call(ToolCallContext::new(self, request, context))
                .await
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, rmcp::ErrorData>> + Send + '_ {
        let tools = Self::all_tools();

        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }
}
