//! Cell model: stable identity, source, and accumulated output.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of an addressable notebook cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    /// Executable source cell.
    Code,
    /// Prose cell; never submitted to the kernel.
    Markdown,
}

/// One ordered output fragment, tagged with its kind.
///
/// Mirrors the nbformat output objects so the live document adapter can
/// round-trip real notebooks without loss.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum OutputFragment {
    /// Incremental stdout/stderr text.
    Stream {
        /// Stream name: `stdout` or `stderr`.
        name: String,
        /// Text emitted on the stream.
        text: String,
    },
    /// Runtime error raised by the executed code.
    Error {
        /// Exception type name.
        ename: String,
        /// Exception value/message.
        evalue: String,
        /// Rendered traceback lines.
        traceback: Vec<String>,
    },
    /// Rich display payload keyed by MIME type.
    DisplayData {
        /// MIME-type keyed representation map.
        data: serde_json::Map<String, serde_json::Value>,
    },
    /// Result of the final expression in the cell.
    ExecuteResult {
        /// MIME-type keyed representation map.
        data: serde_json::Map<String, serde_json::Value>,
        /// Execution count at which the result was produced.
        execution_count: Option<u32>,
    },
}

impl OutputFragment {
    /// Plain-text rendering used in tool responses and error surfaces.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Stream { text, .. } => text.clone(),
            Self::Error { ename, evalue, .. } => format!("{ename}: {evalue}"),
            Self::DisplayData { data } | Self::ExecuteResult { data, .. } => data
                .get("text/plain")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        }
    }
}

/// One cell in the notebook document.
///
/// Owned by the document sync adapter; the coordination core holds only
/// transient copies taken from a snapshot and never caches them across a
/// suspension point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CellRecord {
    /// Stable identity, independent of position.
    pub id: String,
    /// Current ordinal in the document; not an identity.
    pub position: usize,
    /// Cell kind.
    pub kind: CellKind,
    /// Source text.
    pub source: String,
    /// Set only after a successful execution is reconciled.
    pub execution_count: Option<u32>,
    /// Ordered output fragments from the most recent execution.
    pub outputs: Vec<OutputFragment>,
}

impl CellRecord {
    /// Construct a fresh cell with a generated stable identity.
    #[must_use]
    pub fn new(position: usize, kind: CellKind, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            position,
            kind,
            source: source.into(),
            execution_count: None,
            outputs: Vec::new(),
        }
    }
}

/// Point-in-time, internally consistent read of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    /// Monotonically increasing document revision.
    pub revision: u64,
    /// Cells in document order.
    pub cells: Vec<CellRecord>,
}

impl DocumentSnapshot {
    /// Look up a cell by its stable identity.
    #[must_use]
    pub fn find_cell(&self, cell_id: &str) -> Option<&CellRecord> {
        self.cells.iter().find(|cell| cell.id == cell_id)
    }
}
