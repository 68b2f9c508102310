//! Document sync contract and change notifications.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::models::cell::{CellKind, DocumentSnapshot, OutputFragment};
use crate::Result;

/// Notification of an externally-originated document change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Another writer (e.g. a human in the UI) changed the document.
    ExternalEdit {
        /// Revision the document advanced to.
        revision: u64,
    },
}

/// Connection to the collaborative document holding cell source/outputs.
///
/// Revision-checked mutations fail with `StaleRevision` when the caller's
/// declared revision no longer matches, so a concurrent edit is never
/// silently clobbered. The output/execution-count primitives are used only
/// by the session state machine while reconciling kernel events and are
/// idempotent by cell id.
#[async_trait]
pub trait DocumentSync: Send + Sync {
    /// Point-in-time, internally consistent read of the cell list.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Document` if the document cannot be read.
    async fn snapshot(&self) -> Result<DocumentSnapshot>;

    /// Insert a cell after `after_cell_id` (or at the end when `None`);
    /// returns the new cell's stable identity.
    ///
    /// # Errors
    ///
    /// Returns `AppError::StaleRevision` when `expected_revision` is given
    /// and no longer matches, `AppError::CellNotFound` when `after_cell_id`
    /// does not exist.
    async fn insert_cell(
        &self,
        after_cell_id: Option<&str>,
        kind: CellKind,
        source: &str,
        expected_revision: Option<u64>,
    ) -> Result<String>;

    /// Replace a cell's source text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CellNotFound` if the id no longer exists,
    /// `AppError::StaleRevision` on revision mismatch.
    async fn replace_cell_source(
        &self,
        cell_id: &str,
        source: &str,
        expected_revision: u64,
    ) -> Result<()>;

    /// Delete a cell.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CellNotFound` if the id no longer exists,
    /// `AppError::StaleRevision` on revision mismatch.
    async fn delete_cell(&self, cell_id: &str, expected_revision: u64) -> Result<()>;

    /// Append one output fragment to a cell.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CellNotFound` if the id no longer exists.
    async fn append_output(&self, cell_id: &str, fragment: OutputFragment) -> Result<()>;

    /// Remove all outputs from a cell.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CellNotFound` if the id no longer exists.
    async fn clear_outputs(&self, cell_id: &str) -> Result<()>;

    /// Record the execution count after a successful run.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CellNotFound` if the id no longer exists.
    async fn set_execution_count(&self, cell_id: &str, count: u32) -> Result<()>;

    /// Subscribe to externally-originated change notifications.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}
