//! Execution request and outcome models.

use serde::{Deserialize, Serialize};

use crate::models::cell::OutputFragment;

/// Status of one in-flight code submission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Submitted to the kernel, not yet started.
    Queued,
    /// Kernel reported the execution as busy/running.
    Running,
    /// Terminal success event reconciled.
    Completed,
    /// Terminal failure event reconciled.
    Failed,
}

/// One in-flight code submission against the session's kernel.
///
/// Created when code is submitted; destroyed once its terminal event is
/// fully reconciled into the cell record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Identifier assigned by the kernel channel adapter.
    pub execution_id: String,
    /// Stable identity of the cell the code came from.
    pub cell_id: String,
    /// Document revision observed at submission time.
    pub submitted_revision: u64,
    /// Current status.
    pub status: ExecutionStatus,
}

impl ExecutionRequest {
    /// Record a new submission at `Queued`.
    #[must_use]
    pub fn new(execution_id: String, cell_id: String, submitted_revision: u64) -> Self {
        Self {
            execution_id,
            cell_id,
            submitted_revision,
            status: ExecutionStatus::Queued,
        }
    }
}

/// Terminal disposition of one execution, as surfaced to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Execution completed without error.
    Ok,
    /// Executed code raised a runtime error; detail captured verbatim.
    Error {
        /// Exception type name.
        ename: String,
        /// Exception value/message.
        evalue: String,
    },
    /// Execution was interrupted before completion.
    Interrupted,
}

/// Result payload of a blocking execute operation.
///
/// The document has already been reconciled when this is returned: outputs
/// are appended (failures included) and `execution_count` is set only on
/// success.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Identifier of the execution this outcome belongs to.
    pub execution_id: String,
    /// Terminal disposition.
    #[serde(flatten)]
    pub status: OutcomeStatus,
    /// Execution count assigned by the kernel, when the run succeeded.
    pub execution_count: Option<u32>,
    /// Output fragments in kernel emission order.
    pub outputs: Vec<OutputFragment>,
}

impl ExecutionOutcome {
    /// Whether the outcome is a success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self.status, OutcomeStatus::Ok)
    }
}
