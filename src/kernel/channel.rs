//! Kernel channel contract and streamed event model.

use async_trait::async_trait;

use crate::models::cell::OutputFragment;
use crate::Result;

/// One event streamed back from the kernel, tagged with the originating
/// execution id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelEvent {
    /// Incremental output observable before completion.
    Fragment {
        /// Execution the fragment belongs to.
        execution_id: String,
        /// The output fragment in kernel emission order.
        fragment: OutputFragment,
    },
    /// Terminal success event.
    Completed {
        /// Execution that finished.
        execution_id: String,
        /// Execution count assigned by the kernel.
        execution_count: Option<u32>,
    },
    /// Terminal failure event carrying the error verbatim.
    Failed {
        /// Execution that failed.
        execution_id: String,
        /// Exception type name.
        ename: String,
        /// Exception value/message.
        evalue: String,
        /// Rendered traceback lines.
        traceback: Vec<String>,
    },
    /// Terminal event for an execution aborted by interrupt.
    Interrupted {
        /// Execution that was interrupted.
        execution_id: String,
    },
}

impl KernelEvent {
    /// Execution id the event is tagged with.
    #[must_use]
    pub fn execution_id(&self) -> &str {
        match self {
            Self::Fragment { execution_id, .. }
            | Self::Completed { execution_id, .. }
            | Self::Failed { execution_id, .. }
            | Self::Interrupted { execution_id } => execution_id,
        }
    }

    /// Whether the event ends its execution (no further output follows).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Fragment { .. })
    }
}

/// Connection to one computational kernel process.
///
/// Executions are strictly serialized in submission order; the session
/// state machine guarantees at most one is outstanding at a time.
#[async_trait]
pub trait KernelChannel: Send + Sync {
    /// Enqueue code for execution and return its execution id.
    ///
    /// Never blocks waiting for completion.
    ///
    /// # Errors
    ///
    /// Returns `AppError::KernelUnavailable` if no live connection exists.
    async fn submit(&self, code: &str) -> Result<String>;

    /// Suspend until the kernel delivers the next streamed event.
    ///
    /// Events for a given execution arrive in kernel emission order. The
    /// caller applies its own timeout; this method waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns `AppError::KernelFault` if the event stream has closed.
    async fn next_event(&self) -> Result<KernelEvent>;

    /// Best-effort signal to abort the currently running execution.
    ///
    /// Does not guarantee an immediate stop, only that a subsequent
    /// terminal event will be observed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::KernelUnavailable` if no live connection exists.
    async fn interrupt(&self) -> Result<()>;

    /// Discard all kernel-side interpreter state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::KernelFault` if the restart request fails.
    async fn restart(&self) -> Result<()>;

    /// Release the kernel connection.
    ///
    /// # Errors
    ///
    /// Returns `AppError::KernelFault` if teardown fails.
    async fn disconnect(&self) -> Result<()>;
}
