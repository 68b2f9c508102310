//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Kernel or document binding could not be established.
    AttachFailed(String),
    /// Notebook identity is already bound to a live session.
    AlreadyAttached(String),
    /// A mutating operation is already in flight on the session.
    SessionBusy(String),
    /// Session has been closed; no further operations are accepted.
    SessionClosed(String),
    /// Referenced cell identity no longer exists in the document.
    CellNotFound(String),
    /// Caller's expected document revision no longer matches the current one.
    StaleRevision {
        /// Revision the caller derived its mutation from.
        expected: u64,
        /// Revision the document is actually at.
        actual: u64,
    },
    /// Caller-supplied timeout elapsed before a terminal kernel event.
    TimedOut(String),
    /// No live kernel connection exists for the notebook.
    KernelUnavailable(String),
    /// Kernel was restarted; interpreter state is gone.
    KernelRestarted(String),
    /// Execution failed on an unresolved import and remediation also failed.
    MissingDependency(String),
    /// Executed code raised a runtime error.
    UserCode {
        /// Exception type name reported by the kernel.
        ename: String,
        /// Exception value/message reported by the kernel.
        evalue: String,
    },
    /// Kernel process died or became unresponsive.
    KernelFault(String),
    /// Document sync transport failure.
    Document(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::AttachFailed(msg) => write!(f, "attach failed: {msg}"),
            Self::AlreadyAttached(msg) => write!(f, "already attached: {msg}"),
            Self::SessionBusy(msg) => write!(f, "session busy: {msg}"),
            Self::SessionClosed(msg) => write!(f, "session closed: {msg}"),
            Self::CellNotFound(msg) => write!(f, "cell not found: {msg}"),
            Self::StaleRevision { expected, actual } => write!(
                f,
                "stale revision: expected {expected}, document is at {actual}"
            ),
            Self::TimedOut(msg) => write!(f, "timed out: {msg}"),
            Self::KernelUnavailable(msg) => write!(f, "kernel unavailable: {msg}"),
            Self::KernelRestarted(msg) => write!(f, "kernel restarted: {msg}"),
            Self::MissingDependency(msg) => write!(f, "missing dependency: {msg}"),
            Self::UserCode { ename, evalue } => write!(f, "user code error: {ename}: {evalue}"),
            Self::KernelFault(msg) => write!(f, "kernel fault: {msg}"),
            Self::Document(msg) => write!(f, "document: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Document(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl AppError {
    /// Whether the caller can recover by re-reading state and retrying.
    ///
    /// `StaleRevision` and `SessionBusy` are never retried on the caller's
    /// behalf; the caller must re-validate its assumptions first.
    #[must_use]
    pub fn is_caller_recoverable(&self) -> bool {
        matches!(self, Self::StaleRevision { .. } | Self::SessionBusy(_))
    }
}
