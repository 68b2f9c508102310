//! Failure recovery policy: classification and bounded remediation.
//!
//! Replaces generic catch-and-retry with an explicit, testable contract:
//! only `MissingDependency` is remediated, at most once per original
//! request, and the resubmission's failure is surfaced verbatim when it
//! also fails.

use std::sync::OnceLock;

use regex::Regex;

/// Classification of a terminal execution failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureClass {
    /// Error signature indicates an unresolved import.
    MissingDependency {
        /// Module name parsed from the error message.
        module: String,
    },
    /// Any other runtime error raised by the executed code; never retried.
    UserCode {
        /// Exception type name.
        ename: String,
        /// Exception value/message.
        evalue: String,
    },
    /// Kernel process died or became unresponsive.
    KernelFault(String),
}

/// Classify a kernel-reported error by its signature.
///
/// `ModuleNotFoundError` / `ImportError` with a parseable module name map
/// to [`FailureClass::MissingDependency`]; everything else is
/// [`FailureClass::UserCode`]. Kernel faults are detected at the channel
/// layer, not from error text.
#[must_use]
pub fn classify(ename: &str, evalue: &str) -> FailureClass {
    if matches!(ename, "ModuleNotFoundError" | "ImportError") {
        if let Some(module) = missing_module(evalue) {
            return FailureClass::MissingDependency { module };
        }
    }
    FailureClass::UserCode {
        ename: ename.to_owned(),
        evalue: evalue.to_owned(),
    }
}

/// Extract the module name from a missing-import error message.
fn missing_module(evalue: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        #[allow(clippy::expect_used)] // Pattern is a compile-time constant.
        Regex::new(r"No module named '?([A-Za-z0-9_][A-Za-z0-9_.]*)'?").expect("valid regex")
    });
    pattern
        .captures(evalue)
        .and_then(|caps| caps.get(1))
        // Only the top-level distribution name is installable.
        .map(|m| m.as_str().split('.').next().unwrap_or_default().to_owned())
        .filter(|module| !module.is_empty())
}

/// Build the install command submitted through the kernel channel.
#[must_use]
pub fn install_command(prefix: &str, module: &str) -> String {
    format!("{} {module}", prefix.trim_end())
}

/// Bounded retry bookkeeping for one original execution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryContext {
    /// Execution id of the original submission.
    pub original_execution_id: String,
    /// Classification that triggered recovery.
    pub classification: FailureClass,
    /// Whether the single remediation has been spent.
    pub remediation_attempted: bool,
    /// Total executions of the original code so far.
    pub attempt_count: u32,
}

impl RetryContext {
    /// Hard ceiling on executions of the original code (original + retry).
    pub const MAX_ATTEMPTS: u32 = 2;

    /// Start tracking recovery for a failed original submission.
    #[must_use]
    pub fn new(original_execution_id: String, classification: FailureClass) -> Self {
        Self {
            original_execution_id,
            classification,
            remediation_attempted: false,
            attempt_count: 1,
        }
    }

    /// Whether the policy permits a remediation + resubmission now.
    #[must_use]
    pub fn may_remediate(&self, remediation_enabled: bool) -> bool {
        remediation_enabled
            && !self.remediation_attempted
            && self.attempt_count < Self::MAX_ATTEMPTS
            && matches!(self.classification, FailureClass::MissingDependency { .. })
    }

    /// Record that the one permitted remediation cycle has been spent.
    pub fn mark_remediated(&mut self) {
        self.remediation_attempted = true;
        self.attempt_count += 1;
    }
}
