//! Session lifecycle states and legal transitions.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one notebook session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No kernel/document binding; initial state.
    Disconnected,
    /// Binding a kernel and document for a notebook identity.
    Attaching,
    /// No execution outstanding; all operations accepted.
    Idle,
    /// Exactly one execution outstanding; only reads and interrupt accepted.
    Executing,
    /// Remediation plus a single bounded retry in progress.
    Recovering,
    /// Bindings released; all further operations fail.
    Closed,
}

impl LifecycleState {
    /// Determine whether a lifecycle transition is permitted.
    ///
    /// `Closed` is terminal and reachable from every other state.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if next == Self::Closed {
            return self != Self::Closed;
        }
        matches!(
            (self, next),
            (Self::Disconnected, Self::Attaching)
                | (Self::Attaching, Self::Idle | Self::Disconnected)
                | (Self::Idle, Self::Executing)
                | (Self::Executing, Self::Idle | Self::Recovering)
                | (Self::Recovering, Self::Idle)
        )
    }

    /// Whether a mutating operation may begin in this state.
    #[must_use]
    pub fn accepts_mutations(self) -> bool {
        self == Self::Idle
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Attaching => "attaching",
            Self::Idle => "idle",
            Self::Executing => "executing",
            Self::Recovering => "recovering",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
