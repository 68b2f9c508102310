//! Session coordination core.
//!
//! Covers the per-notebook lifecycle state machine, the consistency guard
//! applied before every mutating operation, the failure recovery policy,
//! and the registry mapping notebook identities to live sessions.

pub mod guard;
pub mod machine;
pub mod recovery;
pub mod registry;
pub mod state;

pub use machine::NotebookSession;
pub use registry::SessionRegistry;
pub use state::LifecycleState;
