//! Kernel channel adapter: submit code, stream results.
//!
//! Wraps a request/reply + streamed-event connection to one computational
//! kernel process. Holds no notebook document data.

pub mod channel;
pub mod jupyter;
pub mod wire;

pub use channel::{KernelChannel, KernelEvent};
