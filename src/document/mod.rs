//! Document sync adapter: the realtime collaborative cell list.
//!
//! Owns the authoritative cell data. The coordination core reads
//! point-in-time snapshots and applies revision-checked mutations; it never
//! caches cells across a suspension point.

pub mod jupyter;
pub mod nbformat;
pub mod sync;

pub use sync::{ChangeEvent, DocumentSync};
