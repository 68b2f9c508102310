//! Domain model module declarations.

pub mod cell;
pub mod execution;
