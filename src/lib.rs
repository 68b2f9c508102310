#![forbid(unsafe_code)]

pub mod config;
pub mod document;
pub mod errors;
pub mod kernel;
pub mod mcp;
pub mod models;
pub mod session;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
