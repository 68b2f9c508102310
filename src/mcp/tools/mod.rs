//! MCP tool handlers.

pub mod add_cell;
pub mod attach_session;
pub mod close_session;
pub mod delete_cell;
pub mod edit_cell;
pub mod execute_cell;
pub mod install_packages;
pub mod interrupt_kernel;
pub mod list_cells;
pub mod read_cell;
pub mod restart_kernel;
pub mod session_status;
pub mod util;
