//! harbor CLI library
//!
//! Command implementations, the IPC client and terminal output helpers used
//! by the `harbor` binary.

pub mod commands;
pub mod ipc;
pub mod output;
