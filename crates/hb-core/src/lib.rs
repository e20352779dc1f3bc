//! hb-core: Core abstractions and configuration for harbor
//!
//! This crate provides the configuration schema, error taxonomy, IPC wire
//! types and process utilities shared by the orchestrator and the CLI.

pub mod config;
pub mod error;
pub mod ipc;
pub mod pidfile;
pub mod process;
pub mod time;
pub mod traits;
pub mod types;

pub use error::HarborError;
pub use types::{LifecycleState, ServiceSnapshot};
