//! IPC client for talking to a running orchestrator

mod client;

pub use client::HarborClient;
pub use hb_core::ipc::{DaemonStatus, IpcRequest, IpcResponse};
