//! IPC server implementation
//!
//! Newline-delimited JSON over TCP, bound to 127.0.0.1 only.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use hb_core::ipc::{encode_line, IpcRequest, IpcResponse};

use crate::state::HarborState;

/// Longest request line accepted, newline included
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

pub struct IpcServer {
    listener: TcpListener,
    state: Arc<HarborState>,
}

impl IpcServer {
    /// Bind the listener. Binding separately from `run` lets callers fail
    /// fast when the port is taken.
    pub async fn bind(address: &str, state: Arc<HarborState>) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("Failed to bind IPC server to {}", address))?;
        tracing::info!("IPC server listening on {}", address);
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve clients until the daemon shuts down
    pub async fn run(self) {
        let shutdown = self.state.shutdown.clone();
        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = shutdown.cancelled() => break,
            };
            match accepted {
                Ok((stream, peer_addr)) => {
                    if !peer_addr.ip().is_loopback() {
                        tracing::warn!("Rejected non-localhost connection from {}", peer_addr);
                        continue;
                    }
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, state).await {
                            tracing::warn!("IPC client error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept IPC connection: {}", e);
                }
            }
        }
        tracing::debug!("IPC server stopped");
    }
}

async fn handle_client(stream: TcpStream, state: Arc<HarborState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let read = (&mut reader)
            .take(MAX_REQUEST_BYTES as u64 + 1)
            .read_line(&mut line)
            .await?;
        if read == 0 {
            break;
        }
        if read > MAX_REQUEST_BYTES {
            let response = IpcResponse::Error {
                message: format!("Request exceeds {} bytes", MAX_REQUEST_BYTES),
            };
            writer.write_all(encode_line(&response)?.as_bytes()).await?;
            tracing::warn!("Closed IPC client after an oversized request");
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<IpcRequest>(trimmed) {
            Ok(request) => handle_request(request, &state).await,
            Err(e) => IpcResponse::Error {
                message: format!("Invalid request: {}", e),
            },
        };
        writer.write_all(encode_line(&response)?.as_bytes()).await?;
    }
    Ok(())
}

async fn handle_request(request: IpcRequest, state: &HarborState) -> IpcResponse {
    match request {
        IpcRequest::Ping => IpcResponse::Pong,

        IpcRequest::GetStatus => IpcResponse::Status(state.daemon_status()),

        IpcRequest::Restart { name } => match state.orchestrator.restart(&name).await {
            Ok(()) => IpcResponse::Ok,
            Err(e) => IpcResponse::Error {
                message: e.to_string(),
            },
        },

        IpcRequest::Classify { destination } => {
            let verdict = state.policy.classify(&destination);
            IpcResponse::Classified {
                destination,
                verdict,
            }
        }

        IpcRequest::Shutdown => {
            tracing::info!("Shutdown requested via IPC");
            state.shutdown.cancel();
            IpcResponse::Ok
        }
    }
}
