//! IPC client for communicating with the orchestrator
//!
//! Uses TCP on localhost, one JSON object per line in each direction.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use hb_core::ipc::{encode_line, DaemonStatus, IpcRequest, IpcResponse};
use hb_core::types::Verdict;

/// Client for a running `harbor start`
pub struct HarborClient {
    address: String,
    stream: Option<BufReader<TcpStream>>,
}

impl HarborClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            stream: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        tracing::debug!("Connecting to orchestrator at {}", self.address);

        let stream = TcpStream::connect(&self.address).await.with_context(|| {
            format!(
                "Failed to connect to orchestrator at {}. Is it running?",
                self.address
            )
        })?;
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    /// Send one request and read one response line
    async fn send_request(&mut self, request: IpcRequest) -> Result<IpcResponse> {
        self.connect().await?;
        let stream = self
            .stream
            .as_mut()
            .context("Not connected to orchestrator")?;

        let line = encode_line(&request)?;
        stream.get_mut().write_all(line.as_bytes()).await?;
        stream.get_mut().flush().await?;

        let mut response = String::new();
        if stream.read_line(&mut response).await? == 0 {
            self.stream = None;
            anyhow::bail!("Orchestrator closed the connection");
        }

        serde_json::from_str(response.trim()).context("Malformed response from orchestrator")
    }

    /// Check if the orchestrator answers
    pub async fn ping(&mut self) -> Result<bool> {
        match self.send_request(IpcRequest::Ping).await? {
            IpcResponse::Pong => Ok(true),
            _ => Ok(false),
        }
    }

    pub async fn status(&mut self) -> Result<DaemonStatus> {
        match self.send_request(IpcRequest::GetStatus).await? {
            IpcResponse::Status(status) => Ok(status),
            IpcResponse::Error { message } => anyhow::bail!("{}", message),
            other => anyhow::bail!("Unexpected response: {:?}", other),
        }
    }

    pub async fn restart(&mut self, name: &str) -> Result<()> {
        let request = IpcRequest::Restart {
            name: name.to_string(),
        };
        match self.send_request(request).await? {
            IpcResponse::Ok => Ok(()),
            IpcResponse::Error { message } => anyhow::bail!("{}", message),
            other => anyhow::bail!("Unexpected response: {:?}", other),
        }
    }

    pub async fn classify(&mut self, destination: &str) -> Result<Verdict> {
        let request = IpcRequest::Classify {
            destination: destination.to_string(),
        };
        match self.send_request(request).await? {
            IpcResponse::Classified { verdict, .. } => Ok(verdict),
            IpcResponse::Error { message } => anyhow::bail!("{}", message),
            other => anyhow::bail!("Unexpected response: {:?}", other),
        }
    }

    /// Ask the orchestrator to stop every service and exit
    pub async fn shutdown(&mut self) -> Result<()> {
        match self.send_request(IpcRequest::Shutdown).await? {
            IpcResponse::Ok => Ok(()),
            IpcResponse::Error { message } => anyhow::bail!("{}", message),
            other => anyhow::bail!("Unexpected response: {:?}", other),
        }
    }
}
