//! IPC protocol between the CLI and a running orchestrator
//!
//! One JSON object per line over TCP on 127.0.0.1. TCP keeps the transport
//! identical on every platform.

use serde::{Deserialize, Serialize};

use crate::types::{ServiceSnapshot, Verdict};

/// Request from the CLI to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcRequest {
    /// Keepalive / liveness check
    Ping,

    /// Snapshot of every managed service
    GetStatus,

    /// Restart one service
    Restart { name: String },

    /// Classify an outbound destination against the active policy
    Classify { destination: String },

    /// Stop all services and exit
    Shutdown,
}

/// Response from the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Answer to `Ping`
    Pong,

    /// Orchestrator status
    Status(DaemonStatus),

    /// Policy verdict for a destination
    Classified {
        destination: String,
        verdict: Verdict,
    },

    /// Generic success
    Ok,

    /// Error response
    Error { message: String },
}

/// Status of a running orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonStatus {
    /// Orchestrator version
    pub version: String,
    /// Orchestrator process id
    pub pid: u32,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// Configuration file in use
    pub config_path: Option<String>,
    /// Services in start order
    pub services: Vec<ServiceSnapshot>,
}

/// Encode a message as a single newline-terminated line
pub fn encode_line<T: Serialize>(message: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LifecycleState;

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_string(&IpcRequest::Restart {
            name: "llm".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"restart","name":"llm"}"#);

        let parsed: IpcRequest = serde_json::from_str(r#"{"type":"get_status"}"#).unwrap();
        assert_eq!(parsed, IpcRequest::GetStatus);
    }

    #[test]
    fn test_classified_response_keeps_both_tags() {
        let response = IpcResponse::Classified {
            destination: "api.openai.com:443".into(),
            verdict: Verdict::RedirectTo {
                host: "127.0.0.1".into(),
                port: 11434,
            },
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""type":"classified""#));
        assert!(json.contains(r#""action":"redirectTo""#));
        let back: IpcResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
    }

    #[test]
    fn test_status_response() {
        let mut snapshot = ServiceSnapshot::pending("llm", 11434);
        snapshot.state = LifecycleState::Running;
        snapshot.pid = Some(4242);
        let response = IpcResponse::Status(DaemonStatus {
            version: "0.1.0".into(),
            pid: 1,
            uptime_secs: 30,
            config_path: None,
            services: vec![snapshot],
        });

        let line = encode_line(&response).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        let back: IpcResponse = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(back, response);
    }
}
