//! IPC round-trips against a live server

use std::sync::Arc;
use std::time::Duration;

use hb_core::config::parse_json;
use hb_core::ipc::{encode_line, IpcRequest, IpcResponse};
use hb_core::types::Verdict;
use hb_orchestrator::ipc::{IpcServer, MAX_REQUEST_BYTES};
use hb_orchestrator::HarborState;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

async fn start_server() -> (Arc<HarborState>, std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let config = parse_json(
        r#"{"policy":{"rules":[
            {"pattern":"*.openai.com","action":"redirect-to-local","redirectTarget":"127.0.0.1:11434"},
            {"pattern":"8.212.*","action":"block"}
        ]}}"#,
    )
    .unwrap();
    let state = Arc::new(HarborState::new(config).unwrap());
    let server = IpcServer::bind("127.0.0.1:0", state.clone()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = tokio::spawn(server.run());
    (state, addr, handle)
}

struct Client {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let (reader, writer) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send_raw(&mut self, line: &str) -> IpcResponse {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        let mut response = String::new();
        self.reader.read_line(&mut response).await.unwrap();
        serde_json::from_str(response.trim()).unwrap()
    }

    async fn send(&mut self, request: IpcRequest) -> IpcResponse {
        self.send_raw(&encode_line(&request).unwrap()).await
    }
}

#[tokio::test]
async fn test_ping_and_status() {
    let (state, addr, _handle) = start_server().await;
    let mut client = Client::connect(addr).await;

    assert_eq!(client.send(IpcRequest::Ping).await, IpcResponse::Pong);
    match client.send(IpcRequest::GetStatus).await {
        IpcResponse::Status(status) => {
            assert_eq!(status.pid, std::process::id());
            assert!(status.services.is_empty());
        }
        other => panic!("unexpected response {:?}", other),
    }
    state.shutdown.cancel();
}

#[tokio::test]
async fn test_classify_over_ipc() {
    let (state, addr, _handle) = start_server().await;
    let mut client = Client::connect(addr).await;

    let response = client
        .send(IpcRequest::Classify {
            destination: "api.openai.com:443".into(),
        })
        .await;
    assert_eq!(
        response,
        IpcResponse::Classified {
            destination: "api.openai.com:443".into(),
            verdict: Verdict::RedirectTo {
                host: "127.0.0.1".into(),
                port: 11434
            },
        }
    );

    let response = client
        .send(IpcRequest::Classify {
            destination: "8.212.4.4".into(),
        })
        .await;
    assert!(matches!(
        response,
        IpcResponse::Classified {
            verdict: Verdict::Block,
            ..
        }
    ));
    state.shutdown.cancel();
}

#[tokio::test]
async fn test_errors_are_responses() {
    let (state, addr, _handle) = start_server().await;
    let mut client = Client::connect(addr).await;

    let response = client
        .send(IpcRequest::Restart {
            name: "ghost".into(),
        })
        .await;
    assert!(matches!(response, IpcResponse::Error { message } if message.contains("ghost")));

    let response = client.send_raw("{not json}\n").await;
    assert!(matches!(response, IpcResponse::Error { .. }));

    // The connection survives bad input
    assert_eq!(client.send(IpcRequest::Ping).await, IpcResponse::Pong);
    state.shutdown.cancel();
}

#[tokio::test]
async fn test_shutdown_request_stops_server() {
    let (state, addr, handle) = start_server().await;
    let mut client = Client::connect(addr).await;

    assert_eq!(client.send(IpcRequest::Shutdown).await, IpcResponse::Ok);
    assert!(state.shutdown.is_cancelled());
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("server should stop after shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_oversized_request_is_rejected_and_closed() {
    let (state, addr, _handle) = start_server().await;
    let mut client = Client::connect(addr).await;

    // No newline, so an unbounded reader would keep buffering
    let oversized = "x".repeat(MAX_REQUEST_BYTES + 1);
    let response = client.send_raw(&oversized).await;
    assert!(matches!(response, IpcResponse::Error { message } if message.contains("exceeds")));

    let mut rest = String::new();
    let read = tokio::time::timeout(Duration::from_secs(2), client.reader.read_line(&mut rest))
        .await
        .expect("server should close the connection")
        .unwrap();
    assert_eq!(read, 0);

    // Other clients are unaffected
    let mut other = Client::connect(addr).await;
    assert_eq!(other.send(IpcRequest::Ping).await, IpcResponse::Pong);
    state.shutdown.cancel();
}

#[tokio::test]
async fn test_request_at_the_limit_is_accepted() {
    let (state, addr, _handle) = start_server().await;
    let mut client = Client::connect(addr).await;

    let ping = encode_line(&IpcRequest::Ping).unwrap();
    let padded = format!("{}{}", " ".repeat(MAX_REQUEST_BYTES - ping.len()), ping);
    assert_eq!(padded.len(), MAX_REQUEST_BYTES);
    assert_eq!(client.send_raw(&padded).await, IpcResponse::Pong);
    state.shutdown.cancel();
}
