//! Common test utilities shared across integration tests.
#![allow(dead_code)]

use std::time::Duration;

use pcbook::client::{AuthClient, Login};
use pcbook::server::{self, ServerConfig, ServerState};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tonic::transport::Channel;

/// Initialize test tracing (call once at the beginning of tests).
///
/// Only logs from the crate under test are shown, filtering out HTTP/2 and
/// tower noise. Subsequent calls are safe and will be ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new("pcbook=debug");

    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(filter)
        .try_init();
}

/// A running server on an ephemeral port.
pub struct TestServer {
    pub url: String,
    pub state: ServerState,
    pub images: TempDir,
    handle: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn start_test_server() -> TestServer {
    start_test_server_with(Duration::from_secs(60)).await
}

/// Starts a server whose tokens live for `token_duration`.
pub async fn start_test_server_with(token_duration: Duration) -> TestServer {
    init_tracing();

    let images = tempfile::tempdir().unwrap();
    let mut config = ServerConfig::default();
    config.auth.token_duration_secs = token_duration.as_secs();
    config.images.root = images.path().join("img");

    let state = ServerState::from_config(&config).await.unwrap();

    let addr: std::net::SocketAddr = "127.0.0.1:0".parse().unwrap();
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let local_addr = listener.local_addr().unwrap();

    let router = server::router(&state);
    let handle = tokio::spawn(async move {
        router
            .serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    TestServer {
        url: format!("http://{local_addr}"),
        state,
        images,
        handle,
    }
}

pub async fn connect(url: &str) -> Channel {
    Channel::from_shared(url.to_string())
        .unwrap()
        .connect()
        .await
        .expect("Failed to connect to server")
}

pub async fn login(channel: &Channel, username: &str, password: &str) -> pcbook::Result<String> {
    AuthClient::new(channel.clone(), username, password).login().await
}
