// SPDX-License-Identifier: BSD-3-Clause

use std::net::SocketAddr;

use anyhow::anyhow;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use eventsource_server::sse::{self, Handler, Producer, Router, SseListener};

use crate::TestClient;

/// Returns a configuration listening on an ephemeral loopback port.
pub fn default_sse_config() -> sse::Config {
  let mut config = sse::Config::default();
  config.listener.bind_address = "127.0.0.1".to_string();
  config.listener.port = 0;
  config
}

/// A test suite running an event stream server.
pub struct SseSuite {
  /// The server configuration.
  config: sse::Config,

  /// The server listener.
  ln: SseListener,
}

// ===== impl SseSuite =====

impl SseSuite {
  pub fn new(config: sse::Config, router: Router) -> Self {
    let ln = SseListener::new(config.clone(), router);
    Self { config, ln }
  }

  /// Creates a suite serving `producer` at the configured path.
  pub fn with_producer(config: sse::Config, producer: impl Producer) -> Self {
    let handler = Handler::with_config(producer, &config);
    let router = Router::new().route(config.path.clone(), handler);
    Self::new(config, router)
  }

  pub fn config(&self) -> &sse::Config {
    &self.config
  }

  pub async fn setup(&mut self) -> anyhow::Result<()> {
    self.ln.bootstrap().await
  }

  pub async fn teardown(&mut self) -> anyhow::Result<()> {
    self.ln.shutdown().await
  }

  pub fn local_address(&self) -> anyhow::Result<SocketAddr> {
    self.ln.local_address().ok_or_else(|| anyhow!("local address not set"))
  }

  /// Opens a plain TCP connection to the server.
  pub async fn connect(&self) -> anyhow::Result<TestClient<TcpStream>> {
    TestClient::connect(self.local_address()?).await
  }

  /// Opens a TLS connection to the server, accepting any certificate.
  pub async fn tls_connect(&self) -> anyhow::Result<TestClient<TlsStream<TcpStream>>> {
    let tcp_stream = TcpStream::connect(self.local_address()?).await?;

    let domain = ServerName::try_from(self.config.listener.domain.clone())?;
    let connector = TlsConnector::from(crate::tls::make_tls_client_config());

    let tls_stream = connector.connect(domain, tcp_stream).await?;

    Ok(TestClient::new(tls_stream))
  }

  /// Connects and requests the event stream, returning once the preamble has been read.
  pub async fn open_stream(&self) -> anyhow::Result<TestClient<TcpStream>> {
    let mut client = self.connect().await?;
    client.get(&self.config.path).await?;

    let head = client.read_response_head().await?;
    if head.status != 200 {
      return Err(anyhow!("unexpected response: {}", head.status_line));
    }
    let retry = client.expect_line().await?;
    if !retry.starts_with("retry:") {
      return Err(anyhow!("expected retry line, got: {:?}", retry));
    }

    Ok(client)
  }
}
