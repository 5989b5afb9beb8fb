// SPDX-License-Identifier: BSD-3-Clause

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use rustls::ServerConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, oneshot};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use eventsource_util::codec::LineReader;
use eventsource_util::conn::{Stream, is_disconnect};

use crate::http::{RequestError, Status, read_request, write_empty_response};
use crate::sse::SERVICE_TYPE;
use crate::sse::config::Config;
use crate::sse::hijack::RawConn;
use crate::sse::router::{Route, Router};
use crate::telemetry::metrics;
use crate::util::tls::{create_tls_config, generate_self_signed_cert, load_certs, load_private_key};

const LOCALHOST_DOMAIN: &str = "localhost";

/// Pause after a failed accept, so that running out of file descriptors does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// How long, and how much, to read from a client after an error response.
const LINGER_TIMEOUT: Duration = Duration::from_secs(1);
const LINGER_MAX_BYTES: u64 = 64 * 1024;

/// A TCP listener serving event streams.
///
/// Every accepted connection gets its own task, which reads the request head,
/// routes it, and either serves an event stream on the connection or answers
/// with an empty error response. Connections are optionally served over TLS.
pub struct SseListener {
  /// The SSE server configuration.
  config: Arc<Config>,

  /// The routes to event stream handlers.
  router: Arc<Router>,

  /// Cancelled to stop accepting connections and end every live stream.
  shutdown_token: CancellationToken,

  /// Tracks the accept loop and every connection task.
  tracker: TaskTracker,

  /// The local address of the listener.
  local_address: Option<SocketAddr>,
}

/// State shared by every connection task.
#[derive(Clone)]
struct ConnContext {
  config: Arc<Config>,
  router: Arc<Router>,
  tls_acceptor: Option<TlsAcceptor>,
  permits: Arc<Semaphore>,
  shutdown_token: CancellationToken,
}

// ===== impl SseListener =====

impl SseListener {
  /// Creates a new listener, ready to be bootstrapped.
  pub fn new(config: Config, router: Router) -> Self {
    Self {
      config: Arc::new(config),
      router: Arc::new(router),
      shutdown_token: CancellationToken::new(),
      tracker: TaskTracker::new(),
      local_address: None,
    }
  }

  /// Binds the listener and starts accepting connections.
  ///
  /// # Errors
  ///
  /// Returns an error if:
  /// * The configuration is invalid, or no route has been registered
  /// * TLS is enabled and its configuration cannot be loaded
  /// * Unable to bind to the configured address and port
  pub async fn bootstrap(&mut self) -> anyhow::Result<()> {
    assert!(self.local_address.is_none());

    self.config.validate()?;
    if self.router.is_empty() {
      return Err(anyhow!("no event stream route registered"));
    }

    let tls_acceptor = if self.config.listener.tls { Some(TlsAcceptor::from(self.load_tls_config()?)) } else { None };

    let listener = TcpListener::bind(self.get_address()).await?;

    self.local_address = Some(listener.local_addr()?);

    let ctx = ConnContext {
      config: self.config.clone(),
      router: self.router.clone(),
      tls_acceptor,
      permits: Arc::new(Semaphore::new(self.config.limits.max_connections as usize)),
      shutdown_token: self.shutdown_token.clone(),
    };
    let tracker = self.tracker.clone();

    let (running_tx, running_rx) = oneshot::channel();

    self.tracker.spawn(async move {
      let _ = running_tx.send(());

      loop {
        tokio::select! {
          biased;

          _ = ctx.shutdown_token.cancelled() => {
            break;
          },

          res = listener.accept() => {
            match res {
              Ok((tcp_stream, peer_addr)) => {
                trace!(?peer_addr, service_type = SERVICE_TYPE, "accepted connection");

                let ctx = ctx.clone();
                tracker.spawn(async move {
                  if let Err(err) = ctx.handle_connection(tcp_stream, peer_addr).await {
                    warn!(?peer_addr, error = ?err, service_type = SERVICE_TYPE, "failed to handle connection");
                  }
                });
              },
              Err(err) => {
                warn!(error = ?err, service_type = SERVICE_TYPE, "failed to accept connection");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
              },
            }
          },
        }
      }
    });

    // Wait for the accept loop to start.
    running_rx.await?;

    info!(
      address = self.get_address(),
      domain = self.config.listener.domain,
      tls = self.config.listener.tls,
      path = self.config.path,
      service_type = SERVICE_TYPE,
      "accepting event stream connections"
    );
    Ok(())
  }

  /// Stops accepting connections and ends every live stream.
  ///
  /// Returns once every connection task has finished. Producers are cancelled
  /// but not waited for.
  pub async fn shutdown(&mut self) -> anyhow::Result<()> {
    assert!(self.local_address.is_some());

    self.shutdown_token.cancel();

    info!(
      address = self.get_address(),
      domain = self.config.listener.domain,
      service_type = SERVICE_TYPE,
      "stopped accepting event stream connections"
    );

    self.tracker.close();
    self.tracker.wait().await;

    Ok(())
  }

  /// Returns the local address the listener is bound to.
  ///
  /// Returns `None` before `bootstrap()`.
  pub fn local_address(&self) -> Option<SocketAddr> {
    self.local_address
  }

  fn load_tls_config(&self) -> anyhow::Result<Arc<ServerConfig>> {
    let listener = &self.config.listener;

    if listener.cert_file.is_empty() || listener.key_file.is_empty() {
      if listener.domain != LOCALHOST_DOMAIN {
        return Err(anyhow!("certificate and key files must be specified for non-localhost domains"));
      }
      warn!(domain = LOCALHOST_DOMAIN, service_type = SERVICE_TYPE, "using self-signed certificate");

      let (certs, key) = generate_self_signed_cert(vec![LOCALHOST_DOMAIN.to_string()])?;

      return create_tls_config(certs, key);
    }
    info!(
      domain = listener.domain,
      cert_file = listener.cert_file,
      key_file = listener.key_file,
      service_type = SERVICE_TYPE,
      "loading certificate and key files"
    );

    create_tls_config(load_certs(&listener.cert_file)?, load_private_key(&listener.key_file)?)
  }

  fn get_address(&self) -> String {
    format!("{}:{}", self.config.listener.bind_address, self.config.listener.port)
  }
}

// ===== impl ConnContext =====

impl ConnContext {
  async fn handle_connection(&self, tcp_stream: TcpStream, peer_addr: SocketAddr) -> anyhow::Result<()> {
    let read_timeout = self.config.request_read_timeout;

    // Held until the connection is released, TLS handshake included.
    let permit = self.permits.clone().try_acquire_owned().ok();

    let mut stream = match &self.tls_acceptor {
      // Over the limit, a TLS connection is closed before the handshake.
      Some(_) if permit.is_none() => {
        debug!(?peer_addr, service_type = SERVICE_TYPE, "connection limit reached");
        metrics::connection_rejected("max_connections");
        return Ok(());
      },
      Some(acceptor) => match tokio::time::timeout(read_timeout, acceptor.accept(tcp_stream)).await {
        Ok(Ok(tls_stream)) => Stream::from(tls_stream),
        Ok(Err(err)) => {
          debug!(?peer_addr, service_type = SERVICE_TYPE, "TLS handshake failed: {}", err);
          return Ok(());
        },
        Err(_) => {
          debug!(?peer_addr, service_type = SERVICE_TYPE, "TLS handshake timed out");
          return Ok(());
        },
      },
      None => Stream::from(tcp_stream),
    };

    let Some(_permit) = permit else {
      debug!(?peer_addr, service_type = SERVICE_TYPE, "connection limit reached");
      metrics::connection_rejected("max_connections");

      return respond(Status::ServiceUnavailable, &mut stream).await;
    };

    let max_head_size = self.config.limits.max_request_head_size as usize;
    let mut reader = LineReader::new(stream, max_head_size);

    let res = tokio::select! {
      _ = self.shutdown_token.cancelled() => return Ok(()),
      res = tokio::time::timeout(read_timeout, read_request(&mut reader, max_head_size)) => res,
    };

    let request = match res {
      Ok(Ok(request)) => request.with_peer_addr(peer_addr),
      Ok(Err(err)) => return self.reject(err, peer_addr, reader.into_inner()).await,
      Err(_) => {
        debug!(?peer_addr, service_type = SERVICE_TYPE, "request read timed out");
        return Ok(());
      },
    };

    let mut stream = reader.into_inner();

    match self.router.resolve(&request) {
      Route::Stream(handler) => {
        handler.serve(request, RawConn::new(stream), self.shutdown_token.clone()).await?;
        Ok(())
      },
      Route::NotFound => {
        trace!(?peer_addr, path = request.path(), service_type = SERVICE_TYPE, "no event stream at path");
        respond(Status::NotFound, &mut stream).await
      },
      Route::MethodNotAllowed => {
        trace!(?peer_addr, method = request.method, service_type = SERVICE_TYPE, "method not allowed");
        respond(Status::MethodNotAllowed, &mut stream).await
      },
    }
  }

  async fn reject(&self, err: RequestError, peer_addr: SocketAddr, mut stream: Stream) -> anyhow::Result<()> {
    debug!(?peer_addr, service_type = SERVICE_TYPE, "invalid request: {}", err);

    match err {
      RequestError::Malformed(_) => {
        metrics::connection_rejected("bad_request");
        respond(Status::BadRequest, &mut stream).await
      },
      RequestError::HeadTooLarge => {
        metrics::connection_rejected("head_too_large");
        respond(Status::RequestHeaderFieldsTooLarge, &mut stream).await
      },
      RequestError::ConnectionClosed => Ok(()),
      RequestError::IoError(e) if is_disconnect(&e) => Ok(()),
      RequestError::IoError(e) => Err(e.into()),
    }
  }
}

/// Writes an empty response, then drains unread input for a while.
///
/// Closing a socket with unread input resets the connection, which can
/// destroy the response before the client has read it.
async fn respond(status: Status, stream: &mut Stream) -> anyhow::Result<()> {
  match write_empty_response(status, stream).await {
    Ok(()) => {},
    Err(e) if is_disconnect(&e) => {
      let _ = stream.shutdown().await;
      return Ok(());
    },
    Err(e) => return Err(e.into()),
  }

  let mut unread = (&mut *stream).take(LINGER_MAX_BYTES);
  let _ = tokio::time::timeout(LINGER_TIMEOUT, tokio::io::copy(&mut unread, &mut tokio::io::sink())).await;

  Ok(())
}
