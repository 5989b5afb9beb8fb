// SPDX-License-Identifier: BSD-3-Clause

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use eventsource_protocol::{
  RESPONSE_HEAD, effective_keep_alive_interval, effective_retry_interval, write_event, write_keep_alive, write_retry,
};
use eventsource_util::conn::is_disconnect;

use crate::http::Request;
use crate::sse::SERVICE_TYPE;
use crate::sse::config::Config;
use crate::sse::handoff::{self, EventReceiver, EventSender};
use crate::sse::hijack::{HijackError, Hijacker};
use crate::telemetry::metrics;

/// A source of events for a single event stream.
///
/// A producer is started on its own task once the stream preamble has been
/// sent to the client. It sends events through `tx`, and must return promptly
/// once `done` is cancelled, which happens as soon as the stream ends for any
/// reason. Returning, or dropping every clone of `tx`, ends the stream gracefully.
///
/// The connection never aborts the producer task. A producer that ignores
/// `done` keeps running for the lifetime of the process.
#[async_trait]
pub trait Producer: Send + Sync + 'static {
  /// Produces the events of one stream.
  ///
  /// # Parameters
  ///
  /// * `request` - The request that opened the stream
  /// * `tx` - The handoff queue to the connection
  /// * `done` - Cancelled once the stream has ended
  async fn stream(&self, request: Request, tx: EventSender, done: CancellationToken);
}

/// A [`Producer`] built from an async closure.
pub struct FnProducer<F>(F);

/// Creates a [`Producer`] from an async closure.
///
/// ```ignore
/// let producer = producer_fn(|_request, tx, done| async move {
///   tokio::select! {
///     _ = tx.send("hello") => {},
///     _ = done.cancelled() => {},
///   }
/// });
/// ```
pub fn producer_fn<F, Fut>(f: F) -> FnProducer<F>
where
  F: Fn(Request, EventSender, CancellationToken) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = ()> + Send + 'static,
{
  FnProducer(f)
}

#[async_trait]
impl<F, Fut> Producer for FnProducer<F>
where
  F: Fn(Request, EventSender, CancellationToken) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = ()> + Send + 'static,
{
  async fn stream(&self, request: Request, tx: EventSender, done: CancellationToken) {
    (self.0)(request, tx, done).await
  }
}

/// The lifecycle of a stream, as published by [`Handler::serve_observed`].
///
/// States only move forward. `Closed` is terminal and can be reached from
/// either of the other states.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
  /// The preamble is being written.
  Handshaking,

  /// The producer is running and events are being relayed.
  Streaming,

  /// The stream has ended and the connection has been released.
  Closed,
}

/// The reason a stream loop ended.
#[derive(Debug)]
enum CloseReason {
  /// Every event sender was dropped.
  ProducerFinished,

  /// The server is shutting down.
  Shutdown,

  /// A write or flush failed, which is taken as the client having gone away.
  Io(io::Error),
}

impl fmt::Display for CloseReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CloseReason::ProducerFinished => write!(f, "producer finished"),
      CloseReason::Shutdown => write!(f, "server shutting down"),
      CloseReason::Io(e) => write!(f, "I/O error: {}", e),
    }
  }
}

impl From<io::Error> for CloseReason {
  fn from(e: io::Error) -> Self {
    CloseReason::Io(e)
  }
}

/// Serves event streams over hijacked connections.
///
/// A handler is cheap to clone and can serve any number of connections
/// concurrently. Connections share nothing but the producer.
#[derive(Clone)]
pub struct Handler {
  /// The producer started for every stream.
  producer: Arc<dyn Producer>,

  /// The configured reconnect interval, in milliseconds.
  retry_interval: i64,

  /// The configured heartbeat interval.
  keep_alive_interval: Duration,
}

impl fmt::Debug for Handler {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Handler")
      .field("retry_interval", &self.retry_interval)
      .field("keep_alive_interval", &self.keep_alive_interval)
      .finish_non_exhaustive()
  }
}

// ===== impl Handler =====

impl Handler {
  /// Creates a handler using the protocol default intervals.
  pub fn new(producer: impl Producer) -> Self {
    Self { producer: Arc::new(producer), retry_interval: 0, keep_alive_interval: Duration::ZERO }
  }

  /// Creates a handler using the intervals of the given configuration.
  pub fn with_config(producer: impl Producer, config: &Config) -> Self {
    Self::new(producer).with_retry_interval(config.retry_interval).with_keep_alive_interval(config.keep_alive_interval)
  }

  /// Sets the reconnect interval, in milliseconds.
  ///
  /// Non-positive values select the protocol default.
  pub fn with_retry_interval(mut self, retry_interval: i64) -> Self {
    self.retry_interval = retry_interval;
    self
  }

  /// Sets the heartbeat interval.
  ///
  /// A zero interval selects the protocol default.
  pub fn with_keep_alive_interval(mut self, keep_alive_interval: Duration) -> Self {
    self.keep_alive_interval = keep_alive_interval;
    self
  }

  /// Returns the reconnect interval sent to clients.
  pub fn retry_interval(&self) -> i64 {
    effective_retry_interval(self.retry_interval)
  }

  /// Returns the heartbeat interval in effect.
  pub fn keep_alive_interval(&self) -> Duration {
    effective_keep_alive_interval(self.keep_alive_interval)
  }

  /// Serves an event stream over a connection until it ends.
  ///
  /// The connection is taken over, the stream preamble written, and the
  /// producer started. Events are then relayed to the client as they arrive,
  /// with a heartbeat after every idle `keep_alive_interval`. The stream
  /// ends when the producer closes the queue, when a write fails, or when
  /// `shutdown` is cancelled. In every case the producer is cancelled and the
  /// connection closed before returning. Pending output is flushed first,
  /// unless a write already failed.
  ///
  /// # Errors
  ///
  /// Returns an error only if the connection cannot be taken over. I/O errors
  /// on the stream are treated as a disconnected client and end the stream
  /// silently.
  pub async fn serve<H>(&self, request: Request, conn: H, shutdown: CancellationToken) -> Result<(), HijackError>
  where
    H: Hijacker,
  {
    let (state, _) = watch::channel(SessionState::Handshaking);
    self.serve_observed(request, conn, shutdown, state).await
  }

  /// Like [`serve`](Self::serve), publishing every state change of the stream to `state`.
  ///
  /// `state` is reset to [`SessionState::Handshaking`] on entry, and holds
  /// [`SessionState::Closed`] once this returns.
  pub async fn serve_observed<H>(
    &self,
    request: Request,
    mut conn: H,
    shutdown: CancellationToken,
    state: watch::Sender<SessionState>,
  ) -> Result<(), HijackError>
  where
    H: Hijacker,
  {
    state.send_replace(SessionState::Handshaking);

    let stream = match conn.hijack() {
      Ok(stream) => stream,
      Err(e) => {
        transition(&state, SessionState::Closed);
        return Err(e);
      },
    };
    let mut writer = BufWriter::new(stream);

    let peer = request.peer_addr;
    let path = request.path().to_string();

    let done = CancellationToken::new();
    let started_at = Instant::now();

    metrics::session_started(SERVICE_TYPE);
    trace!(?peer, path, service_type = SERVICE_TYPE, "event stream opened");

    let reason = self.run_session(request, &mut writer, &done, &shutdown, &state).await;

    // Cancel the producer before releasing the connection.
    done.cancel();

    // Output left over from a failed write is never sent again.
    if !matches!(reason, CloseReason::Io(_))
      && let Err(e) = writer.flush().await
    {
      trace!(?peer, service_type = SERVICE_TYPE, "failed to flush event stream: {}", e);
    }

    let mut stream = writer.into_inner();
    if let Err(e) = stream.shutdown().await
      && !is_disconnect(&e)
    {
      warn!(?peer, service_type = SERVICE_TYPE, "failed to close event stream: {}", e);
    }

    transition(&state, SessionState::Closed);

    metrics::session_finished(started_at.elapsed().as_secs_f64() * 1000.0, SERVICE_TYPE);

    match reason {
      CloseReason::Io(e) if !is_disconnect(&e) => {
        debug!(?peer, path, service_type = SERVICE_TYPE, "event stream closed: I/O error: {}", e);
      },
      reason => {
        trace!(?peer, path, service_type = SERVICE_TYPE, %reason, "event stream closed");
      },
    }

    Ok(())
  }

  async fn run_session<W>(
    &self,
    request: Request,
    writer: &mut W,
    done: &CancellationToken,
    shutdown: &CancellationToken,
    state: &watch::Sender<SessionState>,
  ) -> CloseReason
  where
    W: AsyncWrite + Unpin,
  {
    if let Err(e) = self.write_preamble(writer).await {
      return CloseReason::Io(e);
    }

    let (tx, rx) = handoff::channel();

    let producer = self.producer.clone();
    let producer_done = done.child_token();

    // The join handle is dropped: the producer is expected to stop on its own.
    tokio::spawn(async move {
      producer.stream(request, tx, producer_done).await;
    });

    transition(state, SessionState::Streaming);

    match self.run_stream_loop(writer, rx, shutdown).await {
      Ok(reason) => reason,
      Err(reason) => reason,
    }
  }

  async fn write_preamble<W>(&self, writer: &mut W) -> io::Result<()>
  where
    W: AsyncWrite + Unpin,
  {
    writer.write_all(RESPONSE_HEAD).await?;
    write_retry(self.retry_interval(), writer).await?;
    writer.flush().await
  }

  async fn run_stream_loop<W>(
    &self,
    writer: &mut W,
    mut rx: EventReceiver,
    shutdown: &CancellationToken,
  ) -> Result<CloseReason, CloseReason>
  where
    W: AsyncWrite + Unpin,
  {
    let keep_alive_interval = self.keep_alive_interval();

    loop {
      // A new timer on every iteration: heartbeats only follow a full idle interval.
      let keep_alive = tokio::time::sleep(keep_alive_interval);

      tokio::select! {
        biased;

        _ = shutdown.cancelled() => {
          return Ok(CloseReason::Shutdown);
        },

        res = rx.recv() => {
          match res {
            Some(event) => {
              write_event(&event, writer).await?;
              metrics::event_sent(SERVICE_TYPE);
            },
            None => {
              return Ok(CloseReason::ProducerFinished);
            },
          }
        },

        _ = keep_alive => {
          write_keep_alive(writer).await?;
          metrics::heartbeat_sent(SERVICE_TYPE);
        },
      }

      writer.flush().await?;
    }
  }
}

/// Moves `state` forward to `new_state`. Backward moves are ignored.
fn transition(state: &watch::Sender<SessionState>, new_state: SessionState) {
  state.send_if_modified(|current| {
    if new_state <= *current {
      return false;
    }
    *current = new_state;
    true
  });
}
