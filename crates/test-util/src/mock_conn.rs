// SPDX-License-Identifier: BSD-3-Clause

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use eventsource_server::sse::{HijackError, Hijacker};

#[derive(Debug, Default)]
struct MockConnState {
  /// Every byte accepted so far.
  written: Vec<u8>,

  /// Number of successful writes.
  writes: usize,

  /// Number of writes attempted, failed ones included.
  attempts: usize,

  /// Index of the first write attempt to fail, if any.
  fail_at: Option<usize>,

  /// Whether only the `fail_at` attempt fails, and later ones succeed again.
  fail_once: bool,

  flushes: usize,

  shut_down: bool,
}

/// An in-memory client connection recording everything written to it.
///
/// Reads never complete, like a client that sends nothing after its request.
/// Writes can be made to fail from a given point on, which is how a client
/// dropping the connection looks from the server side.
#[derive(Debug)]
pub struct MockConn {
  state: Arc<Mutex<MockConnState>>,
}

/// Inspects a [`MockConn`] after it has been handed over.
#[derive(Clone, Debug)]
pub struct MockConnHandle {
  state: Arc<Mutex<MockConnState>>,
}

// ===== impl MockConn =====

impl MockConn {
  /// Creates a connection accepting every write.
  pub fn new() -> (Self, MockConnHandle) {
    Self::with_state(MockConnState::default())
  }

  /// Creates a connection whose `n`th write (zero based) and every later one
  /// fail with a broken pipe.
  pub fn failing_at(n: usize) -> (Self, MockConnHandle) {
    Self::with_state(MockConnState { fail_at: Some(n), ..Default::default() })
  }

  /// Creates a connection whose `n`th write attempt (zero based) fails with a
  /// broken pipe, and which accepts every other write.
  pub fn failing_once_at(n: usize) -> (Self, MockConnHandle) {
    Self::with_state(MockConnState { fail_at: Some(n), fail_once: true, ..Default::default() })
  }

  fn with_state(state: MockConnState) -> (Self, MockConnHandle) {
    let state = Arc::new(Mutex::new(state));
    (Self { state: state.clone() }, MockConnHandle { state })
  }
}

impl AsyncRead for MockConn {
  fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
    Poll::Pending
  }
}

impl AsyncWrite for MockConn {
  fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
    let mut state = self.state.lock();

    let attempt = state.attempts;
    state.attempts += 1;

    if state.shut_down {
      return Poll::Ready(Err(io::Error::from(io::ErrorKind::NotConnected)));
    }
    if let Some(n) = state.fail_at
      && (attempt == n || (attempt > n && !state.fail_once))
    {
      return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
    }
    state.writes += 1;
    state.written.extend_from_slice(buf);

    Poll::Ready(Ok(buf.len()))
  }

  fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    self.state.lock().flushes += 1;
    Poll::Ready(Ok(()))
  }

  fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    self.state.lock().shut_down = true;
    Poll::Ready(Ok(()))
  }
}

impl Hijacker for MockConn {
  type Stream = MockConn;

  fn hijack(&mut self) -> Result<MockConn, HijackError> {
    Ok(MockConn { state: self.state.clone() })
  }
}

// ===== impl MockConnHandle =====

impl MockConnHandle {
  /// Returns every byte written so far.
  pub fn written(&self) -> Vec<u8> {
    self.state.lock().written.clone()
  }

  /// Returns every byte written so far, lossily decoded as UTF-8.
  pub fn written_string(&self) -> String {
    String::from_utf8_lossy(&self.state.lock().written).into_owned()
  }

  /// Returns the number of successful writes.
  pub fn write_count(&self) -> usize {
    self.state.lock().writes
  }

  /// Returns the number of writes attempted, failed ones included.
  pub fn write_attempts(&self) -> usize {
    self.state.lock().attempts
  }

  /// Returns the number of flushes that reached the connection.
  pub fn flush_count(&self) -> usize {
    self.state.lock().flushes
  }

  /// Returns whether the connection has been shut down.
  pub fn is_shut_down(&self) -> bool {
    self.state.lock().shut_down
  }
}

/// A connection that refuses to be taken over.
#[derive(Debug, Default)]
pub struct Unhijackable;

impl Hijacker for Unhijackable {
  type Stream = MockConn;

  fn hijack(&mut self) -> Result<MockConn, HijackError> {
    Err(HijackError::Unsupported)
  }
}
