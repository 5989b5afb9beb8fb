// SPDX-License-Identifier: BSD-3-Clause

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

/// Error returned when a connection cannot be taken over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HijackError {
  /// The transport cannot hand out its raw stream.
  ///
  /// Event streams cannot be served over such a transport.
  Unsupported,

  /// The raw stream has already been taken.
  AlreadyHijacked,
}

impl fmt::Display for HijackError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      HijackError::Unsupported => write!(f, "connection does not support takeover"),
      HijackError::AlreadyHijacked => write!(f, "connection already taken over"),
    }
  }
}

impl std::error::Error for HijackError {}

/// A connection whose raw duplex stream can be taken over.
///
/// Taking over the stream bypasses any response framing the transport would
/// otherwise apply, which lets the caller keep the connection open
/// indefinitely and control flushing by hand. The caller owns the stream
/// from then on and is responsible for closing it.
pub trait Hijacker {
  /// The raw stream handed out on takeover.
  type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

  /// Takes exclusive ownership of the raw stream.
  fn hijack(&mut self) -> Result<Self::Stream, HijackError>;
}

/// A connection accepted at the raw listener level.
///
/// Its stream can always be taken over, once.
#[derive(Debug)]
pub struct RawConn<T> {
  stream: Option<T>,
}

// ===== impl RawConn =====

impl<T> RawConn<T> {
  /// Wraps a raw stream.
  pub fn new(stream: T) -> Self {
    Self { stream: Some(stream) }
  }
}

impl<T> Hijacker for RawConn<T>
where
  T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
  type Stream = T;

  fn hijack(&mut self) -> Result<T, HijackError> {
    self.stream.take().ok_or(HijackError::AlreadyHijacked)
  }
}
