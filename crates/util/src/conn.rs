// SPDX-License-Identifier: BSD-3-Clause

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

/// An accepted client stream, either plain TCP or TLS over TCP.
///
/// All I/O operations are delegated to the underlying stream.
#[derive(Debug)]
pub enum Stream {
  /// A plain TCP connection.
  Tcp(TcpStream),

  /// A TLS session established over a TCP connection.
  Tls(Box<TlsStream<TcpStream>>),
}

// ===== impl Stream =====

impl Stream {
  /// Returns the address of the remote peer.
  pub fn peer_addr(&self) -> io::Result<SocketAddr> {
    match self {
      Stream::Tcp(stream) => stream.peer_addr(),
      Stream::Tls(stream) => stream.get_ref().0.peer_addr(),
    }
  }

  /// Returns whether the stream is encrypted.
  pub fn is_tls(&self) -> bool {
    matches!(self, Stream::Tls(_))
  }
}

impl From<TcpStream> for Stream {
  fn from(stream: TcpStream) -> Self {
    Stream::Tcp(stream)
  }
}

impl From<TlsStream<TcpStream>> for Stream {
  fn from(stream: TlsStream<TcpStream>) -> Self {
    Stream::Tls(Box::new(stream))
  }
}

impl AsyncRead for Stream {
  fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
    match self.get_mut() {
      Stream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
      Stream::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
    }
  }
}

impl AsyncWrite for Stream {
  fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
    match self.get_mut() {
      Stream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
      Stream::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
    }
  }

  fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    match self.get_mut() {
      Stream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
      Stream::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
    }
  }

  fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    match self.get_mut() {
      Stream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
      Stream::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
    }
  }
}

/// Returns whether an I/O error means the peer went away.
///
/// These errors are expected on long-lived streams and are not worth reporting.
pub fn is_disconnect(err: &io::Error) -> bool {
  use io::ErrorKind::*;
  matches!(err.kind(), NotConnected | BrokenPipe | ConnectionAborted | ConnectionReset | UnexpectedEof | WriteZero)
}
