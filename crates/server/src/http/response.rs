// SPDX-License-Identifier: BSD-3-Clause

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Response statuses the server answers with when it does not open an event stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
  BadRequest,
  NotFound,
  MethodNotAllowed,
  RequestHeaderFieldsTooLarge,
  ServiceUnavailable,
}

// ===== impl Status =====

impl Status {
  /// Returns the numeric status code.
  pub fn code(&self) -> u16 {
    match self {
      Status::BadRequest => 400,
      Status::NotFound => 404,
      Status::MethodNotAllowed => 405,
      Status::RequestHeaderFieldsTooLarge => 431,
      Status::ServiceUnavailable => 503,
    }
  }

  /// Returns the canonical reason phrase.
  pub fn reason(&self) -> &'static str {
    match self {
      Status::BadRequest => "Bad Request",
      Status::NotFound => "Not Found",
      Status::MethodNotAllowed => "Method Not Allowed",
      Status::RequestHeaderFieldsTooLarge => "Request Header Fields Too Large",
      Status::ServiceUnavailable => "Service Unavailable",
    }
  }
}

/// Returns the bytes of an empty response closing the connection.
pub fn encode_empty_response(status: Status) -> Vec<u8> {
  let mut head = format!("HTTP/1.1 {} {}\r\n", status.code(), status.reason());
  if status == Status::MethodNotAllowed {
    head.push_str("Allow: GET\r\n");
  }
  head.push_str("Content-Length: 0\r\nConnection: close\r\n\r\n");
  head.into_bytes()
}

/// Writes an empty response and shuts the stream down.
pub async fn write_empty_response<W>(status: Status, writer: &mut W) -> io::Result<()>
where
  W: AsyncWrite + Unpin,
{
  writer.write_all(&encode_empty_response(status)).await?;
  writer.flush().await?;
  writer.shutdown().await
}
