// SPDX-License-Identifier: BSD-3-Clause

use std::fmt;
use std::net::SocketAddr;

use tokio::io::AsyncRead;

use eventsource_util::codec::{LineReader, LineReaderError};

/// The head of an HTTP/1.x request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Request {
  /// The request method, e.g. `GET`.
  pub method: String,

  /// The request target, path and query included.
  pub target: String,

  /// The protocol version, e.g. `HTTP/1.1`.
  pub version: String,

  /// The request headers, in the order they were received.
  pub headers: Vec<(String, String)>,

  /// The address of the client, when known.
  pub peer_addr: Option<SocketAddr>,
}

// ===== impl Request =====

impl Request {
  /// Creates an HTTP/1.1 request without headers.
  pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
    Self { method: method.into(), target: target.into(), version: "HTTP/1.1".to_string(), ..Default::default() }
  }

  /// Appends a header.
  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Sets the client address.
  pub fn with_peer_addr(mut self, peer_addr: SocketAddr) -> Self {
    self.peer_addr = Some(peer_addr);
    self
  }

  /// Returns the path component of the request target.
  pub fn path(&self) -> &str {
    match self.target.split_once('?') {
      Some((path, _)) => path,
      None => &self.target,
    }
  }

  /// Returns the query component of the request target, if any.
  pub fn query(&self) -> Option<&str> {
    self.target.split_once('?').map(|(_, query)| query)
  }

  /// Returns the value of the first header with the given name.
  ///
  /// Header names are compared case-insensitively.
  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
  }
}

/// Error type for request head parsing.
#[derive(Debug)]
pub enum RequestError {
  /// The request head is not valid HTTP/1.x.
  Malformed(&'static str),

  /// The request head is larger than allowed.
  HeadTooLarge,

  /// The peer closed the connection before sending a full request head.
  ConnectionClosed,

  /// Wraps IO errors from the underlying reader.
  IoError(std::io::Error),
}

impl fmt::Display for RequestError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RequestError::Malformed(detail) => write!(f, "malformed request: {}", detail),
      RequestError::HeadTooLarge => write!(f, "request head too large"),
      RequestError::ConnectionClosed => write!(f, "connection closed by peer"),
      RequestError::IoError(e) => write!(f, "I/O error: {}", e),
    }
  }
}

impl std::error::Error for RequestError {}

impl From<LineReaderError> for RequestError {
  fn from(error: LineReaderError) -> Self {
    match error {
      LineReaderError::MaxLineLengthExceeded => RequestError::HeadTooLarge,
      LineReaderError::IoError(e) => RequestError::IoError(e),
    }
  }
}

/// Reads a request head from a line reader.
///
/// Reading stops right after the blank line terminating the head. Any body
/// is left unread. Leading blank lines before the request line are skipped.
///
/// # Arguments
///
/// * `reader` - The line reader wrapping the client stream
/// * `max_head_size` - The maximum number of bytes the head may span, terminators excluded
///
/// # Errors
///
/// Returns an error if the head is malformed, exceeds `max_head_size`, or the
/// stream ends early.
pub async fn read_request<R>(reader: &mut LineReader<R>, max_head_size: usize) -> Result<Request, RequestError>
where
  R: AsyncRead + Unpin,
{
  let mut head_size = 0;

  let request_line = loop {
    let line = next_line(reader, &mut head_size, max_head_size).await?;
    if !line.is_empty() {
      break line;
    }
  };

  let (method, target, version) = parse_request_line(&request_line)?;
  let mut request = Request { method, target, version, ..Default::default() };

  loop {
    let line = next_line(reader, &mut head_size, max_head_size).await?;
    if line.is_empty() {
      break;
    }
    request.headers.push(parse_header(&line)?);
  }

  Ok(request)
}

async fn next_line<R>(
  reader: &mut LineReader<R>,
  head_size: &mut usize,
  max_head_size: usize,
) -> Result<String, RequestError>
where
  R: AsyncRead + Unpin,
{
  if !reader.next().await? {
    return Err(RequestError::ConnectionClosed);
  }
  let line = reader.get_line().unwrap_or_default();

  *head_size += line.len();
  if *head_size > max_head_size {
    return Err(RequestError::HeadTooLarge);
  }

  let line = std::str::from_utf8(line).map_err(|_| RequestError::Malformed("invalid utf-8"))?;
  Ok(line.to_string())
}

fn parse_request_line(line: &str) -> Result<(String, String, String), RequestError> {
  let mut parts = line.split(' ');

  let (Some(method), Some(target), Some(version), None) = (parts.next(), parts.next(), parts.next(), parts.next())
  else {
    return Err(RequestError::Malformed("invalid request line"));
  };

  if method.is_empty() || !method.bytes().all(|b| b.is_ascii_alphabetic()) {
    return Err(RequestError::Malformed("invalid method"));
  }
  if !target.starts_with('/') && target != "*" {
    return Err(RequestError::Malformed("invalid request target"));
  }
  if !version.starts_with("HTTP/1.") {
    return Err(RequestError::Malformed("unsupported protocol version"));
  }

  Ok((method.to_string(), target.to_string(), version.to_string()))
}

fn parse_header(line: &str) -> Result<(String, String), RequestError> {
  let Some((name, value)) = line.split_once(':') else {
    return Err(RequestError::Malformed("invalid header"));
  };
  if name.is_empty() || name.contains(|c: char| c.is_ascii_whitespace()) {
    return Err(RequestError::Malformed("invalid header name"));
  }
  Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  async fn parse(raw: &[u8]) -> Result<Request, RequestError> {
    let mut reader = LineReader::new(raw, 1024);
    read_request(&mut reader, 1024).await
  }

  #[tokio::test]
  async fn test_read_request() {
    let request =
      parse(b"GET /stream?topic=news HTTP/1.1\r\nHost: localhost\r\nAccept:text/event-stream\r\n\r\n").await.unwrap();

    assert_eq!(request.method, "GET");
    assert_eq!(request.target, "/stream?topic=news");
    assert_eq!(request.version, "HTTP/1.1");
    assert_eq!(request.path(), "/stream");
    assert_eq!(request.query(), Some("topic=news"));
    assert_eq!(request.header("host"), Some("localhost"));
    assert_eq!(request.header("ACCEPT"), Some("text/event-stream"));
    assert_eq!(request.header("last-event-id"), None);
  }

  #[tokio::test]
  async fn test_read_request_skips_leading_blank_lines() {
    let request = parse(b"\r\n\r\nGET / HTTP/1.0\r\n\r\n").await.unwrap();

    assert_eq!(request.method, "GET");
    assert_eq!(request.path(), "/");
    assert_eq!(request.query(), None);
    assert!(request.headers.is_empty());
  }

  #[tokio::test]
  async fn test_read_request_leaves_body_unread() {
    let raw = b"POST /stream HTTP/1.1\r\nContent-Length: 4\r\n\r\nbody";
    let mut reader = LineReader::new(&raw[..], 1024);

    let request = read_request(&mut reader, 1024).await.unwrap();

    assert_eq!(request.method, "POST");
    assert_eq!(reader.remaining(), b"body");
  }

  #[tokio::test]
  async fn test_read_request_errors() {
    struct TestCase {
      name: &'static str,
      raw: &'static [u8],
      expected_err: &'static str,
    }

    let test_cases = vec![
      TestCase { name: "truncated head", raw: b"GET / HTTP/1.1\r\nHost: x\r\n", expected_err: "connection closed by peer" },
      TestCase { name: "empty stream", raw: b"", expected_err: "connection closed by peer" },
      TestCase { name: "missing version", raw: b"GET /\r\n\r\n", expected_err: "malformed request: invalid request line" },
      TestCase {
        name: "too many parts",
        raw: b"GET / HTTP/1.1 extra\r\n\r\n",
        expected_err: "malformed request: invalid request line",
      },
      TestCase { name: "bad method", raw: b"G3T / HTTP/1.1\r\n\r\n", expected_err: "malformed request: invalid method" },
      TestCase {
        name: "bad target",
        raw: b"GET stream HTTP/1.1\r\n\r\n",
        expected_err: "malformed request: invalid request target",
      },
      TestCase {
        name: "http/2 preface",
        raw: b"PRI * HTTP/2.0\r\n\r\n",
        expected_err: "malformed request: unsupported protocol version",
      },
      TestCase {
        name: "header without colon",
        raw: b"GET / HTTP/1.1\r\nHost\r\n\r\n",
        expected_err: "malformed request: invalid header",
      },
      TestCase {
        name: "header name with space",
        raw: b"GET / HTTP/1.1\r\nHo st: x\r\n\r\n",
        expected_err: "malformed request: invalid header name",
      },
    ];

    for test_case in test_cases {
      let err = parse(test_case.raw).await.unwrap_err();
      assert_eq!(err.to_string(), test_case.expected_err, "test case: {}", test_case.name);
    }
  }

  #[tokio::test]
  async fn test_read_request_head_too_large() {
    let raw = format!("GET / HTTP/1.1\r\nX-Filler: {}\r\n\r\n", "a".repeat(100));

    // Total head size exceeded.
    let mut reader = LineReader::new(raw.as_bytes(), 1024);
    let err = read_request(&mut reader, 64).await.unwrap_err();
    assert!(matches!(err, RequestError::HeadTooLarge));

    // Single line larger than the reader buffer.
    let mut reader = LineReader::new(raw.as_bytes(), 32);
    let err = read_request(&mut reader, 1024).await.unwrap_err();
    assert!(matches!(err, RequestError::HeadTooLarge));
  }

  #[test]
  fn test_request_builder() {
    let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
    let request = Request::new("GET", "/stream").with_header("Last-Event-ID", "9").with_peer_addr(peer);

    assert_eq!(request.version, "HTTP/1.1");
    assert_eq!(request.header("last-event-id"), Some("9"));
    assert_eq!(request.peer_addr, Some(peer));
  }
}
