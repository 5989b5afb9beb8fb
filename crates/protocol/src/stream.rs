// SPDX-License-Identifier: BSD-3-Clause

use std::io;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// The reconnect interval, in milliseconds, sent when none is configured.
pub const DEFAULT_RETRY_INTERVAL: i64 = 5000;

/// The idle time after which a heartbeat is sent when none is configured.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_millis(50_000);

/// The response head that opens an event stream.
///
/// The stream is framed by the connection lifetime, so neither a content length
/// nor chunked encoding is used.
pub const RESPONSE_HEAD: &[u8] = b"HTTP/1.1 200 OK\r\n\
Transfer-Encoding: identity\r\n\
Content-Type: text/event-stream\r\n\
Connection: close\r\n\
Cache-control: no-cache\r\n\
\r\n";

/// The comment line sent as a heartbeat on idle streams.
pub const KEEP_ALIVE_MESSAGE: &[u8] = b":\n";

/// Returns the reconnect interval to announce, falling back to
/// [`DEFAULT_RETRY_INTERVAL`] when the configured value is not positive.
pub fn effective_retry_interval(retry_interval: i64) -> i64 {
  if retry_interval > 0 { retry_interval } else { DEFAULT_RETRY_INTERVAL }
}

/// Returns the heartbeat interval to use, falling back to
/// [`DEFAULT_KEEP_ALIVE_INTERVAL`] when the configured value is zero.
pub fn effective_keep_alive_interval(keep_alive_interval: Duration) -> Duration {
  if keep_alive_interval.is_zero() { DEFAULT_KEEP_ALIVE_INTERVAL } else { keep_alive_interval }
}

/// Writes the `retry:` field announcing the client reconnect interval.
pub async fn write_retry<W>(retry_interval: i64, writer: &mut W) -> io::Result<()>
where
  W: AsyncWrite + Unpin,
{
  let field = format!("retry:{}\n", retry_interval);
  writer.write_all(field.as_bytes()).await
}

/// Writes a single heartbeat comment line.
pub async fn write_keep_alive<W>(writer: &mut W) -> io::Result<()>
where
  W: AsyncWrite + Unpin,
{
  writer.write_all(KEEP_ALIVE_MESSAGE).await
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_response_head() {
    let head = std::str::from_utf8(RESPONSE_HEAD).unwrap();

    assert_eq!(
      head,
      "HTTP/1.1 200 OK\r\nTransfer-Encoding: identity\r\nContent-Type: text/event-stream\r\nConnection: close\r\nCache-control: no-cache\r\n\r\n"
    );
  }

  #[test]
  fn test_effective_retry_interval() {
    assert_eq!(effective_retry_interval(0), 5000);
    assert_eq!(effective_retry_interval(-1), 5000);
    assert_eq!(effective_retry_interval(i64::MIN), 5000);
    assert_eq!(effective_retry_interval(1), 1);
    assert_eq!(effective_retry_interval(10_000), 10_000);
  }

  #[test]
  fn test_effective_keep_alive_interval() {
    assert_eq!(effective_keep_alive_interval(Duration::ZERO), Duration::from_millis(50_000));
    assert_eq!(effective_keep_alive_interval(Duration::from_millis(1)), Duration::from_millis(1));
  }

  #[tokio::test]
  async fn test_write_retry() {
    let mut out = Vec::new();
    write_retry(effective_retry_interval(-5), &mut out).await.unwrap();
    write_retry(effective_retry_interval(1234), &mut out).await.unwrap();

    assert_eq!(out, b"retry:5000\nretry:1234\n");
  }

  #[tokio::test]
  async fn test_write_keep_alive() {
    let mut out = Vec::new();
    write_keep_alive(&mut out).await.unwrap();

    assert_eq!(out, b":\n");
  }
}
