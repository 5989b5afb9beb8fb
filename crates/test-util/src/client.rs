// SPDX-License-Identifier: BSD-3-Clause

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::anyhow;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

use eventsource_util::codec::LineReader;

const READ_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_LINE_LENGTH: usize = 64 * 1024;

/// The status line and headers of a response.
#[derive(Clone, Debug)]
pub struct ResponseHead {
  pub status_line: String,
  pub status: u16,
  pub headers: Vec<(String, String)>,
}

impl ResponseHead {
  /// Returns the value of the first header with the given name, compared case-insensitively.
  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
  }
}

/// A raw HTTP client reading event stream responses line by line.
///
/// # Timeout
///
/// Every read waits at most 10 seconds.
pub struct TestClient<T: AsyncRead + AsyncWrite> {
  reader: LineReader<ReadHalf<T>>,
  writer: WriteHalf<T>,
}

// ===== impl TestClient =====

impl TestClient<TcpStream> {
  /// Connects to a server over plain TCP.
  pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
    Ok(Self::new(TcpStream::connect(addr).await?))
  }
}

impl<T: AsyncRead + AsyncWrite> TestClient<T> {
  pub fn new(stream: T) -> Self {
    let (rh, wh) = tokio::io::split(stream);
    Self { reader: LineReader::new(rh, MAX_LINE_LENGTH), writer: wh }
  }

  /// Writes raw bytes to the server.
  pub async fn write_raw(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
    self.writer.write_all(bytes).await?;
    self.writer.flush().await?;
    Ok(())
  }

  /// Sends a bodyless request.
  pub async fn send_request(&mut self, method: &str, path: &str) -> anyhow::Result<()> {
    let request = format!("{} {} HTTP/1.1\r\nHost: localhost\r\nAccept: text/event-stream\r\n\r\n", method, path);
    self.write_raw(request.as_bytes()).await
  }

  /// Sends an event stream request.
  pub async fn get(&mut self, path: &str) -> anyhow::Result<()> {
    self.send_request("GET", path).await
  }

  /// Reads the next line, without its terminator.
  ///
  /// Returns `None` once the server has closed the connection.
  pub async fn read_line(&mut self) -> anyhow::Result<Option<String>> {
    let reader = &mut self.reader;

    match tokio::time::timeout(READ_TIMEOUT, reader.next()).await {
      Ok(Ok(true)) => {
        let line = reader.get_line().unwrap_or_default();
        Ok(Some(String::from_utf8(line.to_vec())?))
      },
      Ok(Ok(false)) => Ok(None),
      Ok(Err(e)) => Err(anyhow!("error reading from stream: {}", e)),
      Err(_) => Err(anyhow!("timeout waiting for line")),
    }
  }

  /// Reads the next line, failing if the connection was closed.
  pub async fn expect_line(&mut self) -> anyhow::Result<String> {
    self.read_line().await?.ok_or_else(|| anyhow!("connection closed"))
  }

  /// Reads a response status line and its headers.
  pub async fn read_response_head(&mut self) -> anyhow::Result<ResponseHead> {
    let status_line = self.expect_line().await?;

    let status = status_line
      .split(' ')
      .nth(1)
      .and_then(|code| code.parse::<u16>().ok())
      .ok_or_else(|| anyhow!("invalid status line: {}", status_line))?;

    let mut headers = Vec::new();
    loop {
      let line = self.expect_line().await?;
      if line.is_empty() {
        break;
      }
      let (name, value) = line.split_once(':').ok_or_else(|| anyhow!("invalid header: {}", line))?;
      headers.push((name.to_string(), value.trim().to_string()));
    }

    Ok(ResponseHead { status_line, status, headers })
  }

  /// Reads the lines of one event, up to the blank line ending it.
  ///
  /// Heartbeats are skipped.
  pub async fn read_event(&mut self) -> anyhow::Result<Vec<String>> {
    let mut lines = Vec::new();
    loop {
      let line = self.expect_line().await?;
      match line.as_str() {
        ":" if lines.is_empty() => continue,
        "" if lines.is_empty() => return Err(anyhow!("unexpected blank line")),
        "" => return Ok(lines),
        _ => lines.push(line),
      }
    }
  }

  /// Waits for the server to close the connection, failing on unread lines.
  pub async fn read_to_end(&mut self) -> anyhow::Result<()> {
    match self.read_line().await? {
      None => Ok(()),
      Some(line) => Err(anyhow!("unexpected line: {:?}", line)),
    }
  }

  /// Waits for the server to close the connection, discarding anything still sent.
  pub async fn drain(&mut self) -> anyhow::Result<()> {
    while self.read_line().await?.is_some() {}
    Ok(())
  }
}
