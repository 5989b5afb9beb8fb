// SPDX-License-Identifier: BSD-3-Clause

use tokio::io::{AsyncRead, AsyncReadExt};

/// Error type for line reading operations.
#[derive(Debug)]
pub enum LineReaderError {
  /// Occurs when a line exceeds the maximum allowed length.
  MaxLineLengthExceeded,

  /// Wraps IO errors from the underlying reader.
  IoError(std::io::Error),
}

impl std::fmt::Display for LineReaderError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      LineReaderError::MaxLineLengthExceeded => write!(f, "max line length exceeded"),
      LineReaderError::IoError(e) => write!(f, "I/O error: {}", e),
    }
  }
}

impl From<std::io::Error> for LineReaderError {
  fn from(error: std::io::Error) -> Self {
    LineReaderError::IoError(error)
  }
}

impl std::error::Error for LineReaderError {}

/// Asynchronous line reader over a fixed-size buffer.
///
/// Lines are split on `\n`. A trailing `\r` is stripped, so both LF and CRLF
/// terminated lines are returned without their terminator. The buffer size
/// bounds the maximum line length.
#[derive(Debug)]
pub struct LineReader<R> {
  reader: R,
  buffer: Box<[u8]>,
  current_pos: usize,
  line_pos: Option<usize>,
}

// ===== impl LineReader =====

impl<R: AsyncRead + Unpin> LineReader<R> {
  /// Creates a new line reader able to hold lines of up to `max_line_length` bytes,
  /// terminator included.
  pub fn new(reader: R, max_line_length: usize) -> Self {
    assert!(max_line_length > 0, "max line length must be greater than 0");
    Self { reader, buffer: vec![0u8; max_line_length].into_boxed_slice(), current_pos: 0, line_pos: None }
  }

  /// Returns the last read line, without its terminator.
  pub fn get_line(&self) -> Option<&[u8]> {
    let pos = self.line_pos?;
    let line = &self.buffer[..pos];
    Some(line.strip_suffix(b"\r").unwrap_or(line))
  }

  /// Asynchronously reads the next line from the input stream.
  ///
  /// # Returns
  /// * `Ok(true)` - A line was read and can be consumed via `get_line()`.
  /// * `Ok(false)` - EOF reached before a complete line was available.
  /// * `Err(_)` - The line exceeds the buffer size, or an I/O error occurred.
  pub async fn next(&mut self) -> Result<bool, LineReaderError> {
    let max_line_length = self.buffer.len();

    self.compact_buffer();

    loop {
      let buffered = &self.buffer[..self.current_pos];

      if let Some(pos) = buffered.iter().position(|&b| b == b'\n') {
        self.line_pos = Some(pos);
        return Ok(true);
      }
      if self.current_pos == max_line_length {
        return Err(LineReaderError::MaxLineLengthExceeded);
      }

      let bytes_read = self.reader.read(&mut self.buffer[self.current_pos..]).await?;
      if bytes_read == 0 {
        return Ok(false);
      }
      self.current_pos = (self.current_pos + bytes_read).min(max_line_length);
    }
  }

  /// Returns the bytes buffered beyond the last read line.
  pub fn remaining(&self) -> &[u8] {
    match self.line_pos {
      Some(pos) if pos < self.current_pos => &self.buffer[pos + 1..self.current_pos],
      Some(_) => &[],
      None => &self.buffer[..self.current_pos],
    }
  }

  /// Consumes the line reader, returning the underlying reader.
  ///
  /// Any bytes buffered beyond the last read line are discarded.
  pub fn into_inner(self) -> R {
    self.reader
  }

  fn compact_buffer(&mut self) {
    if let Some(pos) = self.line_pos.take() {
      if pos < self.current_pos {
        self.buffer.copy_within(pos + 1..self.current_pos, 0);
        self.current_pos -= pos + 1;
      } else {
        self.current_pos = 0;
      }
    }
  }
}
