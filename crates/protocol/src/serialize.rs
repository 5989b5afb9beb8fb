// SPDX-License-Identifier: BSD-3-Clause

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::event::Event;

const EVENT_FIELD: &[u8] = b"event:";
const DATA_FIELD: &[u8] = b"data:";
const ID_FIELD: &[u8] = b"id:";
const LF: &[u8] = b"\n";

/// Writes an event to an asynchronous writer using the event stream wire format.
///
/// Fields are written in this order:
///
/// 1. `event:<kind>` if the event is named
/// 2. one `data:<line>` per payload line
/// 3. `id:<id>` if the event has an identifier
/// 4. a blank line terminating the event
///
/// # Errors
///
/// Returns the first I/O error reported by the writer. Nothing is retried,
/// so on error the writer may hold a partially written event.
pub async fn write_event<W>(event: &Event, writer: &mut W) -> io::Result<()>
where
  W: AsyncWrite + Unpin,
{
  if let Some(kind) = event.kind() {
    write_field(EVENT_FIELD, kind, writer).await?;
  }
  for line in event.lines() {
    write_field(DATA_FIELD, line, writer).await?;
  }
  if let Some(id) = event.id() {
    write_field(ID_FIELD, id, writer).await?;
  }
  writer.write_all(LF).await
}

/// Appends the wire form of an event to `out`.
///
/// Returns the number of bytes appended.
pub fn serialize(event: &Event, out: &mut Vec<u8>) -> usize {
  let start = out.len();

  if let Some(kind) = event.kind() {
    push_field(EVENT_FIELD, kind, out);
  }
  for line in event.lines() {
    push_field(DATA_FIELD, line, out);
  }
  if let Some(id) = event.id() {
    push_field(ID_FIELD, id, out);
  }
  out.extend_from_slice(LF);

  out.len() - start
}

async fn write_field<W>(name: &[u8], value: &str, writer: &mut W) -> io::Result<()>
where
  W: AsyncWrite + Unpin,
{
  writer.write_all(name).await?;
  writer.write_all(value.as_bytes()).await?;
  writer.write_all(LF).await
}

fn push_field(name: &[u8], value: &str, out: &mut Vec<u8>) {
  out.extend_from_slice(name);
  out.extend_from_slice(value.as_bytes());
  out.extend_from_slice(LF);
}
