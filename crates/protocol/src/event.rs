// SPDX-License-Identifier: BSD-3-Clause

use std::fmt;

/// A single server-sent event.
///
/// Events are transient: a producer builds one, hands it to the connection
/// that owns the client stream, and the connection discards it right after
/// it has been written to the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Event {
  /// The event payload.
  ///
  /// The payload may contain embedded newlines, in which case every line is
  /// sent as its own `data:` field and reassembled by the client.
  pub data: String,

  /// The event identifier.
  ///
  /// When present, clients remember it as the last seen event id.
  pub id: Option<String>,

  /// The event name.
  ///
  /// When absent, clients dispatch the event as an unnamed `message` event.
  pub kind: Option<String>,
}

// ===== impl Event =====

impl Event {
  /// Creates a new unnamed event carrying the given payload.
  pub fn new(data: impl Into<String>) -> Self {
    Self { data: data.into(), id: None, kind: None }
  }

  /// Sets the event identifier.
  pub fn with_id(mut self, id: impl Into<String>) -> Self {
    self.id = Some(id.into());
    self
  }

  /// Sets the event name.
  pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
    self.kind = Some(kind.into());
    self
  }

  /// Returns the identifier to put on the wire, if any.
  ///
  /// An empty identifier is treated as absent, so no empty `id:` field is ever emitted.
  pub fn id(&self) -> Option<&str> {
    self.id.as_deref().filter(|id| !id.is_empty())
  }

  /// Returns the event name to put on the wire, if any.
  ///
  /// An empty name is treated as absent.
  pub fn kind(&self) -> Option<&str> {
    self.kind.as_deref().filter(|kind| !kind.is_empty())
  }

  /// Returns the payload lines, one per `data:` field.
  ///
  /// There is always at least one line, even for an empty payload.
  pub fn lines(&self) -> std::str::Split<'_, char> {
    self.data.split('\n')
  }
}

impl From<String> for Event {
  fn from(data: String) -> Self {
    Self::new(data)
  }
}

impl From<&str> for Event {
  fn from(data: &str) -> Self {
    Self::new(data)
  }
}

impl fmt::Display for Event {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Some(kind) = self.kind() {
      writeln!(f, "event:{}", kind)?;
    }
    for line in self.lines() {
      writeln!(f, "data:{}", line)?;
    }
    if let Some(id) = self.id() {
      writeln!(f, "id:{}", id)?;
    }
    writeln!(f)
  }
}
