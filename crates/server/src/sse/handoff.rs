// SPDX-License-Identifier: BSD-3-Clause

use std::fmt;

use tokio::sync::{mpsc, oneshot};

use eventsource_protocol::Event;

/// An event paired with the acknowledgement that releases its sender.
type Envelope = (Event, oneshot::Sender<()>);

/// Creates a rendezvous queue for handing events from a producer to a connection.
///
/// The queue has no buffering from the producer's point of view: [`EventSender::send`]
/// completes only once the connection has taken the event out of the queue. A producer
/// can therefore never run more than one event ahead of what the client is being sent.
///
/// The queue closes once every [`EventSender`] has been dropped.
pub fn channel() -> (EventSender, EventReceiver) {
  let (tx, rx) = mpsc::channel(1);
  (EventSender { tx }, EventReceiver { rx })
}

/// Error returned when an event can no longer be delivered because the
/// connection has been closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendError;

impl fmt::Display for SendError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "event stream closed")
  }
}

impl std::error::Error for SendError {}

/// The producer half of the event handoff queue.
#[derive(Clone, Debug)]
pub struct EventSender {
  tx: mpsc::Sender<Envelope>,
}

// ===== impl EventSender =====

impl EventSender {
  /// Hands an event over to the connection.
  ///
  /// Waits until the connection has received the event.
  ///
  /// # Errors
  ///
  /// Returns [`SendError`] if the connection closed before taking the event.
  pub async fn send(&self, event: impl Into<Event>) -> Result<(), SendError> {
    let (ack_tx, ack_rx) = oneshot::channel();

    self.tx.send((event.into(), ack_tx)).await.map_err(|_| SendError)?;

    ack_rx.await.map_err(|_| SendError)
  }

  /// Returns whether the connection stopped receiving events.
  pub fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }

  /// Waits until the connection stops receiving events.
  pub async fn closed(&self) {
    self.tx.closed().await
  }

  /// Drops this sender.
  ///
  /// The queue closes, ending the stream gracefully, once the last sender is closed or dropped.
  pub fn close(self) {}
}

/// The connection half of the event handoff queue.
#[derive(Debug)]
pub struct EventReceiver {
  rx: mpsc::Receiver<Envelope>,
}

// ===== impl EventReceiver =====

impl EventReceiver {
  /// Receives the next event, releasing the sender that submitted it.
  ///
  /// Returns `None` once every sender has been dropped.
  ///
  /// This method is cancel safe.
  pub async fn recv(&mut self) -> Option<Event> {
    let (event, ack_tx) = self.rx.recv().await?;

    // The sender may have given up waiting.
    let _ = ack_tx.send(());

    Some(event)
  }
}
