// SPDX-License-Identifier: BSD-3-Clause

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::http::Request;
use crate::sse::{EventSender, Producer};

/// A producer emitting a numbered tick with the stream's age at a fixed pace.
///
/// Each event reads `"<n>: <elapsed>"`, counting from zero.
#[derive(Clone, Debug)]
pub struct ClockProducer {
  tick_interval: Duration,
}

impl ClockProducer {
  pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

  pub fn new(tick_interval: Duration) -> Self {
    Self { tick_interval }
  }
}

impl Default for ClockProducer {
  fn default() -> Self {
    Self::new(Self::DEFAULT_TICK_INTERVAL)
  }
}

#[async_trait]
impl Producer for ClockProducer {
  async fn stream(&self, request: Request, tx: EventSender, done: CancellationToken) {
    let started_at = Instant::now();
    let mut n: u64 = 0;

    loop {
      let data = format!("{}: {:?}", n, started_at.elapsed());

      tokio::select! {
        res = tx.send(data) => {
          if res.is_err() {
            break;
          }
        },
        _ = done.cancelled() => break,
      }

      tokio::select! {
        _ = tokio::time::sleep(self.tick_interval) => {},
        _ = done.cancelled() => break,
      }
      n += 1;
    }

    trace!(peer = ?request.peer_addr, ticks = n, "clock producer stopped");
  }
}
