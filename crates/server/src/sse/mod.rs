// SPDX-License-Identifier: BSD-3-Clause

pub mod config;
pub mod handler;
pub mod handoff;
pub mod hijack;
pub mod listener;
pub mod router;

pub use config::{Config, Limits, ListenerConfig};
pub use handler::{FnProducer, Handler, Producer, SessionState, producer_fn};
pub use handoff::{EventReceiver, EventSender, SendError, channel};
pub use hijack::{HijackError, Hijacker, RawConn};
pub use listener::SseListener;
pub use router::{Route, Router};

/// The service type reported in logs and metrics.
pub const SERVICE_TYPE: &str = "sse";
