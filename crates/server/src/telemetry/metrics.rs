// SPDX-License-Identifier: BSD-3-Clause

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Metric names used throughout the server
pub mod names {
  /// Number of event streams currently open
  pub const SESSIONS_ACTIVE: &str = "eventsource_sessions_active";

  /// Total number of event streams opened
  pub const SESSIONS_TOTAL: &str = "eventsource_sessions_total";

  /// Total number of events written to clients
  pub const EVENTS_SENT_TOTAL: &str = "eventsource_events_sent_total";

  /// Total number of heartbeats written to clients
  pub const HEARTBEATS_SENT_TOTAL: &str = "eventsource_heartbeats_sent_total";

  /// Event stream lifetime in milliseconds
  pub const SESSION_DURATION: &str = "eventsource_session_duration_ms";

  /// Total number of connections rejected by the listener
  pub const CONNECTIONS_REJECTED_TOTAL: &str = "eventsource_connections_rejected_total";
}

/// Record that an event stream was opened
pub fn session_started(service_type: &'static str) {
  gauge!(names::SESSIONS_ACTIVE, "service_type" => service_type).increment(1.0);
  counter!(names::SESSIONS_TOTAL, "service_type" => service_type).increment(1);
}

/// Record that an event stream was closed after `duration_ms` milliseconds
pub fn session_finished(duration_ms: f64, service_type: &'static str) {
  gauge!(names::SESSIONS_ACTIVE, "service_type" => service_type).decrement(1.0);
  histogram!(names::SESSION_DURATION, "service_type" => service_type).record(duration_ms);
}

/// Increment the events sent counter
pub fn event_sent(service_type: &'static str) {
  counter!(names::EVENTS_SENT_TOTAL, "service_type" => service_type).increment(1);
}

/// Increment the heartbeats sent counter
pub fn heartbeat_sent(service_type: &'static str) {
  counter!(names::HEARTBEATS_SENT_TOTAL, "service_type" => service_type).increment(1);
}

/// Increment the rejected connections counter
pub fn connection_rejected(reason: &'static str) {
  counter!(names::CONNECTIONS_REJECTED_TOTAL, "reason" => reason).increment(1);
}

/// Describes all metrics (should be called after installing the exporter)
pub fn describe_metrics() {
  describe_gauge!(names::SESSIONS_ACTIVE, "Number of event streams currently open");
  describe_counter!(names::SESSIONS_TOTAL, "Total number of event streams opened");
  describe_counter!(names::EVENTS_SENT_TOTAL, "Total number of events written to clients");
  describe_counter!(names::HEARTBEATS_SENT_TOTAL, "Total number of heartbeats written to clients");
  describe_histogram!(names::SESSION_DURATION, "Event stream lifetime in milliseconds");
  describe_counter!(names::CONNECTIONS_REJECTED_TOTAL, "Total number of connections rejected by the listener");
}
