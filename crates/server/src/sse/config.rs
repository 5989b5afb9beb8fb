// SPDX-License-Identifier: BSD-3-Clause

use std::time::Duration;

use anyhow::anyhow;
use serde_derive::{Deserialize, Serialize};

use eventsource_protocol::{DEFAULT_KEEP_ALIVE_INTERVAL, DEFAULT_RETRY_INTERVAL};

/// Configuration for the SSE listener socket.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListenerConfig {
  /// The domain of the server.
  #[serde(default = "default_domain")]
  pub domain: String,

  /// Whether connections are served over TLS.
  #[serde(default)]
  pub tls: bool,

  /// The path to the certificate file.
  #[serde(default)]
  pub cert_file: String,

  /// The path to the key file.
  #[serde(default)]
  pub key_file: String,

  /// The address to bind to.
  #[serde(default = "default_bind_address")]
  pub bind_address: String,

  /// The port to bind to.
  #[serde(default = "default_port")]
  pub port: u16,
}

impl Default for ListenerConfig {
  fn default() -> Self {
    Self {
      domain: default_domain(),
      tls: false,
      cert_file: String::new(),
      key_file: String::new(),
      bind_address: default_bind_address(),
      port: default_port(),
    }
  }
}

/// Configuration for the SSE server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
  /// The SSE listener configuration.
  #[serde(default)]
  pub listener: ListenerConfig,

  /// The path the event stream is served at.
  #[serde(default = "default_path")]
  pub path: String,

  /// The reconnect interval, in milliseconds, announced to clients.
  /// Non-positive values fall back to the protocol default.
  #[serde(default = "default_retry_interval")]
  pub retry_interval: i64,

  /// The idle time after which a heartbeat is sent.
  /// A zero value falls back to the protocol default.
  #[serde(default = "default_keep_alive_interval", with = "humantime_serde")]
  pub keep_alive_interval: Duration,

  /// The timeout for the TLS handshake and for reading the request head.
  #[serde(default = "default_request_read_timeout", with = "humantime_serde")]
  pub request_read_timeout: Duration,

  /// The SSE limits.
  #[serde(default)]
  pub limits: Limits,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      listener: ListenerConfig::default(),
      path: default_path(),
      retry_interval: default_retry_interval(),
      keep_alive_interval: default_keep_alive_interval(),
      request_read_timeout: default_request_read_timeout(),
      limits: Limits::default(),
    }
  }
}

impl Config {
  /// Checks that the configuration can be served.
  ///
  /// # Errors
  ///
  /// Returns an error if a limit is zero.
  pub fn validate(&self) -> anyhow::Result<()> {
    if self.limits.max_connections == 0 {
      return Err(anyhow!("limits.max_connections must be greater than 0"));
    }
    if self.limits.max_request_head_size == 0 {
      return Err(anyhow!("limits.max_request_head_size must be greater than 0"));
    }
    Ok(())
  }
}

fn default_domain() -> String {
  "localhost".to_string()
}

fn default_bind_address() -> String {
  "0.0.0.0".to_string()
}

fn default_port() -> u16 {
  8080
}

fn default_path() -> String {
  "/stream".to_string()
}

fn default_retry_interval() -> i64 {
  DEFAULT_RETRY_INTERVAL
}

fn default_keep_alive_interval() -> Duration {
  DEFAULT_KEEP_ALIVE_INTERVAL
}

fn default_request_read_timeout() -> Duration {
  Duration::from_secs(10)
}

/// Limits for the SSE listener
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Limits {
  /// The maximum number of connections that a listener can handle
  #[serde(default = "default_max_connections")]
  pub max_connections: u32,

  /// The maximum size of a request head, in bytes.
  #[serde(default = "default_max_request_head_size")]
  pub max_request_head_size: u32,
}

fn default_max_connections() -> u32 {
  10_000
}

fn default_max_request_head_size() -> u32 {
  8 * 1024 // 8KB
}

impl Default for Limits {
  fn default() -> Self {
    Self { max_connections: default_max_connections(), max_request_head_size: default_max_request_head_size() }
  }
}
