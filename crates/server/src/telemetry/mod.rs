// SPDX-License-Identifier: BSD-3-Clause

pub mod metrics;

use std::io::stdout;
use std::net::{SocketAddr, SocketAddrV4};
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use console_subscriber::ConsoleLayer;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::{Deserialize, Serialize};
use tracing::metadata::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Telemetry configuration.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub logging: LoggingConfig,

  #[serde(default)]
  pub metrics: MetricsConfig,

  #[serde(default)]
  pub console: ConsoleConfig,
}

/// Log output formats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
  /// Compact human readable lines.
  #[default]
  Text,

  /// One JSON object per line.
  Json,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
  /// One of `trace`, `debug`, `info`, `warn`, `error` or `off`.
  #[serde(default = "default_level")]
  pub level: String,

  #[serde(default)]
  pub format: LogFormat,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self { level: default_level(), format: LogFormat::default() }
  }
}

fn default_level() -> String {
  "info".to_string()
}

/// Prometheus exporter configuration.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsConfig {
  #[serde(default = "default_metrics_enabled")]
  pub enabled: bool,

  /// The address the scrape endpoint binds to.
  #[serde(default = "default_metrics_bind_address")]
  pub bind_address: String,

  /// The port the scrape endpoint listens on.
  #[serde(default = "default_metrics_port")]
  pub port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: default_metrics_enabled(),
      bind_address: default_metrics_bind_address(),
      port: default_metrics_port(),
    }
  }
}

fn default_metrics_enabled() -> bool {
  true
}

fn default_metrics_bind_address() -> String {
  "0.0.0.0".to_string()
}

fn default_metrics_port() -> u16 {
  9090
}

/// tokio-console configuration.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConsoleConfig {
  #[serde(default)]
  pub enabled: bool,

  #[serde(default = "default_console_bind")]
  pub bind: String,

  #[serde(default = "default_event_buffer_capacity")]
  pub event_buffer_capacity: usize,

  #[serde(default = "default_client_buffer_capacity")]
  pub client_buffer_capacity: usize,

  #[serde(default = "default_publish_interval", with = "humantime_serde")]
  pub publish_interval: Duration,

  /// How long closed tasks stay visible.
  #[serde(default = "default_retention", with = "humantime_serde")]
  pub retention: Duration,
}

impl Default for ConsoleConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      bind: default_console_bind(),
      event_buffer_capacity: default_event_buffer_capacity(),
      client_buffer_capacity: default_client_buffer_capacity(),
      publish_interval: default_publish_interval(),
      retention: default_retention(),
    }
  }
}

fn default_console_bind() -> String {
  format!("{}:{}", console_subscriber::Server::DEFAULT_IP, console_subscriber::Server::DEFAULT_PORT)
}

fn default_event_buffer_capacity() -> usize {
  ConsoleLayer::DEFAULT_EVENT_BUFFER_CAPACITY
}

fn default_client_buffer_capacity() -> usize {
  ConsoleLayer::DEFAULT_CLIENT_BUFFER_CAPACITY
}

fn default_publish_interval() -> Duration {
  ConsoleLayer::DEFAULT_PUBLISH_INTERVAL
}

fn default_retention() -> Duration {
  ConsoleLayer::DEFAULT_RETENTION
}

/// Installs the global tracing subscriber and the metrics exporter.
///
/// Must be called at most once per process.
pub fn init(config: Config) -> anyhow::Result<()> {
  let level_filter = parse_level(&config.logging.level)?;
  let console_layer = console_builder(&config.console)?.map(|builder| builder.spawn());

  let registry = tracing_subscriber::registry().with(console_layer);

  match config.logging.format {
    LogFormat::Json => {
      let fmt_layer =
        fmt::Layer::new().json().with_target(false).with_timer(fmt::time::UtcTime::rfc_3339()).with_writer(stdout);

      registry.with(fmt_layer.with_filter(level_filter)).try_init()?;
    },
    LogFormat::Text => {
      let fmt_layer =
        fmt::Layer::new().compact().with_target(false).with_file(false).with_line_number(false).with_writer(stdout);

      registry.with(fmt_layer.with_filter(level_filter)).try_init()?;
    },
  }

  init_metrics(&config.metrics)
}

fn parse_level(level: &str) -> anyhow::Result<LevelFilter> {
  LevelFilter::from_str(&level.to_lowercase()).map_err(|_| anyhow!("invalid logging level: {}", level))
}

fn console_builder(config: &ConsoleConfig) -> anyhow::Result<Option<console_subscriber::Builder>> {
  if !config.enabled {
    return Ok(None);
  }
  let server_addr = SocketAddrV4::from_str(&config.bind)?;

  let builder = ConsoleLayer::builder()
    .server_addr(server_addr)
    .event_buffer_capacity(config.event_buffer_capacity)
    .client_buffer_capacity(config.client_buffer_capacity)
    .publish_interval(config.publish_interval)
    .retention(config.retention);

  Ok(Some(builder))
}

fn init_metrics(config: &MetricsConfig) -> anyhow::Result<()> {
  if !config.enabled {
    return Ok(());
  }
  let bind_address: SocketAddr = format!("{}:{}", config.bind_address, config.port).parse()?;

  PrometheusBuilder::new().with_http_listener(bind_address).install()?;

  metrics::describe_metrics();

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_level() {
    assert_eq!(parse_level("info").unwrap(), LevelFilter::INFO);
    assert_eq!(parse_level("DEBUG").unwrap(), LevelFilter::DEBUG);
    assert_eq!(parse_level("off").unwrap(), LevelFilter::OFF);
    assert!(parse_level("verbose").is_err());
  }

  #[test]
  fn test_parse_config() {
    let config: Config = toml::from_str(
      r#"
        [logging]
        level = "trace"
        format = "json"

        [metrics]
        enabled = false
      "#,
    )
    .unwrap();

    assert_eq!(config.logging.level, "trace");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert!(!config.metrics.enabled);
    assert_eq!(config.metrics.port, 9090);
    assert!(!config.console.enabled);
  }

  #[test]
  fn test_invalid_format() {
    assert!(toml::from_str::<Config>("[logging]\nformat = \"xml\"\n").is_err());
  }
}
