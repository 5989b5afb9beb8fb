// SPDX-License-Identifier: BSD-3-Clause

mod util;

pub mod demo;
pub mod http;
pub mod sse;
pub mod telemetry;
pub mod version;

use std::env;
use std::fs;
use std::io;

use anyhow::anyhow;
use rlimit::Resource;
use serde_derive::{Deserialize, Serialize};
use tokio::signal;
use tracing::info;

use crate::demo::ClockProducer;
use crate::sse::{Handler, Router, SseListener};
use crate::version::{GIT_BRANCH_NAME, GIT_COMMIT_HASH, VERSION};

const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Config {
  #[serde(default)]
  telemetry: telemetry::Config,

  #[serde(rename = "sse-server", default)]
  sse_server: sse::Config,
}

/// Runs the event stream server until a stop signal is received.
///
/// # Arguments
///
/// * `config_file` - The TOML configuration file, `config.toml` when not given
/// * `worker_threads` - The number of runtime worker threads, reported at startup
pub async fn run(config_file: Option<String>, worker_threads: usize) -> anyhow::Result<()> {
  let cfg = load_config(config_file)?;

  telemetry::init(cfg.telemetry)?;

  info!(
    version = VERSION,
    worker_threads = worker_threads,
    branch = GIT_BRANCH_NAME,
    commit = GIT_COMMIT_HASH,
    "eventsource server is starting..."
  );

  set_file_descriptor_limit(cfg.sse_server.limits.max_connections)?;

  let handler = Handler::with_config(ClockProducer::default(), &cfg.sse_server);
  let router = Router::new().route(cfg.sse_server.path.clone(), handler);

  let mut listener = SseListener::new(cfg.sse_server, router);
  listener.bootstrap().await?;

  info!("waiting for stop signal... (press Ctrl+C to stop the server)");
  wait_for_stop_signal().await?;
  info!("received stop signal... gracefully shutting down...");

  listener.shutdown().await?;

  info!("eventsource server stopped");

  Ok(())
}

/// Installs a panic hook printing build details before the default report.
///
/// A panic terminates the process.
pub fn setup_panic_hook() {
  let orig_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |panic_info| {
    eprintln!("\n===========================================================");
    eprintln!("            eventsource server has panicked");
    eprintln!("===========================================================\n");
    eprintln!("This is a bug. Re-run with RUST_BACKTRACE=1 set to capture");
    eprintln!("a backtrace, and include it together with the details below");
    eprintln!("when reporting the issue.");
    eprintln!();
    eprintln!("Platform: {} {}", env::consts::OS, env::consts::ARCH);
    eprintln!("Version: {}", VERSION);
    eprintln!("Branch: {}", GIT_BRANCH_NAME);
    eprintln!("Commit: {}", GIT_COMMIT_HASH);
    eprintln!("Args: {:?}", env::args().collect::<Vec<_>>());
    eprintln!();

    orig_hook(panic_info);

    std::process::exit(1);
  }));
}

fn load_config(config_file: Option<String>) -> anyhow::Result<Config> {
  let explicit = config_file.is_some();
  let toml_file = config_file.unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

  match fs::read_to_string(&toml_file) {
    Ok(content) => parse_config(&content).map_err(|err| anyhow!("failed to parse config file: {}, {}", toml_file, err)),
    // Only the default file may be missing.
    Err(err) if err.kind() == io::ErrorKind::NotFound && !explicit => Ok(Config::default()),
    Err(err) => Err(anyhow!("failed to read config file: {}, {}", toml_file, err)),
  }
}

fn parse_config(content: &str) -> anyhow::Result<Config> {
  let config: Config = toml::from_str(content)?;
  config.sse_server.validate()?;
  Ok(config)
}

async fn wait_for_stop_signal() -> anyhow::Result<()> {
  let mut sig_term = signal::unix::signal(signal::unix::SignalKind::terminate())?;

  tokio::select! {
    res = signal::ctrl_c() => Ok(res?),
    _ = sig_term.recv() => Ok(()),
  }
}

fn set_file_descriptor_limit(max_connections: u32) -> anyhow::Result<()> {
  // One descriptor per connection, 25% headroom, plus a few for internal use.
  let desired_fd_limit = max_connections as u64 + (max_connections / 4) as u64 + 32;

  let (soft, hard) = rlimit::getrlimit(Resource::NOFILE)?;
  if soft >= desired_fd_limit {
    return Ok(());
  }
  let new_soft_limit = std::cmp::min(desired_fd_limit, hard);

  rlimit::setrlimit(Resource::NOFILE, new_soft_limit, hard)
    .map_err(|err| anyhow!("failed to set file descriptor limit: {}", err))?;

  info!(new_soft_limit, soft_limit = soft, hard_limit = hard, "raised file descriptor limit");

  Ok(())
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[test]
  fn test_parse_full_config() {
    let config = parse_config(
      r#"
        [telemetry.metrics]
        enabled = false

        [sse-server]
        path = "/events"
        retry_interval = 2000
        keep_alive_interval = "30s"

        [sse-server.listener]
        port = 9001

        [sse-server.limits]
        max_connections = 64
      "#,
    )
    .unwrap();

    assert!(!config.telemetry.metrics.enabled);
    assert_eq!(config.sse_server.path, "/events");
    assert_eq!(config.sse_server.retry_interval, 2000);
    assert_eq!(config.sse_server.keep_alive_interval, Duration::from_secs(30));
    assert_eq!(config.sse_server.listener.port, 9001);
    assert_eq!(config.sse_server.limits.max_connections, 64);
  }

  #[test]
  fn test_parse_empty_config() {
    let config = parse_config("").unwrap();

    assert_eq!(config.sse_server.path, "/stream");
    assert_eq!(config.sse_server.listener.port, 8080);
  }

  #[test]
  fn test_parse_config_rejects_zero_head_size() {
    let res = parse_config(
      r#"
        [sse-server.limits]
        max_request_head_size = 0
      "#,
    );

    assert!(res.is_err());
  }

  #[test]
  fn test_load_missing_explicit_config() {
    assert!(load_config(Some("/nonexistent/eventsource.toml".to_string())).is_err());
  }
}
