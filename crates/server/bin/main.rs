// SPDX-License-Identifier: BSD-3-Clause

use clap::Parser;

use eventsource_server::version::{LONG_VERSION, VERSION};

const ENV_WORKER_THREADS: &str = "EVENTSOURCE_WORKER_THREADS";

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "eventsource-server")]
#[command(version = VERSION, long_version = LONG_VERSION)]
#[command(about = "Server-Sent Events server", long_about = None)]
struct Cli {
  /// Path to configuration file
  #[arg(short, long, value_name = "FILE")]
  config: Option<String>,
}

fn main() {
  eventsource_server::setup_panic_hook();

  let cli = Cli::parse();

  let worker_threads = {
    let logical_cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);

    match std::env::var(ENV_WORKER_THREADS).ok().and_then(|value| value.parse::<usize>().ok()) {
      Some(value) if value > 0 => value,
      _ => logical_cores,
    }
  };

  let runtime = if worker_threads == 1 {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
  } else {
    tokio::runtime::Builder::new_multi_thread().worker_threads(worker_threads).enable_all().build()
  };

  let runtime = match runtime {
    Ok(runtime) => runtime,
    Err(e) => {
      eprintln!("error: failed to start runtime: {}", e);
      std::process::exit(1);
    },
  };

  runtime.block_on(async {
    if let Err(e) = eventsource_server::run(cli.config, worker_threads).await {
      eprintln!("error: {}", e);
      std::process::exit(1);
    }
  });
}
