mod cli;
mod client;
mod config;
mod events;
mod poller;
mod portal;
mod session;
mod session_types;
mod task;
mod watch;

#[cfg(test)]
mod testing;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, print_error};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let default_filter = if cli.output.verbose {
        "science_portal=debug,info"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Starting science-portal {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = cli::run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
