//! An example provider that exports some contrived functions for
//! illustrative purposes only.

mod provider;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

/// Log filter directives, e.g. `debug` or `tffunc=trace`.
const LOG_ENV: &str = "TF_LOG_PROVIDER_FUNCEXAMPLE";

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("error starting plugin: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let provider = provider::new_provider();
    tracing::info!("starting provider");
    provider.serve().await.context("serving provider")
}

/// Logs go to stderr: stdout carries the handshake line.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
