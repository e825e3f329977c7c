//! `canvasctl`: drive decision canvas runs, previews, limits and storage

mod cli;
mod commands;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli::command().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let config = cli::load_config(&matches)?;
    tracing::debug!(adapter = %config.adapter.preference, "configuration loaded");
    commands::dispatch(&matches, &config).await
}

/// Logs go to stderr so command output stays machine readable
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
