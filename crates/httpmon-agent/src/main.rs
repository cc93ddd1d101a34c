use anyhow::Result;
use httpmon_agent::config::{AgentConfig, DEFAULT_CONFIG_PATH};
use httpmon_agent::monitor::Monitor;
use std::path::Path;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[allow(clippy::print_stdout)]
fn usage() {
    println!(
        "Usage:\n  httpmon-agent [config.toml]\n\nWithout a path, {DEFAULT_CONFIG_PATH} is used when it exists, built-in defaults otherwise.\nLog verbosity follows RUST_LOG (default: httpmon=info)."
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("httpmon=info".parse()?))
        .init();

    let config = match std::env::args().nth(1).as_deref() {
        Some("-h" | "--help") => {
            usage();
            return Ok(());
        }
        Some(path) => AgentConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => AgentConfig::load(DEFAULT_CONFIG_PATH)?,
        None => {
            tracing::info!("No config file, using defaults");
            AgentConfig::default()
        }
    };
    tracing::info!(log_path = %config.log_path, "httpmon-agent starting");

    let monitor = Monitor::from_config(config)?;
    monitor
        .run(async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
            }
        })
        .await
}
