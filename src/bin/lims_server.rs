//!
//! lims server binary
//! ------------------
//! Command-line entry point for the lims HTTP API. Configuration comes from
//! environment variables, overridden by CLI flags.

use anyhow::Result;
use std::env;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use lims::config::{wants_help, ServerConfig, USAGE};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if wants_help(&args) {
        println!("{USAGE}");
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let _ = fmt().with_env_filter(filter).try_init();

    let cfg = ServerConfig::from_env_and_args(&args);
    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    println!(
        "lims starting: http={}, data_dir={}",
        cfg.http_port,
        cfg.data_dir.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<memory>".to_string())
    );
    info!(target: "lims", "RUST_LOG='{}'", rust_log);

    lims::server::run_with_config(cfg).await
}
