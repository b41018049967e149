use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use mlops_core::{init_tracing, load_config};
use promotion_service::{cli::Cli, run};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config("promotion-service")?;
    init_tracing(&cfg.service_name, &cfg.log_level)?;
    info!(backend = ?cfg.store.backend, path = %cfg.store.path.display(), metric = %cfg.promotion.metric_name, "config_loaded");

    // store calls block on disk I/O
    let output = tokio::task::spawn_blocking(move || run(cli, &cfg)).await?;
    match output {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "command failed");
            Err(e)
        }
    }
}
