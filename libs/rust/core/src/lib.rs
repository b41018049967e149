//! Core shared utilities for the model registry services.

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Install the global tracing subscriber. Safe to call more than once.
///
/// `RUST_LOG` wins over `default_level`. Set `MLOPS_JSON_LOG=1` for JSON lines.
/// Output goes to stderr so command output on stdout stays machine readable.
pub fn init_tracing(service: &str, default_level: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
        let json = std::env::var("MLOPS_JSON_LOG").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let registry = tracing_subscriber::registry().with(env_filter);
        if json {
            registry
                .with(fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr))
                .try_init()?;
        } else {
            registry
                .with(fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_line_number(true)
                    .with_writer(std::io::stderr))
                .try_init()?;
        }
        Ok(())
    })?;
    info!(target: "mlops", service, "tracing initialized");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend { Sled, Memory }

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
    /// Attempts to wait out another handle holding the database file lock.
    pub open_max_retries: usize,
    pub open_retry_max_delay_ms: u64,
}

impl StoreConfig {
    pub fn open_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.open_max_retries,
            base_delay: std::time::Duration::from_millis(10),
            max_delay: std::time::Duration::from_millis(self.open_retry_max_delay_ms),
            jitter: 0.25,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromotionConfig {
    /// Name of the compared metric. Informational, the registry stores a single scalar.
    pub metric_name: String,
    pub higher_is_better: bool,
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter: f64,
}

impl PromotionConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay: std::time::Duration::from_millis(self.retry_base_delay_ms),
            max_delay: std::time::Duration::from_millis(self.retry_max_delay_ms),
            jitter: self.retry_jitter.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub service_name: String,
    pub log_level: String,
    pub store: StoreConfig,
    pub promotion: PromotionConfig,
}

/// Load config for `service`: defaults, then `MLOPS_CONFIG_FILE` if set, then `MLOPS__*` env vars.
pub fn load_config(service: &str) -> Result<RegistryConfig> {
    let file = std::env::var("MLOPS_CONFIG_FILE").ok().map(PathBuf::from);
    load_config_from(service, file.as_deref())
}

pub fn load_config_from(service: &str, file: Option<&Path>) -> Result<RegistryConfig> {
    let mut builder = config::Config::builder()
        .set_default("service_name", service)?
        .set_default("log_level", "info")?
        .set_default("store.backend", "sled")?
        .set_default("store.path", "./data/registry")?
        .set_default("store.open_max_retries", 30)?
        .set_default("store.open_retry_max_delay_ms", 250)?
        .set_default("promotion.metric_name", "auc")?
        .set_default("promotion.higher_is_better", true)?
        .set_default("promotion.max_retries", 3)?
        .set_default("promotion.retry_base_delay_ms", 10)?
        .set_default("promotion.retry_max_delay_ms", 250)?
        .set_default("promotion.retry_jitter", 0.25)?;
    if let Some(path) = file {
        builder = builder.add_source(config::File::from(path).required(false));
    }
    builder = builder.add_source(config::Environment::with_prefix("MLOPS").separator("__").try_parsing(true));
    let cfg: RegistryConfig = builder.build()?.try_deserialize()?;
    Ok(cfg)
}

mod resilience;
pub use resilience::{retry_with_backoff, RetryConfig};
mod metrics;
pub use metrics::{PromotionMetrics, PROMOTION_METRICS};
