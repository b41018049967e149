//! Promotion service: the training pipeline's entry point into the model registry.

pub mod cli;

use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};

use cli::{Cli, Command};
use mlops_core::{RegistryConfig, StoreBackend};
use model_registry::{
    InMemoryStore, MetricDirection, NewVersion, PromotionEngine, PromotionPolicy, RegistryError, RegistryStore,
    RegistrySummary, SledStore,
};

/// Open the configured store and execute one command. The returned JSON is
/// what the binary prints on stdout.
///
/// The sled file lock admits one process at a time, so concurrent runs on the
/// same path queue in `SledStore::open_with_retry` and then execute in turn.
pub fn run(cli: Cli, cfg: &RegistryConfig) -> Result<Value> {
    let policy = PromotionPolicy::from_config(&cfg.promotion);
    match cfg.store.backend {
        StoreBackend::Sled => {
            let store = SledStore::open_with_retry(&cfg.store.path, &cfg.store.open_retry_config())?;
            execute(&PromotionEngine::new(Arc::new(store), policy), cli.command)
        }
        StoreBackend::Memory => execute(&PromotionEngine::new(Arc::new(InMemoryStore::new()), policy), cli.command),
    }
}

#[instrument(skip(engine))]
pub fn execute<S: RegistryStore>(engine: &PromotionEngine<S>, command: Command) -> Result<Value> {
    let default_direction = engine.policy().direction;
    let direction = |arg: Option<cli::DirectionArg>| arg.map(MetricDirection::from).unwrap_or(default_direction);
    let store = engine.store();

    let output = match command {
        Command::Register(args) => {
            let mut new = NewVersion::new(&args.model, &args.artifact, args.metric);
            new.parameters.extend(args.params);
            if args.promote {
                let (version, promotion) = engine.register_and_promote(new, direction(args.direction))?;
                json!({ "version": version, "promotion": promotion })
            } else {
                match engine.register_version(new) {
                    Ok(version) => json!({ "version": version }),
                    Err(RegistryError::DuplicateRegistration { existing_version, .. }) => {
                        let version = store.get_version(&args.model, existing_version)?;
                        info!(model = %args.model, existing_version, "artifact already registered");
                        json!({ "version": version, "duplicate": true })
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Command::Promote(args) => serde_json::to_value(engine.auto_promote(&args.model, args.version, direction(args.direction))?)?,
        Command::Production(args) => serde_json::to_value(store.get_production(&args.model)?)?,
        Command::List(args) => serde_json::to_value(store.list_versions(&args.model)?)?,
        Command::Models => serde_json::to_value(store.list_models()?)?,
        Command::Transition(args) => {
            serde_json::to_value(engine.transition_stage(&args.model, args.version, args.stage, args.reason.as_deref())?)?
        }
        Command::History(args) => serde_json::to_value(store.transition_history(&args.model)?)?,
        Command::Summary(args) => {
            let versions = store.list_versions(&args.model)?;
            serde_json::to_value(RegistrySummary::from_versions(&args.model, &versions, direction(args.direction)))?
        }
        Command::Demo(args) => demo(engine, &args.model)?,
    };
    Ok(output)
}

/// Baseline first, then a regression that must be rejected, then an improvement that must win.
fn demo<S: RegistryStore>(engine: &PromotionEngine<S>, model: &str) -> Result<Value> {
    let runs = [("baseline", 0.7088), ("regression", 0.6120), ("tuned", 0.9347)];
    let mut steps = Vec::with_capacity(runs.len());
    for (label, metric) in runs {
        let new = NewVersion::new(model, &format!("demo/{model}/{label}"), metric).with_parameter("run", label);
        let (version, promotion) = engine.register_and_promote(new, engine.policy().direction)?;
        info!(label, version = version.version, outcome = promotion.outcome(), "demo step");
        steps.push(json!({ "run": label, "version": version.version, "promotion": promotion }));
    }
    let versions = engine.store().list_versions(model)?;
    let summary = RegistrySummary::from_versions(model, &versions, engine.policy().direction);
    Ok(json!({ "steps": steps, "summary": summary }))
}
