//! Registry storage: the trait the engine is written against, plus an
//! in-memory and a sled-backed implementation.

mod durable;
mod memory;

pub use durable::SledStore;
pub use memory::InMemoryStore;

use crate::error::{RegistryError, Result};
use crate::stage::ModelStage;
use crate::transition::StageTransition;
use crate::version::{ModelVersion, NewVersion};

/// Archive-then-promote as one compare-and-swap.
#[derive(Debug, Clone, PartialEq)]
pub struct PromotionPlan {
    pub model_name: String,
    pub candidate: u32,
    /// Production version observed when the decision was made. The plan is
    /// rejected with `ConcurrentModification` if production moved since.
    pub expected_production: Option<u32>,
    pub reason: String,
}

/// Durable mapping from (model name, version) to version metadata and stage.
///
/// Every method is atomic with respect to the others: readers never see a
/// half-applied promotion.
pub trait RegistryStore: Send + Sync {
    /// Assign the next version number and store the record in stage `None`.
    fn register_version(&self, new: NewVersion) -> Result<ModelVersion>;

    fn get_version(&self, model_name: &str, version: u32) -> Result<ModelVersion>;

    /// The unique `Production` version, or `None` if nothing was ever promoted.
    fn get_production(&self, model_name: &str) -> Result<Option<ModelVersion>>;

    /// Single-version stage change, validated against the state machine.
    fn transition_stage(&self, model_name: &str, version: u32, to: ModelStage, reason: Option<&str>) -> Result<ModelVersion>;

    /// Ascending by version. Empty for an unknown name.
    fn list_versions(&self, model_name: &str) -> Result<Vec<ModelVersion>>;

    /// Sorted names of every model with at least one version.
    fn list_models(&self) -> Result<Vec<String>>;

    /// Applied transitions for a model, oldest first.
    fn transition_history(&self, model_name: &str) -> Result<Vec<StageTransition>>;

    /// Archive the expected production version (if any) and promote the candidate, atomically.
    fn apply_promotion(&self, plan: &PromotionPlan) -> Result<ModelVersion>;
}

/// Validate a single-version stage change. `production` is the current
/// production version number for the model, if any.
pub(crate) fn check_transition(model_name: &str, from: ModelStage, to: ModelStage, production: Option<u32>) -> Result<()> {
    if !from.can_transition_to(to) {
        return Err(RegistryError::InvalidTransition { from, to });
    }
    if to == ModelStage::Production {
        if let Some(current) = production {
            return Err(RegistryError::ProductionOccupied { model_name: model_name.to_string(), current });
        }
    }
    Ok(())
}

/// Validate a promotion plan against the observed state.
pub(crate) fn check_plan(plan: &PromotionPlan, candidate_stage: ModelStage, production: Option<u32>) -> Result<()> {
    if production != plan.expected_production {
        return Err(RegistryError::ConcurrentModification { model_name: plan.model_name.clone() });
    }
    if !candidate_stage.can_transition_to(ModelStage::Production) {
        return Err(RegistryError::InvalidTransition { from: candidate_stage, to: ModelStage::Production });
    }
    Ok(())
}
