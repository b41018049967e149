//! In-memory registry store

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::{check_plan, check_transition, PromotionPlan, RegistryStore};
use crate::error::{RegistryError, Result};
use crate::stage::ModelStage;
use crate::transition::StageTransition;
use crate::version::{validate_model_name, ModelVersion, NewVersion};

#[derive(Debug, Default)]
struct ModelEntry {
    versions: BTreeMap<u32, ModelVersion>,
    /// artifact_ref -> version, the double-submission guard
    artifacts: HashMap<String, u32>,
    production: Option<u32>,
    history: Vec<StageTransition>,
}

impl ModelEntry {
    fn set_stage(&mut self, model_name: &str, version: u32, to: ModelStage, reason: Option<&str>) -> Result<ModelVersion> {
        let record = self.versions.get_mut(&version).ok_or_else(|| RegistryError::not_found(model_name, version))?;
        let from = record.stage;
        record.stage = to;
        record.stage_changed_at = Some(Utc::now());
        let updated = record.clone();
        if to == ModelStage::Production {
            self.production = Some(version);
        } else if self.production == Some(version) {
            self.production = None;
        }
        self.history.push(StageTransition::new(model_name, version, from, to, reason));
        Ok(updated)
    }
}

/// Registry store held entirely in memory. One `RwLock` guards all models, so
/// every operation, including a two-version promotion, is a single critical section.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    models: RwLock<HashMap<String, ModelEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for InMemoryStore {
    fn register_version(&self, new: NewVersion) -> Result<ModelVersion> {
        new.validate()?;
        let mut models = self.models.write();
        let entry = models.entry(new.model_name.clone()).or_default();
        if let Some(&existing_version) = entry.artifacts.get(&new.artifact_ref) {
            return Err(RegistryError::DuplicateRegistration {
                model_name: new.model_name,
                artifact_ref: new.artifact_ref,
                existing_version,
            });
        }
        let version = entry.versions.keys().next_back().map_or(1, |last| last + 1);
        let record = new.into_version(version);
        entry.artifacts.insert(record.artifact_ref.clone(), version);
        entry.versions.insert(version, record.clone());
        debug!(model = %record.model_name, version, "version registered");
        Ok(record)
    }

    fn get_version(&self, model_name: &str, version: u32) -> Result<ModelVersion> {
        self.models
            .read()
            .get(model_name)
            .and_then(|entry| entry.versions.get(&version))
            .cloned()
            .ok_or_else(|| RegistryError::not_found(model_name, version))
    }

    fn get_production(&self, model_name: &str) -> Result<Option<ModelVersion>> {
        let models = self.models.read();
        Ok(models
            .get(model_name)
            .and_then(|entry| entry.production.and_then(|v| entry.versions.get(&v)))
            .cloned())
    }

    fn transition_stage(&self, model_name: &str, version: u32, to: ModelStage, reason: Option<&str>) -> Result<ModelVersion> {
        let mut models = self.models.write();
        let entry = models.get_mut(model_name).ok_or_else(|| RegistryError::not_found(model_name, version))?;
        let from = entry.versions.get(&version).ok_or_else(|| RegistryError::not_found(model_name, version))?.stage;
        check_transition(model_name, from, to, entry.production)?;
        entry.set_stage(model_name, version, to, reason)
    }

    fn list_versions(&self, model_name: &str) -> Result<Vec<ModelVersion>> {
        Ok(self
            .models
            .read()
            .get(model_name)
            .map(|entry| entry.versions.values().cloned().collect())
            .unwrap_or_default())
    }

    fn list_models(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.models.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn transition_history(&self, model_name: &str) -> Result<Vec<StageTransition>> {
        Ok(self.models.read().get(model_name).map(|entry| entry.history.clone()).unwrap_or_default())
    }

    fn apply_promotion(&self, plan: &PromotionPlan) -> Result<ModelVersion> {
        validate_model_name(&plan.model_name)?;
        let mut models = self.models.write();
        let entry = models
            .get_mut(&plan.model_name)
            .ok_or_else(|| RegistryError::not_found(&plan.model_name, plan.candidate))?;
        let candidate_stage = entry
            .versions
            .get(&plan.candidate)
            .ok_or_else(|| RegistryError::not_found(&plan.model_name, plan.candidate))?
            .stage;
        check_plan(plan, candidate_stage, entry.production)?;
        if let Some(previous) = plan.expected_production {
            let reason = format!("replaced by v{}", plan.candidate);
            entry.set_stage(&plan.model_name, previous, ModelStage::Archived, Some(&reason))?;
        }
        entry.set_stage(&plan.model_name, plan.candidate, ModelStage::Production, Some(&plan.reason))
    }
}
