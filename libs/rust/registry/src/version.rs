//! Model version records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{RegistryError, Result};
use crate::stage::ModelStage;

/// Opaque training parameters. Stored verbatim, never interpreted.
pub type Parameters = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub model_name: String,
    /// Assigned at registration, strictly increasing per model name
    pub version: u32,
    pub artifact_ref: String,
    /// The single compared metric (e.g. AUC). Immutable.
    pub metric_value: f64,
    pub stage: ModelStage,
    pub created_at: DateTime<Utc>,
    pub stage_changed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parameters: Parameters,
}

/// Input to `RegistryStore::register_version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVersion {
    pub model_name: String,
    pub artifact_ref: String,
    pub metric_value: f64,
    #[serde(default)]
    pub parameters: Parameters,
}

impl NewVersion {
    pub fn new(model_name: &str, artifact_ref: &str, metric_value: f64) -> Self {
        Self { model_name: model_name.to_string(), artifact_ref: artifact_ref.to_string(), metric_value, parameters: Parameters::new() }
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_model_name(&self.model_name)?;
        if self.artifact_ref.trim().is_empty() {
            return Err(RegistryError::InvalidArtifactRef);
        }
        if !self.metric_value.is_finite() {
            return Err(RegistryError::InvalidMetric(self.metric_value));
        }
        Ok(())
    }

    pub(crate) fn into_version(self, version: u32) -> ModelVersion {
        ModelVersion {
            model_name: self.model_name,
            version,
            artifact_ref: self.artifact_ref,
            metric_value: self.metric_value,
            stage: ModelStage::None,
            created_at: Utc::now(),
            stage_changed_at: None,
            parameters: self.parameters,
        }
    }
}

/// Names double as storage key segments: 1 to 128 ASCII alphanumerics plus `-`, `_` and `.`.
pub fn validate_model_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= 128
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if ok { Ok(()) } else { Err(RegistryError::InvalidModelName(name.to_string())) }
}
