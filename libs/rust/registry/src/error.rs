//! Registry error types

use thiserror::Error;

use crate::stage::ModelStage;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("version not found: {model_name} v{version}")]
    NotFound { model_name: String, version: u32 },

    #[error("artifact {artifact_ref} already registered for {model_name} as v{existing_version}")]
    DuplicateRegistration { model_name: String, artifact_ref: String, existing_version: u32 },

    #[error("invalid stage transition from {from} to {to}")]
    InvalidTransition { from: ModelStage, to: ModelStage },

    #[error("{model_name} already has v{current} in Production")]
    ProductionOccupied { model_name: String, current: u32 },

    #[error("concurrent modification of {model_name} production stage")]
    ConcurrentModification { model_name: String },

    #[error("invalid model name {0:?}")]
    InvalidModelName(String),

    #[error("artifact reference must not be empty")]
    InvalidArtifactRef,

    #[error("metric value must be finite, got {0}")]
    InvalidMetric(f64),

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RegistryError {
    pub(crate) fn not_found(model_name: &str, version: u32) -> Self {
        RegistryError::NotFound { model_name: model_name.to_string(), version }
    }

    /// Only a lost compare-and-swap is worth repeating; everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::ConcurrentModification { .. })
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(RegistryError::ConcurrentModification { model_name: "m".into() }.is_retryable());
        assert!(!RegistryError::not_found("m", 1).is_retryable());
        assert!(!RegistryError::InvalidTransition { from: ModelStage::Archived, to: ModelStage::Production }.is_retryable());
    }

    #[test]
    fn messages_name_the_version() {
        assert_eq!(RegistryError::not_found("noshow-predictor", 7).to_string(), "version not found: noshow-predictor v7");
        let err = RegistryError::InvalidTransition { from: ModelStage::Archived, to: ModelStage::Production };
        assert_eq!(err.to_string(), "invalid stage transition from Archived to Production");
    }
}
