//! Automatic promotion: compare a candidate against production and apply the
//! archive/promote pair as one unit.
//!
//! The engine keeps no registry state of its own. Every decision re-reads the
//! store inside the model name's lock, and the final write is a
//! compare-and-swap on the production version that was read, so a second
//! engine instance (or process) sharing the store cannot interleave a
//! promotion unnoticed. A lost swap is retried with backoff.

use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use mlops_core::{retry_with_backoff, PromotionConfig, RetryConfig, PROMOTION_METRICS};

use crate::direction::MetricDirection;
use crate::error::{RegistryError, Result};
use crate::lock::NameLocks;
use crate::stage::ModelStage;
use crate::store::{PromotionPlan, RegistryStore};
use crate::version::{ModelVersion, NewVersion};

#[derive(Debug, Clone, Default)]
pub struct PromotionPolicy {
    /// Direction used by `auto_promote_default`
    pub direction: MetricDirection,
    /// Applied to `ConcurrentModification` only
    pub retry: RetryConfig,
}

impl PromotionPolicy {
    pub fn from_config(cfg: &PromotionConfig) -> Self {
        Self { direction: MetricDirection::from_higher_is_better(cfg.higher_is_better), retry: cfg.retry_config() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionReason {
    FirstProductionVersion,
    Improved,
}

impl std::fmt::Display for PromotionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromotionReason::FirstProductionVersion => write!(f, "first production version"),
            PromotionReason::Improved => write!(f, "improved on production"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Equal or worse than production
    NotBetter,
    /// Archived versions never return to production automatically
    CandidateArchived,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::NotBetter => write!(f, "not better than production"),
            RejectionReason::CandidateArchived => write!(f, "candidate is archived"),
        }
    }
}

/// Outcome of one `auto_promote` call. Always one of the three; errors are returned separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PromotionResult {
    Promoted {
        model_name: String,
        version: u32,
        metric_value: f64,
        previous_version: Option<u32>,
        previous_metric: Option<f64>,
        /// `candidate - previous`, absent for the first production version
        delta: Option<f64>,
        reason: PromotionReason,
    },
    Rejected {
        model_name: String,
        version: u32,
        metric_value: f64,
        production_version: Option<u32>,
        production_metric: Option<f64>,
        reason: RejectionReason,
    },
    NoOp {
        model_name: String,
        version: u32,
    },
}

impl PromotionResult {
    pub fn outcome(&self) -> &'static str {
        match self {
            PromotionResult::Promoted { .. } => "promoted",
            PromotionResult::Rejected { .. } => "rejected",
            PromotionResult::NoOp { .. } => "no_op",
        }
    }

    pub fn is_promoted(&self) -> bool {
        matches!(self, PromotionResult::Promoted { .. })
    }

    pub fn version(&self) -> u32 {
        match self {
            PromotionResult::Promoted { version, .. }
            | PromotionResult::Rejected { version, .. }
            | PromotionResult::NoOp { version, .. } => *version,
        }
    }
}

pub struct PromotionEngine<S: RegistryStore> {
    store: Arc<S>,
    locks: NameLocks,
    policy: PromotionPolicy,
}

impl<S: RegistryStore> PromotionEngine<S> {
    pub fn new(store: Arc<S>, policy: PromotionPolicy) -> Self {
        Self { store, locks: NameLocks::new(), policy }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn policy(&self) -> &PromotionPolicy {
        &self.policy
    }

    /// Registration takes no lock; it is retried independently by callers.
    pub fn register_version(&self, new: NewVersion) -> Result<ModelVersion> {
        self.store.register_version(new)
    }

    /// Manual stage change, serialized with promotions of the same model.
    pub fn transition_stage(&self, model_name: &str, version: u32, to: ModelStage, reason: Option<&str>) -> Result<ModelVersion> {
        self.locks.with_lock(model_name, || self.store.transition_stage(model_name, version, to, reason))
    }

    pub fn auto_promote_default(&self, model_name: &str, candidate_version: u32) -> Result<PromotionResult> {
        self.auto_promote(model_name, candidate_version, self.policy.direction)
    }

    #[instrument(skip(self))]
    pub fn auto_promote(&self, model_name: &str, candidate_version: u32, direction: MetricDirection) -> Result<PromotionResult> {
        let started = Instant::now();
        let result = self.locks.with_lock(model_name, || {
            retry_with_backoff(&self.policy.retry, RegistryError::is_retryable, |attempt| {
                if attempt > 0 {
                    warn!(attempt, "production changed during promotion, re-evaluating");
                }
                self.decide_and_apply(model_name, candidate_version, direction)
            })
        });
        PROMOTION_METRICS.decision_ms.record(started.elapsed().as_secs_f64() * 1000.0, &[]);

        match &result {
            Ok(outcome) => {
                let labels = [KeyValue::new("model", model_name.to_string())];
                match outcome {
                    PromotionResult::Promoted { previous_version, delta, reason, .. } => {
                        PROMOTION_METRICS.promoted_total.add(1, &labels);
                        info!(previous = ?previous_version, delta = ?delta, %reason, "candidate promoted");
                    }
                    PromotionResult::Rejected { production_version, production_metric, metric_value, reason, .. } => {
                        PROMOTION_METRICS.rejected_total.add(1, &labels);
                        info!(production = ?production_version, production_metric = ?production_metric, metric_value, %reason, "candidate rejected");
                    }
                    PromotionResult::NoOp { .. } => {
                        PROMOTION_METRICS.noop_total.add(1, &labels);
                        info!("candidate already in production");
                    }
                }
            }
            Err(error) => warn!(%error, "promotion failed"),
        }
        result
    }

    /// Register a finished training run and immediately evaluate it.
    ///
    /// A retried pipeline step that hits `DuplicateRegistration` evaluates the
    /// version registered the first time instead of failing.
    pub fn register_and_promote(&self, new: NewVersion, direction: MetricDirection) -> Result<(ModelVersion, PromotionResult)> {
        let model_name = new.model_name.clone();
        let version = match self.store.register_version(new) {
            Ok(record) => record.version,
            Err(RegistryError::DuplicateRegistration { existing_version, artifact_ref, .. }) => {
                info!(model = %model_name, existing_version, %artifact_ref, "artifact already registered, evaluating existing version");
                existing_version
            }
            Err(error) => return Err(error),
        };
        let outcome = self.auto_promote(&model_name, version, direction)?;
        let record = self.store.get_version(&model_name, version)?;
        Ok((record, outcome))
    }

    fn decide_and_apply(&self, model_name: &str, candidate_version: u32, direction: MetricDirection) -> Result<PromotionResult> {
        let candidate = self.store.get_version(model_name, candidate_version)?;
        let current = self.store.get_production(model_name)?;

        if current.as_ref().map(|c| c.version) == Some(candidate.version) {
            return Ok(PromotionResult::NoOp { model_name: model_name.to_string(), version: candidate.version });
        }

        if candidate.stage.is_terminal() {
            return Ok(PromotionResult::Rejected {
                model_name: model_name.to_string(),
                version: candidate.version,
                metric_value: candidate.metric_value,
                production_version: current.as_ref().map(|c| c.version),
                production_metric: current.as_ref().map(|c| c.metric_value),
                reason: RejectionReason::CandidateArchived,
            });
        }

        match current {
            None => {
                let reason = PromotionReason::FirstProductionVersion;
                self.store.apply_promotion(&PromotionPlan {
                    model_name: model_name.to_string(),
                    candidate: candidate.version,
                    expected_production: None,
                    reason: reason.to_string(),
                })?;
                Ok(PromotionResult::Promoted {
                    model_name: model_name.to_string(),
                    version: candidate.version,
                    metric_value: candidate.metric_value,
                    previous_version: None,
                    previous_metric: None,
                    delta: None,
                    reason,
                })
            }
            Some(current) if direction.is_improvement(candidate.metric_value, current.metric_value) => {
                self.store.apply_promotion(&PromotionPlan {
                    model_name: model_name.to_string(),
                    candidate: candidate.version,
                    expected_production: Some(current.version),
                    reason: format!("improved on v{} ({} -> {})", current.version, current.metric_value, candidate.metric_value),
                })?;
                Ok(PromotionResult::Promoted {
                    model_name: model_name.to_string(),
                    version: candidate.version,
                    metric_value: candidate.metric_value,
                    previous_version: Some(current.version),
                    previous_metric: Some(current.metric_value),
                    delta: Some(candidate.metric_value - current.metric_value),
                    reason: PromotionReason::Improved,
                })
            }
            Some(current) => Ok(PromotionResult::Rejected {
                model_name: model_name.to_string(),
                version: candidate.version,
                metric_value: candidate.metric_value,
                production_version: Some(current.version),
                production_metric: Some(current.metric_value),
                reason: RejectionReason::NotBetter,
            }),
        }
    }
}
