//! Per-model registry overview: stage counts and metric progression.

use serde::{Deserialize, Serialize};

use crate::direction::MetricDirection;
use crate::stage::ModelStage;
use crate::version::ModelVersion;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySummary {
    pub model_name: String,
    pub total_versions: usize,
    /// Versions still in stage `None`
    pub pending: usize,
    pub staging: usize,
    pub production: usize,
    pub archived: usize,
    pub production_version: Option<u32>,
    pub production_metric: Option<f64>,
    /// The first registered version
    pub baseline_version: Option<u32>,
    pub baseline_metric: Option<f64>,
    pub best_version: Option<u32>,
    pub best_metric: Option<f64>,
    /// Relative improvement of best over baseline, in percent. `None` when the baseline metric is zero.
    pub improvement_pct: Option<f64>,
}

impl RegistrySummary {
    /// `versions` as returned by `list_versions`: ascending by version.
    pub fn from_versions(model_name: &str, versions: &[ModelVersion], direction: MetricDirection) -> Self {
        let count = |stage: ModelStage| versions.iter().filter(|v| v.stage == stage).count();
        let production = versions.iter().find(|v| v.stage == ModelStage::Production);
        let baseline = versions.first();
        let best = versions.iter().fold(None::<&ModelVersion>, |best, v| match best {
            Some(b) if !direction.is_improvement(v.metric_value, b.metric_value) => Some(b),
            _ => Some(v),
        });
        let improvement_pct = match (baseline, best) {
            (Some(base), Some(best)) if base.metric_value != 0.0 => {
                let gain = match direction {
                    MetricDirection::HigherIsBetter => best.metric_value - base.metric_value,
                    MetricDirection::LowerIsBetter => base.metric_value - best.metric_value,
                };
                Some(gain / base.metric_value.abs() * 100.0)
            }
            _ => None,
        };
        Self {
            model_name: model_name.to_string(),
            total_versions: versions.len(),
            pending: count(ModelStage::None),
            staging: count(ModelStage::Staging),
            production: count(ModelStage::Production),
            archived: count(ModelStage::Archived),
            production_version: production.map(|v| v.version),
            production_metric: production.map(|v| v.metric_value),
            baseline_version: baseline.map(|v| v.version),
            baseline_metric: baseline.map(|v| v.metric_value),
            best_version: best.map(|v| v.version),
            best_metric: best.map(|v| v.metric_value),
            improvement_pct,
        }
    }
}
