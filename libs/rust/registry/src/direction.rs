//! Metric comparison direction

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MetricDirection {
    /// AUC, accuracy, F1
    #[default]
    HigherIsBetter,
    /// Loss, RMSE, latency
    LowerIsBetter,
}

impl MetricDirection {
    pub fn from_higher_is_better(higher_is_better: bool) -> Self {
        if higher_is_better { MetricDirection::HigherIsBetter } else { MetricDirection::LowerIsBetter }
    }

    /// Strict: equal values never count as an improvement.
    pub fn is_improvement(&self, candidate: f64, current: f64) -> bool {
        match self {
            MetricDirection::HigherIsBetter => candidate > current,
            MetricDirection::LowerIsBetter => candidate < current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_is_better() {
        let d = MetricDirection::HigherIsBetter;
        assert!(d.is_improvement(0.93, 0.70));
        assert!(!d.is_improvement(0.61, 0.70));
        assert!(!d.is_improvement(0.70, 0.70));
    }

    #[test]
    fn lower_is_better() {
        let d = MetricDirection::from_higher_is_better(false);
        assert!(d.is_improvement(0.1, 0.2));
        assert!(!d.is_improvement(0.2, 0.1));
        assert!(!d.is_improvement(0.2, 0.2));
    }
}
