//! Promotion decision metrics.
//!
//! Instruments come from the OpenTelemetry global meter. Without an installed
//! provider they are no-ops; exporting is left to the host process.

use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Histogram, Meter};

#[derive(Clone, Debug)]
pub struct PromotionMetrics {
    pub promoted_total: Counter<u64>,
    pub rejected_total: Counter<u64>,
    pub noop_total: Counter<u64>,
    pub retries_total: Counter<u64>,
    pub decision_ms: Histogram<f64>,
}

static PROMOTION_METER: Lazy<Meter> = Lazy::new(|| opentelemetry::global::meter("mlops_promotion"));

pub static PROMOTION_METRICS: Lazy<PromotionMetrics> = Lazy::new(|| {
    PromotionMetrics {
        promoted_total: PROMOTION_METER.u64_counter("mlops_promotion_promoted_total")
            .with_description("Candidates promoted to Production")
            .build(),
        rejected_total: PROMOTION_METER.u64_counter("mlops_promotion_rejected_total")
            .with_description("Candidates rejected by the metric comparison")
            .build(),
        noop_total: PROMOTION_METER.u64_counter("mlops_promotion_noop_total")
            .with_description("Promotion calls for a candidate already in Production")
            .build(),
        retries_total: PROMOTION_METER.u64_counter("mlops_promotion_retries_total")
            .with_description("Retries after a retryable failure such as a concurrent modification")
            .build(),
        decision_ms: PROMOTION_METER.f64_histogram("mlops_promotion_decision_ms")
            .with_description("Latency of the read-compare-transition sequence (ms)")
            .with_unit("ms")
            .build(),
    }
});
