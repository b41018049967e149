//! Racing promotions: per-name serialization, store-level compare-and-swap,
//! and bounded conflict retries.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use mlops_core::RetryConfig;
use model_registry::{
    InMemoryStore, ModelStage, ModelVersion, NewVersion, PromotionEngine, PromotionPlan, PromotionPolicy,
    PromotionResult, RegistryError, RegistryStore, Result, SledStore, StageTransition,
};

const MODEL: &str = "noshow-predictor";

fn fast_policy(max_retries: usize) -> PromotionPolicy {
    PromotionPolicy {
        retry: RetryConfig { max_retries, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5), jitter: 0.0 },
        ..PromotionPolicy::default()
    }
}

fn production_versions<S: RegistryStore>(store: &S) -> Vec<u32> {
    store.list_versions(MODEL).unwrap().into_iter().filter(|v| v.stage == ModelStage::Production).map(|v| v.version).collect()
}

fn equally_better_candidates_have_one_winner<S: RegistryStore + 'static>(store: S) {
    let engine = PromotionEngine::new(Arc::new(store), fast_policy(3));
    engine.register_version(NewVersion::new(MODEL, "runs/1", 0.70)).unwrap();
    engine.auto_promote_default(MODEL, 1).unwrap();
    engine.register_version(NewVersion::new(MODEL, "runs/2", 0.90)).unwrap();
    engine.register_version(NewVersion::new(MODEL, "runs/3", 0.90)).unwrap();

    let barrier = Barrier::new(2);
    let stop = AtomicBool::new(false);
    let observations = AtomicUsize::new(0);
    let results: Vec<PromotionResult> = std::thread::scope(|s| {
        let observer = s.spawn(|| {
            loop {
                let prod = production_versions(engine.store().as_ref());
                assert_eq!(prod.len(), 1, "observed {prod:?}");
                assert!(engine.store().get_production(MODEL).unwrap().is_some());
                observations.fetch_add(1, Ordering::Relaxed);
                if stop.load(Ordering::SeqCst) { break; }
            }
        });
        let racers: Vec<_> = [2u32, 3]
            .into_iter()
            .map(|candidate| {
                let engine = &engine;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    engine.auto_promote_default(MODEL, candidate).unwrap()
                })
            })
            .collect();
        let results = racers.into_iter().map(|h| h.join().unwrap()).collect();
        stop.store(true, Ordering::SeqCst);
        observer.join().unwrap();
        results
    });

    let winners: Vec<_> = results.iter().filter(|r| r.is_promoted()).collect();
    assert_eq!(winners.len(), 1, "{results:?}");
    let winner = winners[0].version();
    let loser = if winner == 2 { 3 } else { 2 };
    assert!(matches!(results.iter().find(|r| r.version() == loser), Some(PromotionResult::Rejected { .. })));
    assert_eq!(production_versions(engine.store().as_ref()), vec![winner]);
    assert_eq!(engine.store().get_version(MODEL, loser).unwrap().stage, ModelStage::None);
    assert_eq!(engine.store().get_version(MODEL, 1).unwrap().stage, ModelStage::Archived);
    assert!(observations.load(Ordering::Relaxed) > 0);
}

#[test]
fn memory_equally_better_candidates_have_one_winner() {
    equally_better_candidates_have_one_winner(InMemoryStore::new());
}

#[test]
fn sled_equally_better_candidates_have_one_winner() {
    equally_better_candidates_have_one_winner(SledStore::temporary().unwrap());
}

#[test]
fn many_pipelines_converge_on_best_metric() {
    let engine = PromotionEngine::new(Arc::new(InMemoryStore::new()), fast_policy(3));
    let metrics: Vec<f64> = (0..16).map(|i| 0.50 + ((i * 7) % 16) as f64 / 100.0).collect();
    std::thread::scope(|s| {
        for (i, metric) in metrics.iter().enumerate() {
            let engine = &engine;
            s.spawn(move || {
                let new = NewVersion::new(MODEL, &format!("runs/{i}"), *metric);
                engine.register_and_promote(new, engine.policy().direction).unwrap();
                assert!(production_versions(engine.store().as_ref()).len() <= 1);
            });
        }
    });
    let production = engine.store().get_production(MODEL).unwrap().unwrap();
    let best = metrics.iter().cloned().fold(f64::MIN, f64::max);
    assert_eq!(production.metric_value, best);
    assert_eq!(production_versions(engine.store().as_ref()).len(), 1);
}

#[test]
fn independent_engines_on_shared_store_stay_consistent() {
    // No shared NameLocks here, only the store's compare-and-swap.
    let store = Arc::new(InMemoryStore::new());
    let a = PromotionEngine::new(Arc::clone(&store), fast_policy(5));
    let b = PromotionEngine::new(Arc::clone(&store), fast_policy(5));
    a.register_version(NewVersion::new(MODEL, "runs/1", 0.70)).unwrap();
    a.auto_promote_default(MODEL, 1).unwrap();
    for i in 2..=21 {
        store.register_version(NewVersion::new(MODEL, &format!("runs/{i}"), 0.70 + i as f64 / 100.0)).unwrap();
    }
    std::thread::scope(|s| {
        s.spawn(|| for v in (2..=21).step_by(2) { a.auto_promote_default(MODEL, v).unwrap(); });
        s.spawn(|| for v in (3..=21).step_by(2) { b.auto_promote_default(MODEL, v).unwrap(); });
    });
    assert_eq!(production_versions(store.as_ref()), vec![21]);
    for t in store.transition_history(MODEL).unwrap() {
        assert!(t.from_stage.can_transition_to(t.to_stage), "{t:?}");
    }
}

#[test]
fn different_models_promote_in_parallel() {
    let engine = PromotionEngine::new(Arc::new(InMemoryStore::new()), PromotionPolicy::default());
    let names: Vec<String> = (0..8).map(|i| format!("model-{i}")).collect();
    std::thread::scope(|s| {
        for name in &names {
            let engine = &engine;
            s.spawn(move || {
                for (i, metric) in [0.6, 0.7, 0.65, 0.8].into_iter().enumerate() {
                    let new = NewVersion::new(name, &format!("runs/{i}"), metric);
                    engine.register_and_promote(new, engine.policy().direction).unwrap();
                }
            });
        }
    });
    for name in &names {
        let production = engine.store().get_production(name).unwrap().unwrap();
        assert_eq!(production.version, 4);
    }
}

/// Delegates to an in-memory store but loses the first `failures` promotion swaps.
struct FlakyStore {
    inner: InMemoryStore,
    failures: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakyStore {
    fn new(failures: usize) -> Self {
        Self { inner: InMemoryStore::new(), failures: AtomicUsize::new(failures), attempts: AtomicUsize::new(0) }
    }
}

impl RegistryStore for FlakyStore {
    fn register_version(&self, new: NewVersion) -> Result<ModelVersion> { self.inner.register_version(new) }
    fn get_version(&self, model_name: &str, version: u32) -> Result<ModelVersion> { self.inner.get_version(model_name, version) }
    fn get_production(&self, model_name: &str) -> Result<Option<ModelVersion>> { self.inner.get_production(model_name) }
    fn transition_stage(&self, model_name: &str, version: u32, to: ModelStage, reason: Option<&str>) -> Result<ModelVersion> {
        self.inner.transition_stage(model_name, version, to, reason)
    }
    fn list_versions(&self, model_name: &str) -> Result<Vec<ModelVersion>> { self.inner.list_versions(model_name) }
    fn list_models(&self) -> Result<Vec<String>> { self.inner.list_models() }
    fn transition_history(&self, model_name: &str) -> Result<Vec<StageTransition>> { self.inner.transition_history(model_name) }
    fn apply_promotion(&self, plan: &PromotionPlan) -> Result<ModelVersion> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RegistryError::ConcurrentModification { model_name: plan.model_name.clone() });
        }
        self.inner.apply_promotion(plan)
    }
}

#[test]
fn conflicts_are_retried() {
    let engine = PromotionEngine::new(Arc::new(FlakyStore::new(2)), fast_policy(3));
    engine.register_version(NewVersion::new(MODEL, "runs/1", 0.70)).unwrap();
    assert!(engine.auto_promote_default(MODEL, 1).unwrap().is_promoted());
    assert_eq!(engine.store().attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn persistent_conflict_surfaces_and_leaves_store_unchanged() {
    let engine = PromotionEngine::new(Arc::new(FlakyStore::new(10)), fast_policy(2));
    engine.register_version(NewVersion::new(MODEL, "runs/1", 0.70)).unwrap();
    let err = engine.auto_promote_default(MODEL, 1).unwrap_err();
    assert!(matches!(err, RegistryError::ConcurrentModification { .. }));
    assert_eq!(engine.store().attempts.load(Ordering::SeqCst), 3);
    assert!(engine.store().get_production(MODEL).unwrap().is_none());
    assert_eq!(engine.store().get_version(MODEL, 1).unwrap().stage, ModelStage::None);
}
