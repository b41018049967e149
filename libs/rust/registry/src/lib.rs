//! Model registry and automatic promotion engine.
//!
//! A training pipeline registers each finished run with
//! [`RegistryStore::register_version`] and then asks the
//! [`PromotionEngine`] whether it should replace the version serving
//! production traffic. The engine promotes only on strict improvement of a
//! single metric, archives the previous production version in the same
//! atomic step, and serializes decisions per model name.
//!
//! ```ignore
//! use std::sync::Arc;
//! use model_registry::{InMemoryStore, NewVersion, PromotionEngine, PromotionPolicy};
//!
//! let engine = PromotionEngine::new(Arc::new(InMemoryStore::new()), PromotionPolicy::default());
//! let v1 = engine.register_version(NewVersion::new("noshow-predictor", "runs/1/model.pkl", 0.70))?;
//! let outcome = engine.auto_promote_default("noshow-predictor", v1.version)?;
//! assert!(outcome.is_promoted());
//! ```

mod direction;
mod engine;
mod error;
mod lock;
mod stage;
pub mod store;
mod summary;
mod transition;
mod version;

pub use direction::MetricDirection;
pub use engine::{PromotionEngine, PromotionPolicy, PromotionReason, PromotionResult, RejectionReason};
pub use error::{RegistryError, Result};
pub use lock::NameLocks;
pub use stage::ModelStage;
pub use store::{InMemoryStore, PromotionPlan, RegistryStore, SledStore};
pub use summary::RegistrySummary;
pub use transition::StageTransition;
pub use version::{validate_model_name, ModelVersion, NewVersion, Parameters};
