//! Stage transition audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stage::ModelStage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    pub model_name: String,
    pub version: u32,
    pub from_stage: ModelStage,
    pub to_stage: ModelStage,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

impl StageTransition {
    pub fn new(model_name: &str, version: u32, from_stage: ModelStage, to_stage: ModelStage, reason: Option<&str>) -> Self {
        Self {
            model_name: model_name.to_string(),
            version,
            from_stage,
            to_stage,
            timestamp: Utc::now(),
            reason: reason.map(ToString::to_string),
        }
    }
}
