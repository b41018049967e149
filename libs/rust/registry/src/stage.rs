//! Model lifecycle stages

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelStage {
    /// Registered, not yet evaluated for serving
    None,
    /// Under validation
    Staging,
    /// Serving traffic; at most one version per model name
    Production,
    /// Retired. Terminal.
    Archived,
}

impl ModelStage {
    pub const ALL: [ModelStage; 4] = [ModelStage::None, ModelStage::Staging, ModelStage::Production, ModelStage::Archived];

    /// None -> Staging -> Production -> Archived, plus the None -> Production shortcut.
    pub fn can_transition_to(&self, target: ModelStage) -> bool {
        matches!(
            (self, target),
            (ModelStage::None, ModelStage::Staging)
                | (ModelStage::None, ModelStage::Production)
                | (ModelStage::Staging, ModelStage::Production)
                | (ModelStage::Production, ModelStage::Archived)
        )
    }

    /// No transition leaves a terminal stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ModelStage::Archived)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStage::None => "None",
            ModelStage::Staging => "Staging",
            ModelStage::Production => "Production",
            ModelStage::Archived => "Archived",
        }
    }
}

impl std::fmt::Display for ModelStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelStage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ModelStage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown stage {s:?}, expected one of None, Staging, Production, Archived"))
    }
}
