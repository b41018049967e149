//! Command-line interface for the training pipeline.

use clap::{Parser, Subcommand, ValueEnum};
use model_registry::{MetricDirection, ModelStage};

/// Model registry and automatic promotion
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "promotion-service")]
#[command(version)]
#[command(about = "Register trained model versions and promote the best one to Production")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Register a finished training run
    Register(RegisterArgs),

    /// Compare a registered version against Production and promote it if strictly better
    Promote(PromoteArgs),

    /// Show the version currently in Production
    Production(ModelArg),

    /// List every version of a model
    List(ModelArg),

    /// List registered model names
    Models,

    /// Change the stage of one version
    Transition(TransitionArgs),

    /// Show the stage transition audit trail of a model
    History(ModelArg),

    /// Stage counts and metric progression of a model
    Summary(SummaryArgs),

    /// Register and promote a baseline, a worse and a better run
    Demo(ModelArg),
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ModelArg {
    #[arg(long)]
    pub model: String,
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct RegisterArgs {
    #[arg(long)]
    pub model: String,

    /// Artifact locator (path or URI)
    #[arg(long)]
    pub artifact: String,

    /// Value of the compared metric
    #[arg(long, allow_negative_numbers = true)]
    pub metric: f64,

    /// Training parameter as key=value, repeatable. Values that parse as JSON are stored as JSON.
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<(String, serde_json::Value)>,

    /// Evaluate for promotion right after registering
    #[arg(long)]
    pub promote: bool,

    #[arg(long, value_enum)]
    pub direction: Option<DirectionArg>,
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct PromoteArgs {
    #[arg(long)]
    pub model: String,

    #[arg(long)]
    pub version: u32,

    /// Overrides `promotion.higher_is_better` from config
    #[arg(long, value_enum)]
    pub direction: Option<DirectionArg>,
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct TransitionArgs {
    #[arg(long)]
    pub model: String,

    #[arg(long)]
    pub version: u32,

    /// None, Staging, Production or Archived
    #[arg(long, value_parser = parse_stage)]
    pub stage: ModelStage,

    #[arg(long)]
    pub reason: Option<String>,
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct SummaryArgs {
    #[arg(long)]
    pub model: String,

    #[arg(long, value_enum)]
    pub direction: Option<DirectionArg>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionArg {
    Higher,
    Lower,
}

impl From<DirectionArg> for MetricDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Higher => MetricDirection::HigherIsBetter,
            DirectionArg::Lower => MetricDirection::LowerIsBetter,
        }
    }
}

fn parse_param(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw.split_once('=').ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in {raw:?}"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn parse_stage(raw: &str) -> Result<ModelStage, String> {
    raw.parse()
}
