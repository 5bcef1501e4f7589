use crate::MetricKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Scenario name must not be empty")]
    EmptyScenarioName,

    #[error("No scenarios configured")]
    NoScenarios,

    #[error("Scenario {0} must run at least one VU")]
    NoVus(String),

    #[error("Scenario {0} has a zero duration")]
    ZeroDuration(String),

    #[error("Scenario {0} has no stages")]
    NoStages(String),

    #[error("Invalid threshold: {0}")]
    Threshold(#[from] ThresholdParseError),

    #[error("Threshold `{threshold}` cannot be applied to {kind} metric {metric}")]
    IncompatibleThreshold {
        metric: String,
        kind: MetricKind,
        threshold: String,
    },

    #[error("Failed to read options: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse options: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThresholdParseError {
    #[error("missing comparison operator in `{0}`")]
    MissingOperator(String),

    #[error("unknown aggregation `{0}`")]
    UnknownAggregation(String),

    #[error("invalid percentile `{0}`")]
    InvalidPercentile(String),

    #[error("invalid threshold value `{0}`")]
    InvalidValue(String),
}
