use stampede_core::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Invalid options: {0}")]
    Config(#[from] ConfigError),

    #[error("Scenario task failed: {0}")]
    ScenarioPanicked(String),
}
