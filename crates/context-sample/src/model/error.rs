use context_framework::ContextError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("The application is not running")]
    NotRunning,
}
