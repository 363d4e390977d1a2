use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to start process: {0}")]
    Spawn(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
