use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Repair failed: {0}")]
    Repair(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),
}

pub type AppResult<T> = Result<T, AppError>;
