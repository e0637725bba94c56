//! Error handling for the credit aligner

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CreditAlignerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding generation error: {0}")]
    Embedding(String),

    #[error("Clustering error: {0}")]
    Clustering(String),

    #[error("Skill extraction error: {0}")]
    Extraction(String),
}

pub type Result<T> = std::result::Result<T, CreditAlignerError>;

/// Convert anyhow errors to our custom error type
impl From<anyhow::Error> for CreditAlignerError {
    fn from(err: anyhow::Error) -> Self {
        CreditAlignerError::Extraction(err.to_string())
    }
}

impl From<toml::de::Error> for CreditAlignerError {
    fn from(err: toml::de::Error) -> Self {
        CreditAlignerError::Configuration(format!("Failed to parse config: {}", err))
    }
}
