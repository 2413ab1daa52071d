// Dashcam Merge Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Permission error: {0}")]
    Permission(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, MergeError>;
