use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameTreeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error in {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid document {path:?}: {message}")]
    InvalidDocument { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, FrameTreeError>;
