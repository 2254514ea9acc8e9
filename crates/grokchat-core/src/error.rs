use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File inclusion error: {name}: {message}")]
    Inclusion { name: String, message: String },

    #[error("Remote call failed: {0}")]
    Remote(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported export format: {0} (expected json, txt, md or html)")]
    ExportFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChatError {
    pub fn storage(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn inclusion(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Inclusion {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Storage failures halt the current operation; everything else is
    /// reported and the session carries on.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Storage { .. } | Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
