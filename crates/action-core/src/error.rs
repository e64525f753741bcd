use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("action endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("relay timed out after {0:?}")]
    Timeout(Duration),

    #[error("relay panicked: {0}")]
    Panicked(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ActionError>;
