//! Error types for the publisher

use thiserror::Error;

/// Main error type for the publisher
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Non-2xx answer from the notebook server, with the message it supplied
    #[error("{message}")]
    Remote { status: u16, message: String },

    #[error("Unable to verify server {address}: {message}")]
    Verification { address: String, message: String },

    #[error("Unable to persist server configuration: {0}")]
    ConfigPersistence(String),

    #[error("Unable to inspect the notebook environment: {0}")]
    EnvironmentInspection(String),

    #[error("Environment output is not valid JSON: {message}")]
    EnvironmentParse { message: String, raw: String },

    #[error("Deploy request rejected: {0}")]
    DeploySubmission(String),

    #[error("{0}")]
    DeployExecution(String),

    #[error("Content search failed: {0}")]
    Search(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PublishError {
    /// The message to show a user, without the category prefix for remote errors
    pub fn server_message(&self) -> String {
        match self {
            PublishError::Remote { message, .. } => message.clone(),
            PublishError::HttpError(e) => e.to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the action that raised this error can carry on in memory
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PublishError::ConfigPersistence(_))
    }
}
