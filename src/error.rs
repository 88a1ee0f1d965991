//! Error types for the chat widget.

use thiserror::Error;

/// Widget error type.
#[derive(Error, Debug)]
pub enum WidgetError {
    /// HTTP request to the chat backend failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid backend URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Reply body was not the JSON we expected.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WidgetError {
    /// Whether this error happened while talking to the backend.
    ///
    /// Transport and decode failures both surface to the user as the same
    /// network-error bubble.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Json(_))
    }
}

/// Result type alias for widget operations.
pub type Result<T> = std::result::Result<T, WidgetError>;
