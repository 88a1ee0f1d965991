//! Wire types exchanged with the chat backend.
//!
//! The backend answers every chat turn with a JSON object carrying a `type`
//! discriminator. [`ServerResponse`] models that as a sum type with a default
//! arm, so an unknown or missing tag is a value rather than an error.
//!
//! # Example
//!
//! ```rust
//! use chat_widget::payload::ServerResponse;
//!
//! let reply = ServerResponse::from_json(br#"{"type":"refusal","message":"No."}"#).unwrap();
//! assert_eq!(reply, ServerResponse::Refusal { message: "No.".to_string() });
//!
//! let odd = ServerResponse::from_json(br#"{"type":"weather"}"#).unwrap();
//! assert_eq!(odd, ServerResponse::Unrecognized);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person typing into the widget.
    User,
    /// The backend's reply.
    Assistant,
}

impl Role {
    /// CSS class used for bubbles of this role.
    pub fn css_class(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single turn of text. Lives only until it is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Author of the message.
    pub role: Role,
    /// Raw, unescaped text.
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Request body for `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// User message content, already trimmed.
    pub message: String,
    /// Phone the user is currently looking at, if the page knows one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_phone_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context_phone_id: None,
        }
    }

    #[must_use]
    pub fn with_context_phone(mut self, phone_id: impl Into<String>) -> Self {
        self.context_phone_id = Some(phone_id.into());
        self
    }
}

/// A price as the backend sends it: usually a formatted string such as
/// `"₹24,999"`, occasionally a bare number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Price {
    Text(String),
    Amount(serde_json::Number),
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Amount(amount) => write!(f, "{amount}"),
        }
    }
}

impl From<&str> for Price {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// One recommended product card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub price: Price,
    /// One-line hardware summary.
    pub summary: String,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
}

/// One column of a side-by-side comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonItem {
    pub name: String,
    pub price: Price,
    pub camera: String,
    pub battery: String,
    pub display: String,
    /// System-on-chip.
    pub soc: String,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
}

/// Reply payload for one chat turn, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerResponse {
    /// Ranked product suggestions with a one-line rationale.
    Recommendations { rationale: String, items: Vec<Item> },

    /// Side-by-side comparison of named products.
    Comparison { items: Vec<ComparisonItem> },

    /// Plain-text explanation of a concept.
    Explainer { message: String },

    /// Nothing in the catalog matched.
    NoResults { message: String },

    /// The backend declined to answer.
    Refusal { message: String },

    /// Any `type` this widget does not know, or no `type` at all.
    #[serde(other)]
    Unrecognized,
}

impl ServerResponse {
    /// Decode a reply body.
    ///
    /// Bodies that are not JSON, a bare `null`, and known tags whose fields
    /// do not match are errors. Any other JSON value without a string `type`
    /// decodes to [`ServerResponse::Unrecognized`].
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Err(
                <serde_json::Error as serde::de::Error>::custom("reply body is null").into(),
            );
        }
        if value.get("type").and_then(Value::as_str).is_none() {
            return Ok(Self::Unrecognized);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// The wire tag for this reply, `None` for the default arm.
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            Self::Recommendations { .. } => Some("recommendations"),
            Self::Comparison { .. } => Some("comparison"),
            Self::Explainer { .. } => Some("explainer"),
            Self::NoResults { .. } => Some("no_results"),
            Self::Refusal { .. } => Some("refusal"),
            Self::Unrecognized => None,
        }
    }
}
