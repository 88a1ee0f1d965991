//! The chat client: one user action in, one or two bubbles out.
//!
//! A turn renders the user's bubble, clears the input, posts the message to
//! the backend once, renders whatever comes back (or the network-error
//! bubble), and finally scrolls the transcript to the bottom.
//!
//! The turn splits into [`ChatClient::begin`], which never waits, and
//! [`ChatClient::complete`], which does the network call. The server returns
//! the first half immediately so the user's bubble shows while the backend
//! is still working.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::Result;
use crate::payload::{ChatRequest, ServerResponse};
use crate::render::{dispatch, render_network_error, render_user};
use crate::transcript::{MessageInput, Transcript};

/// Path of the chat endpoint on the backend.
pub const DEFAULT_CHAT_PATH: &str = "/api/chat";

/// Sends one chat request and decodes the reply.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<ServerResponse>;
}

/// [`ChatBackend`] speaking JSON over HTTP.
///
/// Makes a single attempt per call with no client-side timeout. A non-2xx
/// status is not an error in itself: the body is decoded like any other, so
/// an error body without a `type` ends up as the fallback reply.
#[derive(Debug, Clone)]
pub struct HttpChatBackend {
    endpoint: Url,
    http: reqwest::Client,
}

impl HttpChatBackend {
    /// Backend at `base_url` using the default chat path.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_path(base_url, DEFAULT_CHAT_PATH)
    }

    pub fn with_path(base_url: impl AsRef<str>, chat_path: &str) -> Result<Self> {
        Self::with_client(base_url, chat_path, reqwest::Client::new())
    }

    /// Backend with a custom reqwest client.
    pub fn with_client(
        base_url: impl AsRef<str>,
        chat_path: &str,
        http: reqwest::Client,
    ) -> Result<Self> {
        let endpoint = Url::parse(base_url.as_ref())?.join(chat_path)?;
        Ok(Self { endpoint, http })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn send(&self, request: &ChatRequest) -> Result<ServerResponse> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!(
                status = status.as_u16(),
                endpoint = %self.endpoint,
                "Chat backend returned a non-success status"
            );
        }

        let body = response.bytes().await?;
        ServerResponse::from_json(&body)
    }
}

/// What to do with a reply when a newer submit is already in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOrdering {
    /// Append every reply as it resolves. Concurrent turns may interleave.
    #[default]
    Arrival,
    /// Only the reply to the most recent submit is appended.
    LatestOnly,
}

impl ResponseOrdering {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arrival => "arrival",
            Self::LatestOnly => "latest_only",
        }
    }
}

/// Generation counter shared by every turn of one widget.
///
/// Cloning yields another handle to the same counter.
#[derive(Debug, Clone, Default)]
pub struct TurnGate {
    latest: Arc<AtomicU64>,
}

impl TurnGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a turn and return its token.
    pub fn begin(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether `token` still belongs to the newest turn.
    pub fn is_current(&self, token: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == token
    }
}

/// Result of one submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input: nothing rendered, nothing sent.
    Ignored,
    /// The reply (or the network-error bubble) was appended.
    Rendered,
    /// A newer turn started first and the reply was discarded.
    Superseded,
}

/// A turn whose user bubble is shown and whose reply is still owed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTurn {
    /// Correlates the two halves of the turn in logs and markup.
    pub turn_id: Uuid,
    /// Trimmed message text.
    pub message: String,
    /// Generation token taken when the turn began.
    pub token: u64,
}

/// Chat client bound to injected element handles and a backend.
pub struct ChatClient {
    backend: Arc<dyn ChatBackend>,
    transcript: Arc<dyn Transcript>,
    input: Arc<dyn MessageInput>,
    ordering: ResponseOrdering,
    gate: TurnGate,
    context_phone_id: Option<String>,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("ordering", &self.ordering)
            .field("gate", &self.gate)
            .field("context_phone_id", &self.context_phone_id)
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        transcript: Arc<dyn Transcript>,
        input: Arc<dyn MessageInput>,
    ) -> Self {
        Self {
            backend,
            transcript,
            input,
            ordering: ResponseOrdering::default(),
            gate: TurnGate::new(),
            context_phone_id: None,
        }
    }

    #[must_use]
    pub fn with_ordering(mut self, ordering: ResponseOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Share a generation counter with other clients of the same widget.
    #[must_use]
    pub fn with_gate(mut self, gate: TurnGate) -> Self {
        self.gate = gate;
        self
    }

    /// Attach the phone the page is showing to every request.
    #[must_use]
    pub fn with_context_phone(mut self, phone_id: Option<String>) -> Self {
        self.context_phone_id = phone_id.filter(|id| !id.trim().is_empty());
        self
    }

    /// Submit handler: read the input field and run a turn with its value.
    pub async fn handle_submit(&self) -> SubmitOutcome {
        let text = self.input.value();
        self.submit(&text).await
    }

    /// Run one chat turn for `text`.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        match self.begin(text) {
            Some(turn) => self.complete(turn).await,
            None => SubmitOutcome::Ignored,
        }
    }

    /// First half of a turn, read from the input field.
    pub fn begin_submit(&self) -> Option<PendingTurn> {
        let text = self.input.value();
        self.begin(&text)
    }

    /// Show the user's bubble and clear the input, without touching the
    /// network. Returns `None` for blank text.
    pub fn begin(&self, text: &str) -> Option<PendingTurn> {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring blank chat submission");
            return None;
        }

        let turn_id = Uuid::new_v4();
        self.transcript.append(render_user(text));
        self.input.clear();

        let token = self.gate.begin();
        info!(
            name: "chat.turn.started",
            turn_id = %turn_id,
            token,
            chars = text.chars().count(),
            "Chat turn started"
        );

        Some(PendingTurn {
            turn_id,
            message: text.to_string(),
            token,
        })
    }

    /// Second half of a turn: post the message, render the reply and scroll.
    pub async fn complete(&self, turn: PendingTurn) -> SubmitOutcome {
        let PendingTurn {
            turn_id,
            message,
            token,
        } = turn;

        let mut request = ChatRequest::new(message);
        request.context_phone_id.clone_from(&self.context_phone_id);

        let bubble = match self.backend.send(&request).await {
            Ok(reply) => {
                debug!(
                    turn_id = %turn_id,
                    reply_type = reply.kind().unwrap_or("unrecognized"),
                    "Chat reply received"
                );
                dispatch(&reply)
            }
            Err(e) => {
                warn!(turn_id = %turn_id, error = %e, "Chat request failed");
                render_network_error()
            }
        };

        let outcome = if self.ordering == ResponseOrdering::LatestOnly
            && !self.gate.is_current(token)
        {
            SubmitOutcome::Superseded
        } else {
            self.transcript.append(bubble);
            SubmitOutcome::Rendered
        };

        self.transcript.scroll_to_bottom();

        info!(
            name: "chat.turn.completed",
            turn_id = %turn_id,
            outcome = ?outcome,
            "Chat turn completed"
        );
        outcome
    }
}
