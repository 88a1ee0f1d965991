//! Handles to the page elements the chat client works against.
//!
//! The client never looks elements up itself; it receives a [`Transcript`]
//! (the `chat` container) and a [`MessageInput`] (the `message` field) when
//! it is constructed. The in-memory implementations here back the server's
//! per-turn fragments and the tests.

use std::sync::{Arc, PoisonError, RwLock};

use crate::render::Bubble;

/// Element id of the transcript container.
pub const CHAT_CONTAINER_ID: &str = "chat";
/// Element id of the submit form.
pub const CHAT_FORM_ID: &str = "chat-form";
/// Element id of the message text input.
pub const MESSAGE_INPUT_ID: &str = "message";

/// Append-only container of rendered bubbles.
pub trait Transcript: Send + Sync {
    /// Append a bubble after all existing ones. Never touches earlier bubbles.
    fn append(&self, bubble: Bubble);

    /// Scroll the container so the newest bubble is visible.
    fn scroll_to_bottom(&self);
}

/// The text field the user types into.
pub trait MessageInput: Send + Sync {
    /// Current, untrimmed value.
    fn value(&self) -> String;

    fn clear(&self);
}

#[derive(Debug, Default)]
struct TranscriptState {
    bubbles: Vec<Bubble>,
    scroll_requests: usize,
}

/// In-memory transcript that renders to an HTML fragment.
///
/// Cloning yields another handle to the same transcript.
#[derive(Debug, Clone, Default)]
pub struct HtmlTranscript {
    inner: Arc<RwLock<TranscriptState>>,
}

impl HtmlTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the bubbles appended so far, oldest first.
    pub fn bubbles(&self) -> Vec<Bubble> {
        self.read(|state| state.bubbles.clone())
    }

    pub fn len(&self) -> usize {
        self.read(|state| state.bubbles.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times a scroll to bottom was requested.
    pub fn scroll_requests(&self) -> usize {
        self.read(|state| state.scroll_requests)
    }

    /// All bubbles rendered back to back, the way HTMX appends them.
    pub fn to_html(&self) -> String {
        self.read(|state| state.bubbles.iter().map(Bubble::to_html).collect())
    }

    fn read<R>(&self, f: impl FnOnce(&TranscriptState) -> R) -> R {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    fn write(&self, f: impl FnOnce(&mut TranscriptState)) {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }
}

impl Transcript for HtmlTranscript {
    fn append(&self, bubble: Bubble) {
        self.write(|state| state.bubbles.push(bubble));
    }

    fn scroll_to_bottom(&self) {
        self.write(|state| state.scroll_requests += 1);
    }
}

/// In-memory text field.
#[derive(Debug, Clone, Default)]
pub struct TextInput {
    value: Arc<RwLock<String>>,
}

impl TextInput {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Arc::new(RwLock::new(value.into())),
        }
    }

    /// Replace the field contents, as typing would.
    pub fn set(&self, value: impl Into<String>) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value.into();
    }
}

impl MessageInput for TextInput {
    fn value(&self) -> String {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn clear(&self) {
        self.value
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
