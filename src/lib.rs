//! Chat Widget
//!
//! Renders a conversation thread for a shopping-assistant backend: posts the
//! user's message to `POST /api/chat`, dispatches on the reply's `type`, and
//! turns recommendations, comparisons, explainers, no-results and refusals
//! into escaped HTML bubbles.
//!
//! # Architecture
//!
//! - **Client**: [`client::ChatClient`] runs one turn against injected
//!   transcript, input and backend handles
//! - **Rendering**: pure functions from payload to [`render::Bubble`]
//! - **Server**: Axum routes that serve the widget markup and return each
//!   turn as two HTMX fragments: the user's bubble at once, the reply when
//!   the backend answers
//!
//! # Modules
//!
//! - [`payload`]: Wire types and the reply sum type
//! - [`render`]: Askama templates, renderers and dispatch
//! - [`transcript`]: Element handles the client is built from
//! - [`client`]: Chat backend trait, HTTP backend and the chat client
//! - [`server`]: HTTP surface

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod client;
pub mod config;
pub mod error;
pub mod payload;
pub mod render;
pub mod server;
pub mod telemetry;
pub mod transcript;

use client::{ChatBackend, ResponseOrdering};
use server::WidgetGates;
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Backend every chat turn is sent to.
    pub backend: Arc<dyn ChatBackend>,
    /// How replies to overlapping turns are ordered.
    pub ordering: ResponseOrdering,
    /// Per-widget generation counters.
    pub gates: WidgetGates,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("ordering", &self.ordering)
            .field("gates", &self.gates)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(backend: Arc<dyn ChatBackend>, ordering: ResponseOrdering) -> Self {
        Self {
            backend,
            ordering,
            gates: WidgetGates::new(),
        }
    }
}
