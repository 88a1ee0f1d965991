use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use askama::Template;
use axum::{
    Form, Json, Router,
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use crate::AppState;
use crate::client::{
    ChatClient, HttpChatBackend, PendingTurn, ResponseOrdering, TurnGate,
};
use crate::config::AppConfig;
use crate::render::render_template;
use crate::transcript::{
    CHAT_CONTAINER_ID, CHAT_FORM_ID, HtmlTranscript, MESSAGE_INPUT_ID, TextInput,
};

/// Event the transcript container listens for to scroll to the bottom.
pub const SCROLL_EVENT: &str = "chat-scroll-bottom";

/// `HX-Trigger-After-Settle` value: fire [`SCROLL_EVENT`] on `#chat` once the
/// reply has been swapped in and settled.
pub const SCROLL_TRIGGER: &str = r##"{"chat-scroll-bottom":{"target":"#chat"}}"##;

/// Response header carrying [`SCROLL_TRIGGER`].
pub const SCROLL_HEADER: &str = "hx-trigger-after-settle";

/// Widget id used when a form does not name one.
pub const DEFAULT_WIDGET_ID: &str = "default";

/// Widgets tracked for `latest_only` ordering before the least recently used
/// one is dropped.
pub const MAX_TRACKED_WIDGETS: usize = 1024;

#[derive(Debug, Default)]
struct GateTable {
    gates: HashMap<String, (TurnGate, u64)>,
    clock: u64,
}

/// Generation counters, one per widget instance on a page.
///
/// Holds at most `capacity` widgets; the least recently used one is evicted
/// to make room. A reply still in flight for an evicted widget is treated as
/// stale.
#[derive(Debug, Clone)]
pub struct WidgetGates {
    inner: Arc<RwLock<GateTable>>,
    capacity: usize,
}

impl Default for WidgetGates {
    fn default() -> Self {
        Self::with_capacity(MAX_TRACKED_WIDGETS)
    }
}

impl WidgetGates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    /// Counter for `widget_id`, created on first use.
    pub fn gate_for(&self, widget_id: &str) -> TurnGate {
        let mut table = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        table.clock += 1;
        let now = table.clock;

        if let Some((gate, last_used)) = table.gates.get_mut(widget_id) {
            *last_used = now;
            return gate.clone();
        }

        if table.gates.len() >= self.capacity {
            let oldest = table
                .gates
                .iter()
                .min_by_key(|(_, (_, last_used))| *last_used)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                debug!(widget = %id, "Evicting widget turn gate");
                table.gates.remove(&id);
            }
        }

        let gate = TurnGate::new();
        table
            .gates
            .insert(widget_id.to_string(), (gate.clone(), now));
        gate
    }

    /// Number of widgets currently tracked.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .gates
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, widget_id: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .gates
            .contains_key(widget_id)
    }
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let backend = HttpChatBackend::with_path(&config.backend.base_url, &config.backend.chat_path)?;

    info!(
        name: "backend.config.loaded",
        endpoint = %backend.endpoint(),
        ordering = config.widget.ordering.as_str(),
        "Chat backend configured"
    );

    let state = AppState::new(Arc::new(backend), config.widget.ordering);
    let app = router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Widget routes with tracing and a body limit.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/widget", get(widget))
        .route("/chat", post(chat_turn))
        .route("/chat/reply", post(chat_reply))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Templates
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Template)]
#[template(
    source = r##"<div id="{{ chat_id }}" class="chat" aria-live="polite" hx-on:{{ scroll_event }}="this.scrollTop = this.scrollHeight"></div>
<form id="{{ form_id }}" hx-post="/chat" hx-target="#{{ chat_id }}" hx-swap="beforeend" hx-on::before-request="this.reset()">
    <input type="hidden" name="widget" value="{{ widget_id }}">
    <input id="{{ input_id }}" name="message" type="text" autocomplete="off" placeholder="Ask about phones...">
    <button type="submit">Send</button>
</form>"##,
    ext = "html"
)]
struct WidgetTemplate<'a> {
    chat_id: &'a str,
    form_id: &'a str,
    input_id: &'a str,
    scroll_event: &'a str,
    widget_id: &'a str,
}

/// Hidden element that fetches the reply as soon as it lands in the transcript.
#[derive(Template)]
#[template(
    source = r##"<div id="pending-{{ turn_id }}" class="pending" hidden hx-post="/chat/reply" hx-trigger="load" hx-target="#{{ chat_id }}" hx-swap="beforeend" hx-vals="{{ vals }}"></div>"##,
    ext = "html"
)]
struct PendingReplyTemplate<'a> {
    turn_id: &'a str,
    chat_id: &'a str,
    vals: &'a str,
}

#[derive(Template)]
#[template(source = r#"<div id="pending-{{ turn_id }}" hx-swap-oob="delete"></div>"#, ext = "html")]
struct ClearPendingTemplate<'a> {
    turn_id: &'a str,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Form body posted by the widget.
#[derive(Debug, Deserialize)]
struct ChatForm {
    /// Raw input value; trimmed by the client.
    #[serde(default)]
    message: String,
    /// Widget instance, scopes response ordering.
    #[serde(default)]
    widget: Option<String>,
    #[serde(default)]
    context_phone_id: Option<String>,
}

/// Values carried from the pending element to `POST /chat/reply`.
#[derive(Debug, Deserialize)]
struct ReplyForm {
    #[serde(default)]
    message: String,
    #[serde(default)]
    turn_id: Option<String>,
    #[serde(default)]
    token: u64,
    #[serde(default)]
    widget: Option<String>,
    #[serde(default)]
    context_phone_id: Option<String>,
}

fn widget_id_or_default(widget: Option<&str>) -> &str {
    widget
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_WIDGET_ID)
}

/// Shared counter under `latest_only`; a throwaway one otherwise, so arrival
/// ordering keeps no per-widget state.
fn turn_gate(state: &AppState, widget_id: &str) -> TurnGate {
    match state.ordering {
        ResponseOrdering::LatestOnly => state.gates.gate_for(widget_id),
        ResponseOrdering::Arrival => TurnGate::new(),
    }
}

/// POST /chat - Show the user's bubble and schedule the reply request.
///
/// Never waits on the backend. The returned fragment ends with a hidden
/// element that posts to `/chat/reply` as soon as HTMX swaps it in.
async fn chat_turn(State(state): State<AppState>, Form(form): Form<ChatForm>) -> Response {
    let widget_id = widget_id_or_default(form.widget.as_deref());

    let transcript = HtmlTranscript::new();
    let client = ChatClient::new(
        Arc::clone(&state.backend),
        Arc::new(transcript.clone()),
        Arc::new(TextInput::new(form.message)),
    )
    .with_ordering(state.ordering)
    .with_gate(turn_gate(&state, widget_id));

    let Some(turn) = client.begin_submit() else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let turn_id = turn.turn_id.to_string();
    let mut vals = Map::new();
    vals.insert("message".into(), json!(turn.message));
    vals.insert("turn_id".into(), json!(turn_id));
    vals.insert("token".into(), json!(turn.token));
    vals.insert("widget".into(), json!(widget_id));
    if let Some(phone_id) = form.context_phone_id.filter(|id| !id.trim().is_empty()) {
        vals.insert("context_phone_id".into(), json!(phone_id));
    }
    let vals = Value::Object(vals).to_string();

    let mut html = transcript.to_html();
    html.push_str(&render_template(&PendingReplyTemplate {
        turn_id: &turn_id,
        chat_id: CHAT_CONTAINER_ID,
        vals: &vals,
    }));
    Html(html).into_response()
}

/// POST /chat/reply - Call the backend and return the assistant bubble.
///
/// The pending element is removed out of band and the transcript is told to
/// scroll after the swap settles, whether or not a bubble was appended.
async fn chat_reply(State(state): State<AppState>, Form(form): Form<ReplyForm>) -> Response {
    let message = form.message.trim();
    if message.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    let widget_id = widget_id_or_default(form.widget.as_deref());
    let turn_id = form
        .turn_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id).ok())
        .unwrap_or_else(Uuid::new_v4);

    let transcript = HtmlTranscript::new();
    let client = ChatClient::new(
        Arc::clone(&state.backend),
        Arc::new(transcript.clone()),
        Arc::new(TextInput::default()),
    )
    .with_ordering(state.ordering)
    .with_gate(turn_gate(&state, widget_id))
    .with_context_phone(form.context_phone_id);

    let outcome = client
        .complete(PendingTurn {
            turn_id,
            message: message.to_string(),
            token: form.token,
        })
        .await;
    debug!(turn_id = %turn_id, outcome = ?outcome, "Reply fragment ready");

    let mut html = transcript.to_html();
    html.push_str(&render_template(&ClearPendingTemplate {
        turn_id: &turn_id.to_string(),
    }));

    let mut headers = HeaderMap::new();
    if transcript.scroll_requests() > 0 {
        headers.insert(SCROLL_HEADER, HeaderValue::from_static(SCROLL_TRIGGER));
    }
    (headers, Html(html)).into_response()
}

#[derive(Debug, Deserialize)]
struct WidgetQuery {
    #[serde(default)]
    widget: Option<String>,
}

/// GET /widget - Transcript container and form, wired for HTMX.
async fn widget(Query(query): Query<WidgetQuery>) -> Html<String> {
    let widget_id = query
        .widget
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    Html(widget_markup(&widget_id))
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn widget_markup(widget_id: &str) -> String {
    render_template(&WidgetTemplate {
        chat_id: CHAT_CONTAINER_ID,
        form_id: CHAT_FORM_ID,
        input_id: MESSAGE_INPUT_ID,
        scroll_event: SCROLL_EVENT,
        widget_id,
    })
}
