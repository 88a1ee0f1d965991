use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing::post};
use axum_test::TestServer;
use chat_widget::AppState;
use chat_widget::client::{ChatBackend, ChatClient, HttpChatBackend, ResponseOrdering, SubmitOutcome};
use chat_widget::render::{FALLBACK_MESSAGE, NETWORK_ERROR_MESSAGE};
use chat_widget::server::{SCROLL_HEADER, SCROLL_TRIGGER, router};
use chat_widget::transcript::{HtmlTranscript, MessageInput, TextInput};
use serde_json::{Value, json};
use std::sync::Arc;

/// Stand-in for the shopping-assistant backend, keyed on the message text.
async fn fake_chat(Json(body): Json<Value>) -> axum::response::Response {
    let message = body["message"].as_str().unwrap_or_default();
    match message {
        "budget phones" => Json(json!({
            "type": "recommendations",
            "rationale": "Top pick",
            "items": [{
                "name": "A",
                "price": "$10",
                "summary": "s",
                "pros": ["p1"],
                "cons": ["c1"]
            }]
        }))
        .into_response(),
        "compare" => Json(json!({
            "type": "comparison",
            "items": [{
                "id": "x1",
                "name": "Phone X",
                "price": "₹19,999",
                "camera": "50MP with OIS",
                "battery": "5000mAh, 33W",
                "display": "AMOLED 6.7\"",
                "soc": "Dimensity 7050",
                "pros": ["battery"],
                "cons": ["weight"]
            }]
        }))
        .into_response(),
        "what is ois" => Json(json!({
            "type": "explainer",
            "message": "OIS uses moving <hardware> & sensors."
        }))
        .into_response(),
        "nothing" => Json(json!({ "type": "no_results", "message": "None found" })).into_response(),
        "jailbreak" => Json(json!({ "type": "refusal", "message": "I cannot help with that." }))
            .into_response(),
        "weather" => Json(json!({ "type": "weather", "message": "sunny" })).into_response(),
        "rejected" => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "Empty message" })),
        )
            .into_response(),
        "context" => Json(json!({
            "type": "explainer",
            "message": body["context_phone_id"].as_str().unwrap_or("none")
        }))
        .into_response(),
        _ => (StatusCode::BAD_GATEWAY, "<html>upstream down</html>").into_response(),
    }
}

async fn spawn_backend() -> String {
    let app = Router::new().route("/api/chat", post(fake_chat));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Address nothing is listening on.
async fn dead_backend() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn widget_server(base_url: &str) -> TestServer {
    let backend = HttpChatBackend::new(base_url).unwrap();
    let state = AppState::new(Arc::new(backend), ResponseOrdering::Arrival);
    TestServer::new(router(state)).unwrap()
}

/// Values the pending element would post to `/chat/reply`.
fn pending_vals(html: &str) -> Vec<(String, String)> {
    let start = html.find(r#"hx-vals=""#).unwrap() + r#"hx-vals=""#.len();
    let end = start + html[start..].find('"').unwrap();
    let json = html[start..end]
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    let Value::Object(vals) = serde_json::from_str::<Value>(&json).unwrap() else {
        panic!("hx-vals is not an object");
    };
    vals.into_iter()
        .map(|(k, v)| match v {
            Value::String(text) => (k, text),
            other => (k, other.to_string()),
        })
        .collect()
}

/// Both halves of a turn, the way HTMX drives them.
async fn run_turn(server: &TestServer, form: &[(&str, &str)]) -> (String, String) {
    let first = server.post("/chat").form(&form.to_vec()).await;
    first.assert_status_ok();
    let user_html = first.text();

    let reply = server.post("/chat/reply").form(&pending_vals(&user_html)).await;
    reply.assert_status_ok();
    assert_eq!(reply.header(SCROLL_HEADER), SCROLL_TRIGGER);
    (user_html, reply.text())
}

async fn assistant_html(server: &TestServer, message: &str) -> String {
    run_turn(server, &[("message", message)]).await.1
}

#[tokio::test]
async fn test_recommendations_turn() {
    let server = widget_server(&spawn_backend().await).await;

    let (user_html, html) = run_turn(&server, &[("message", "budget phones")]).await;

    assert!(user_html.starts_with(r#"<div class="user"><p>budget phones</p></div>"#));
    assert!(!user_html.contains("assistant"));
    assert!(html.starts_with(r#"<div class="assistant">"#));
    assert!(html.contains("<p>Top pick</p>"));
    assert_eq!(html.matches(r#"<div class="card">"#).count(), 1);
    assert!(html.contains("<h4>A</h4>"));
    assert!(html.contains(r#"<div class="price">$10</div>"#));
    assert!(html.contains("<li>p1</li>"));
    assert!(html.contains("<li>c1</li>"));
}

#[tokio::test]
async fn test_comparison_turn() {
    let server = widget_server(&spawn_backend().await).await;

    let html = assistant_html(&server, "compare").await;

    assert!(html.contains("<p>Side-by-side comparison:</p>"));
    assert!(html.contains(r#"<div class="specs">Camera: 50MP with OIS</div>"#));
    assert!(html.contains(r#"<div class="specs">Battery: 5000mAh, 33W</div>"#));
    assert!(html.contains(r#"<div class="specs">Display: AMOLED 6.7&quot;</div>"#));
    assert!(html.contains(r#"<div class="specs">SoC: Dimensity 7050</div>"#));
}

#[tokio::test]
async fn test_message_replies_are_escaped() {
    let server = widget_server(&spawn_backend().await).await;

    let html = assistant_html(&server, "what is ois").await;
    assert!(html.starts_with(
        r#"<div class="assistant"><p>OIS uses moving &lt;hardware&gt; &amp; sensors.</p></div>"#
    ));

    let html = assistant_html(&server, "nothing").await;
    assert!(html.starts_with(r#"<div class="assistant"><p>None found</p></div>"#));

    let html = assistant_html(&server, "jailbreak").await;
    assert!(html.starts_with(r#"<div class="assistant"><p>I cannot help with that.</p></div>"#));
}

#[tokio::test]
async fn test_unknown_type_and_typeless_error_body_use_fallback() {
    let server = widget_server(&spawn_backend().await).await;
    let expected = format!(r#"<div class="assistant"><p>{FALLBACK_MESSAGE}</p></div>"#);

    assert!(assistant_html(&server, "weather").await.starts_with(&expected));
    assert!(assistant_html(&server, "rejected").await.starts_with(&expected));
}

#[tokio::test]
async fn test_non_json_body_is_network_error() {
    let server = widget_server(&spawn_backend().await).await;
    let expected = format!(r#"<div class="assistant"><p>{NETWORK_ERROR_MESSAGE}</p></div>"#);

    assert!(assistant_html(&server, "anything else").await.starts_with(&expected));
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error_and_widget_recovers() {
    let server = widget_server(&dead_backend().await).await;
    let expected = format!(r#"<div class="assistant"><p>{NETWORK_ERROR_MESSAGE}</p></div>"#);

    assert!(assistant_html(&server, "hello").await.starts_with(&expected));
    assert!(assistant_html(&server, "hello again").await.starts_with(&expected));
}

#[tokio::test]
async fn test_blank_submit_returns_no_content() {
    let server = widget_server(&dead_backend().await).await;

    let response = server.post("/chat").form(&[("message", "   ")]).await;

    response.assert_status(StatusCode::NO_CONTENT);
    assert!(response.text().is_empty());
}

#[tokio::test]
async fn test_context_phone_reaches_backend() {
    let server = widget_server(&spawn_backend().await).await;

    let (_, html) = run_turn(
        &server,
        &[("message", "context"), ("context_phone_id", "pixel-8a")],
    )
    .await;

    assert!(html.starts_with(r#"<div class="assistant"><p>pixel-8a</p></div>"#));
}

#[tokio::test]
async fn test_widget_markup_and_health() {
    let server = widget_server(&dead_backend().await).await;

    let markup = server.get("/widget").add_query_param("widget", "w-1").await;
    markup.assert_status_ok();
    let html = markup.text();
    assert!(html.contains(r#"<div id="chat""#));
    assert!(html.contains(r#"hx-on:chat-scroll-bottom="#));
    assert!(html.contains(r#"<form id="chat-form" hx-post="/chat""#));
    assert!(html.contains(r#"<input id="message" name="message""#));
    assert!(html.contains(r#"name="widget" value="w-1""#));

    let health = server.get("/health").await;
    health.assert_status_ok();
    health.assert_json(&json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_client_against_live_backend() {
    let backend: Arc<dyn ChatBackend> = Arc::new(HttpChatBackend::new(spawn_backend().await).unwrap());
    let transcript = HtmlTranscript::new();
    let input = TextInput::new("  nothing ");
    let client = ChatClient::new(backend, Arc::new(transcript.clone()), Arc::new(input.clone()));

    assert_eq!(client.handle_submit().await, SubmitOutcome::Rendered);

    assert_eq!(input.value(), "");
    assert_eq!(
        transcript.to_html(),
        r#"<div class="user"><p>nothing</p></div><div class="assistant"><p>None found</p></div>"#
    );
    assert_eq!(transcript.scroll_requests(), 1);
}
