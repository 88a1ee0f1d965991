//! HTML rendering for chat bubbles.
//!
//! Every renderer is a pure function of its payload and returns a
//! [`Bubble`]; appending it somewhere is the caller's job. Markup comes from
//! askama templates, so every interpolated field is HTML-escaped.

use askama::Template;
use tracing::error;

use crate::payload::{ChatMessage, ComparisonItem, Item, Role, ServerResponse};

/// Shown when the backend replies with a `type` the widget does not know.
pub const FALLBACK_MESSAGE: &str = "Sorry, I did not understand that.";

/// Shown when the backend cannot be reached or its reply cannot be decoded.
pub const NETWORK_ERROR_MESSAGE: &str = "Network error. Please try again.";

/// Lead-in paragraph of a comparison bubble.
pub const COMPARISON_HEADING: &str = "Side-by-side comparison:";

/// One rendered chat message block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    /// Author of the bubble.
    pub role: Role,
    /// Inner HTML, already escaped.
    pub inner_html: String,
}

impl Bubble {
    /// The bubble wrapped in its role `<div>`, ready to append to the transcript.
    pub fn to_html(&self) -> String {
        render_template(&BubbleTemplate {
            role_class: self.role.css_class(),
            inner_html: &self.inner_html,
        })
    }
}

#[derive(Template)]
#[template(source = r#"<div class="{{ role_class }}">{{ inner_html|safe }}</div>"#, ext = "html")]
struct BubbleTemplate<'a> {
    role_class: &'a str,
    inner_html: &'a str,
}

#[derive(Template)]
#[template(source = "<p>{{ text }}</p>", ext = "html")]
struct MessageTemplate<'a> {
    text: &'a str,
}

#[derive(Template)]
#[template(
    source = r#"<p>{{ rationale }}</p><div class="card-grid">
{%- for item in items -%}
<div class="card"><h4>{{ item.name }}</h4><div class="price">{{ item.price }}</div><div class="specs">{{ item.summary }}</div><div class="proscons"><div><strong>Pros</strong><ul>
{%- for pro in item.pros %}<li>{{ pro }}</li>{% endfor -%}
</ul></div><div><strong>Cons</strong><ul>
{%- for con in item.cons %}<li>{{ con }}</li>{% endfor -%}
</ul></div></div></div>
{%- endfor -%}
</div>"#,
    ext = "html"
)]
struct RecommendationsTemplate<'a> {
    rationale: &'a str,
    items: &'a [Item],
}

#[derive(Template)]
#[template(
    source = r#"<p>{{ heading }}</p><div class="card-grid">
{%- for item in items -%}
<div class="card"><h4>{{ item.name }}</h4><div class="price">{{ item.price }}</div><div class="specs">Camera: {{ item.camera }}</div><div class="specs">Battery: {{ item.battery }}</div><div class="specs">Display: {{ item.display }}</div><div class="specs">SoC: {{ item.soc }}</div><div class="proscons"><div><strong>Pros</strong><ul>
{%- for pro in item.pros %}<li>{{ pro }}</li>{% endfor -%}
</ul></div><div><strong>Cons</strong><ul>
{%- for con in item.cons %}<li>{{ con }}</li>{% endfor -%}
</ul></div></div></div>
{%- endfor -%}
</div>"#,
    ext = "html"
)]
struct ComparisonTemplate<'a> {
    heading: &'a str,
    items: &'a [ComparisonItem],
}

/// Render a message as a single escaped paragraph.
pub fn render_message(message: &ChatMessage) -> Bubble {
    Bubble {
        role: message.role,
        inner_html: render_template(&MessageTemplate {
            text: &message.text,
        }),
    }
}

pub fn render_user(text: &str) -> Bubble {
    render_message(&ChatMessage::user(text))
}

pub fn render_assistant_message(text: &str) -> Bubble {
    render_message(&ChatMessage::assistant(text))
}

pub fn render_recommendations(rationale: &str, items: &[Item]) -> Bubble {
    Bubble {
        role: Role::Assistant,
        inner_html: render_template(&RecommendationsTemplate { rationale, items }),
    }
}

pub fn render_comparison(items: &[ComparisonItem]) -> Bubble {
    Bubble {
        role: Role::Assistant,
        inner_html: render_template(&ComparisonTemplate {
            heading: COMPARISON_HEADING,
            items,
        }),
    }
}

pub fn render_explainer(message: &str) -> Bubble {
    render_assistant_message(message)
}

pub fn render_no_results(message: &str) -> Bubble {
    render_assistant_message(message)
}

pub fn render_refusal(message: &str) -> Bubble {
    render_assistant_message(message)
}

pub fn render_fallback() -> Bubble {
    render_assistant_message(FALLBACK_MESSAGE)
}

pub fn render_network_error() -> Bubble {
    render_assistant_message(NETWORK_ERROR_MESSAGE)
}

/// Map a reply to the renderer for its type.
pub fn dispatch(response: &ServerResponse) -> Bubble {
    match response {
        ServerResponse::Recommendations { rationale, items } => {
            render_recommendations(rationale, items)
        }
        ServerResponse::Comparison { items } => render_comparison(items),
        ServerResponse::Explainer { message } => render_explainer(message),
        ServerResponse::NoResults { message } => render_no_results(message),
        ServerResponse::Refusal { message } => render_refusal(message),
        ServerResponse::Unrecognized => render_fallback(),
    }
}

/// Render a template, logging and yielding empty markup on failure.
pub(crate) fn render_template<T: Template>(template: &T) -> String {
    template.render().unwrap_or_else(|err| {
        error!(error = %err, "Template rendering failed");
        String::new()
    })
}
