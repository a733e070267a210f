use crate::config::{WebSettings, WebTheme};
use crate::highlight::html_escape;
use crate::practice::PronunciationScore;
use crate::{Highlighted, Lesson, Segment, VocabularyEntry};
use askama::Template;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info};

type SharedState = Arc<AppState>;

#[derive(Clone)]
pub struct AppState {
    /// `None` when the lesson failed to load; pages then render an error.
    pub lesson: Option<Arc<Lesson>>,
    pub theme: WebTheme,
    pub base_url: String,
}

#[derive(Debug, Clone, Copy)]
struct Chrome {
    use_tailwind: bool,
    use_bootstrap: bool,
    body_class: &'static str,
    main_class: &'static str,
    card_class: &'static str,
    eyebrow_class: &'static str,
    headline_class: &'static str,
    lede_class: &'static str,
    nav_class: &'static str,
    tab_class: &'static str,
    panel_class: &'static str,
    highlight_class: &'static str,
    button_class: &'static str,
}

impl Chrome {
    fn new(theme: WebTheme) -> Self {
        match theme {
            WebTheme::Tailwind => Self {
                use_tailwind: true,
                use_bootstrap: false,
                body_class: "bg-slate-50 text-slate-900",
                main_class: "min-h-screen flex flex-col items-center justify-start py-10 px-4",
                card_class: "max-w-3xl w-full space-y-6",
                eyebrow_class: "uppercase tracking-wide text-sm text-slate-500",
                headline_class: "text-4xl font-extrabold tracking-tight",
                lede_class: "text-lg text-slate-600",
                nav_class: "flex flex-wrap gap-3 text-sm font-semibold",
                tab_class: "px-3 py-1 rounded-full bg-slate-200 hover:bg-slate-300 text-slate-700",
                panel_class: "bg-white shadow rounded p-4",
                highlight_class: "vocab-highlight underline decoration-dotted decoration-2 text-blue-700",
                button_class: "inline-flex items-center rounded-md bg-slate-900 px-4 py-2 text-white font-semibold shadow hover:bg-slate-800 transition-colors",
            },
            WebTheme::Bootstrap => Self {
                use_tailwind: false,
                use_bootstrap: true,
                body_class: "bg-light text-dark",
                main_class: "container py-5",
                card_class: "mx-auto col-lg-8",
                eyebrow_class: "text-uppercase text-muted mb-2",
                headline_class: "display-5 fw-bold",
                lede_class: "lead mb-4",
                nav_class: "nav nav-pills mb-3",
                tab_class: "nav-link",
                panel_class: "card card-body mb-3",
                highlight_class: "vocab-highlight link-primary",
                button_class: "btn btn-primary btn-lg px-4 py-2",
            },
        }
    }

    fn assets(&self) -> (&'static str, &'static str) {
        if self.use_bootstrap {
            (
                r#"<link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/css/bootstrap.min.css" rel="stylesheet" integrity="sha384-sRIl4kxILFvY47J16cr9ZwB07vP4J8+LH7qKQnuqkuIAvNWLzeN8tE5YBujZqJLB" crossorigin="anonymous">"#,
                r#"<script src="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/js/bootstrap.bundle.min.js" integrity="sha384-FKyoEForCGlyvwx9Hj09JcYn3nv7wiPVlz7YYwJrWVcXK/BmnVDxM+D2scQbITxI" crossorigin="anonymous"></script>"#,
            )
        } else {
            (
                r#"<script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>"#,
                "",
            )
        }
    }
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub theme: WebTheme,
    pub base_url: String,
    pub lesson_path: PathBuf,
}

impl WebConfig {
    pub fn new(lesson_path: PathBuf, settings: &WebSettings) -> Self {
        Self {
            addr: settings.addr,
            theme: settings.theme,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            lesson_path,
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

pub async fn serve(config: WebConfig) -> Result<(), WebError> {
    let lesson = match Lesson::load(&config.lesson_path) {
        Ok(lesson) => Some(Arc::new(lesson)),
        Err(err) => {
            error!(
                path = %config.lesson_path.display(),
                %err,
                "Error loading lesson; pages will not be rendered"
            );
            None
        }
    };
    let state = Arc::new(AppState {
        lesson,
        theme: config.theme,
        base_url: config.base_url.clone(),
    });
    let router = build_router(state);
    info!(
        %config.addr,
        theme = ?config.theme,
        base = %config.base_url,
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    fn lesson_unavailable() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "The lesson could not be loaded.".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(lesson_html))
        .route("/vocab", get(vocab_html))
        .route("/practice", get(practice_html))
        .route("/api/lesson", get(api_lesson))
        .route("/api/vocab", get(api_vocab))
        .route("/api/practice", get(api_practice))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": if state.lesson.is_some() { "ok" } else { "degraded" },
        "service": "lesson-gloss-web",
    }))
}

fn loaded_lesson(state: &AppState) -> Result<&Lesson, ApiError> {
    state.lesson.as_deref().ok_or_else(ApiError::lesson_unavailable)
}

fn html_error(theme: WebTheme, err: ApiError) -> Response {
    (err.status, Html(render_error_page(theme, err.message))).into_response()
}

fn render_page(theme: WebTheme, template: &impl Template) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => html_error(theme, ApiError::internal(err.to_string())),
    }
}

async fn lesson_html(State(state): State<SharedState>) -> Response {
    let lesson = match loaded_lesson(&state) {
        Ok(lesson) => lesson,
        Err(err) => return html_error(state.theme, err),
    };
    let chrome = Chrome::new(state.theme);
    let template = LessonTemplate {
        chrome,
        title: lesson.title().unwrap_or("Lesson"),
        text_html: highlighted_html(&lesson.highlighted(), chrome.highlight_class),
        has_translation: lesson.translation().is_some(),
        translation: lesson.translation().unwrap_or_default(),
        entries: lesson.vocabulary().entries(),
    };
    render_page(state.theme, &template)
}

async fn vocab_html(
    State(state): State<SharedState>,
    Query(params): Query<VocabParams>,
) -> Response {
    let entry = match loaded_lesson(&state).and_then(|lesson| entry_from_params(lesson, &params)) {
        Ok(entry) => entry,
        Err(err) => return html_error(state.theme, err),
    };
    let template = VocabTemplate {
        chrome: Chrome::new(state.theme),
        entry,
        canonical_url: absolute_vocab_url(&state.base_url, &entry.word),
    };
    render_page(state.theme, &template)
}

async fn practice_html(
    State(state): State<SharedState>,
    Query(params): Query<VocabParams>,
) -> Response {
    match loaded_lesson(&state).and_then(|lesson| entry_from_params(lesson, &params)) {
        Ok(entry) => {
            let score = PronunciationScore::random(&mut rand::thread_rng());
            info!(entry = entry.id, %score, "Scored practice attempt");
            Html(render_practice_page(state.theme, entry, score)).into_response()
        }
        Err(err) => html_error(state.theme, err),
    }
}

async fn api_lesson(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let lesson = loaded_lesson(&state)?;
    Ok(Json(LessonPayload::from_lesson(lesson)).into_response())
}

async fn api_vocab(
    State(state): State<SharedState>,
    Query(params): Query<VocabParams>,
) -> Result<Json<VocabularyEntry>, ApiError> {
    let lesson = loaded_lesson(&state)?;
    let entry = entry_from_params(lesson, &params)?;
    Ok(Json(entry.clone()))
}

async fn api_practice(
    State(state): State<SharedState>,
    Query(params): Query<VocabParams>,
) -> Result<Json<PracticePayload>, ApiError> {
    let lesson = loaded_lesson(&state)?;
    let entry = entry_from_params(lesson, &params)?;
    let score = PronunciationScore::random(&mut rand::thread_rng());
    Ok(Json(PracticePayload {
        entry_id: entry.id,
        word: entry.word.clone(),
        score: score.value(),
    }))
}

#[derive(Debug, Deserialize)]
struct VocabParams {
    // Kept textual so malformed ids resolve to "not found" like unknown ones.
    id: Option<String>,
    word: Option<String>,
}

#[derive(Debug, Serialize)]
struct LessonPayload<'a> {
    title: Option<&'a str>,
    text: &'a str,
    translation: Option<&'a str>,
    segments: Vec<Segment<'a>>,
}

impl<'a> LessonPayload<'a> {
    fn from_lesson(lesson: &'a Lesson) -> Self {
        Self {
            title: lesson.title(),
            text: lesson.text(),
            translation: lesson.translation(),
            segments: lesson.highlighted().segments().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PracticePayload {
    entry_id: u32,
    word: String,
    score: u8,
}

fn entry_from_params<'l>(
    lesson: &'l Lesson,
    params: &VocabParams,
) -> Result<&'l VocabularyEntry, ApiError> {
    if let Some(raw) = params.id.as_deref() {
        return lesson
            .vocabulary()
            .get_str(raw)
            .ok_or_else(|| ApiError::not_found(format!("No vocabulary entry with id {raw:?}")));
    }
    if let Some(word) = params
        .word
        .as_ref()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
    {
        return lesson
            .vocabulary()
            .by_word(word)
            .ok_or_else(|| ApiError::not_found(format!("No vocabulary entry for word {word:?}")));
    }
    Err(ApiError::bad_request(
        "Provide either `word` or `id` query parameters.",
    ))
}

/// Lesson text as HTML, each highlight linking to its entry page.
fn highlighted_html(highlighted: &Highlighted<'_>, highlight_class: &str) -> String {
    highlighted.render_html(|id, word| {
        format!(r#"<a class="{highlight_class}" data-id="{id}" href="/vocab?id={id}">{word}</a>"#)
    })
}

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

fn absolute_vocab_url(base_url: &str, word: &str) -> String {
    format!("{base_url}/vocab?word={}", encode_component(word))
}

fn render_practice_page(theme: WebTheme, entry: &VocabularyEntry, score: PronunciationScore) -> String {
    let chrome = Chrome::new(theme);
    let (css_tag, js_tag) = chrome.assets();
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Practice • {word}</title>
    {css_tag}
    {js_tag}
  </head>
  <body class="{body_class}">
    <main class="{main_class}">
      <div class="{card_class}">
        <p class="{eyebrow_class}">Pronunciation practice</p>
        <h1 class="{headline_class}">{word}</h1>
        <p class="{lede_class}">Score: <strong id="score-value">{score}</strong> / 100</p>
        <a href="/vocab?id={id}" class="{button_class}">Back to {word}</a>
      </div>
    </main>
  </body>
</html>"#,
        css_tag = css_tag,
        js_tag = js_tag,
        body_class = chrome.body_class,
        main_class = chrome.main_class,
        card_class = chrome.card_class,
        eyebrow_class = chrome.eyebrow_class,
        headline_class = chrome.headline_class,
        lede_class = chrome.lede_class,
        button_class = chrome.button_class,
        word = html_escape(&entry.word),
        id = entry.id,
        score = score,
    )
}

fn render_error_page(theme: WebTheme, message: impl Into<String>) -> String {
    let chrome = Chrome::new(theme);
    let (css_tag, js_tag) = chrome.assets();
    let message = html_escape(&message.into());
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Lesson • Error</title>
    {css_tag}
    {js_tag}
  </head>
  <body class="{body_class}">
    <main class="{main_class}">
      <div class="{card_class}">
        <h1 class="{headline_class}">Something went wrong</h1>
        <p class="{lede_class}">{message}</p>
        <a href="/" class="{button_class}">Back to lesson</a>
      </div>
    </main>
  </body>
</html>"#,
        css_tag = css_tag,
        js_tag = js_tag,
        body_class = chrome.body_class,
        main_class = chrome.main_class,
        card_class = chrome.card_class,
        headline_class = chrome.headline_class,
        lede_class = chrome.lede_class,
        button_class = chrome.button_class,
        message = message,
    )
}

#[derive(Template)]
#[template(
    source = r##"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{{ title }}</title>
    {% if chrome.use_tailwind %}
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
    {% endif %}
    {% if chrome.use_bootstrap %}
    <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/css/bootstrap.min.css" rel="stylesheet" integrity="sha384-sRIl4kxILFvY47J16cr9ZwB07vP4J8+LH7qKQnuqkuIAvNWLzeN8tE5YBujZqJLB" crossorigin="anonymous">
    <script src="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/js/bootstrap.bundle.min.js" integrity="sha384-FKyoEForCGlyvwx9Hj09JcYn3nv7wiPVlz7YYwJrWVcXK/BmnVDxM+D2scQbITxI" crossorigin="anonymous"></script>
    {% endif %}
  </head>
  <body class="{{ chrome.body_class }}">
    <main class="{{ chrome.main_class }}">
      <div class="{{ chrome.card_class }}">
        <div>
          <p class="{{ chrome.eyebrow_class }}">Lesson</p>
          <h1 id="app-title" class="{{ chrome.headline_class }}">{{ title }}</h1>
        </div>

        <nav class="{{ chrome.nav_class }}" aria-label="Lesson tabs">
          <a href="#text" class="{{ chrome.tab_class }}">Text</a>
          {% if has_translation %}
          <a href="#translation" class="{{ chrome.tab_class }}">Translation</a>
          {% endif %}
          <a href="#vocabulary" class="{{ chrome.tab_class }}">Vocabulary ({{ entries.len() }})</a>
        </nav>

        <section id="text" class="{{ chrome.panel_class }}">
          <div id="text-container" style="white-space: pre-wrap">{{ text_html|safe }}</div>
        </section>

        {% if has_translation %}
        <section id="translation" class="{{ chrome.panel_class }}">
          <div lang="ja" style="white-space: pre-wrap">{{ translation }}</div>
        </section>
        {% endif %}

        <section id="vocabulary">
          <div id="vocab-list">
            {% for entry in entries %}
            <a href="/vocab?id={{ entry.id }}" class="vocab-item block {{ chrome.panel_class }}">
              <div class="vocab-word font-semibold">{{ entry.word }}</div>
              <div class="vocab-def text-slate-600">{{ entry.definition }}</div>
            </a>
            {% endfor %}
          </div>
        </section>
      </div>
    </main>
  </body>
</html>"##,
    ext = "html"
)]
struct LessonTemplate<'a> {
    chrome: Chrome,
    title: &'a str,
    text_html: String,
    has_translation: bool,
    translation: &'a str,
    entries: &'a [VocabularyEntry],
}

#[derive(Template)]
#[template(
    source = r##"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{{ entry.word }}</title>
    {% if chrome.use_tailwind %}
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
    {% endif %}
    {% if chrome.use_bootstrap %}
    <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/css/bootstrap.min.css" rel="stylesheet" integrity="sha384-sRIl4kxILFvY47J16cr9ZwB07vP4J8+LH7qKQnuqkuIAvNWLzeN8tE5YBujZqJLB" crossorigin="anonymous">
    <script src="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/js/bootstrap.bundle.min.js" integrity="sha384-FKyoEForCGlyvwx9Hj09JcYn3nv7wiPVlz7YYwJrWVcXK/BmnVDxM+D2scQbITxI" crossorigin="anonymous"></script>
    {% endif %}
    <link rel="canonical" href="{{ canonical_url }}">
  </head>
  <body class="{{ chrome.body_class }}">
    <main class="{{ chrome.main_class }}">
      <div class="{{ chrome.card_class }}">
        <div>
          <p class="{{ chrome.eyebrow_class }}">Vocabulary #{{ entry.id }}</p>
          <h1 id="modal-word" class="{{ chrome.headline_class }}">{{ entry.word }}</h1>
          <p id="modal-definition" class="{{ chrome.lede_class }}">{{ entry.definition }}</p>
        </div>

        <section id="modal-examples">
          <h2 class="text-xl font-semibold mb-2">Examples</h2>
          {% if entry.examples.len() == 0 %}
          <p class="text-muted text-slate-500">No examples available.</p>
          {% else %}
          {% for example in entry.examples %}
          <div class="example-block {{ chrome.panel_class }}">
            <div class="example-en">{{ example.en }}</div>
            <div class="example-ja text-slate-500" lang="ja">{{ example.ja }}</div>
          </div>
          {% endfor %}
          {% endif %}
        </section>

        <nav class="{{ chrome.nav_class }}">
          <a href="/practice?id={{ entry.id }}" class="{{ chrome.button_class }}">Practice pronunciation</a>
          <a href="/#text" class="{{ chrome.tab_class }}">Back to lesson</a>
        </nav>
      </div>
    </main>
  </body>
</html>"##,
    ext = "html"
)]
struct VocabTemplate<'a> {
    chrome: Chrome,
    entry: &'a VocabularyEntry,
    canonical_url: String,
}
