use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

/// Notes captured by the demo app, newest last.
#[derive(Default)]
struct Notes {
    items: RwLock<Vec<Value>>,
}

type AppState = Arc<Notes>;

const STYLESHEET: &str = "body{font-family:system-ui;margin:2rem}.offline{color:#888}";
const APP_JS: &str = "document.documentElement.dataset.ready='1';";
// 1x1 transparent PNG
const LOGO_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

async fn jitter() {
    // Simulate origin latency (5-20ms)
    let delay = rand::thread_rng().gen_range(5..=20);
    tokio::time::sleep(Duration::from_millis(delay)).await;
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><title>{title}</title>\
         <link rel=\"stylesheet\" href=\"/static/css/design-system.css\">\
         <link rel=\"manifest\" href=\"/manifest.json\"></head>\
         <body>{body}<script src=\"/static/js/app.js\"></script></body></html>"
    ))
}

async fn home() -> Html<String> {
    jitter().await;
    page("Second Brain", "<h1>Second Brain</h1>")
}

async fn offline() -> Html<String> {
    page(
        "Offline",
        "<h1 class=\"offline\">You are offline</h1><p>Notes you capture now will sync later.</p>",
    )
}

async fn note_page(Path(id): Path<u64>) -> Html<String> {
    jitter().await;
    page(&format!("Note {id}"), &format!("<h1>Note {id}</h1>"))
}

async fn stylesheet() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css")], STYLESHEET)
}

async fn app_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], APP_JS)
}

async fn logo() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], LOGO_PNG)
}

async fn manifest() -> Json<Value> {
    Json(json!({
        "name": "Second Brain",
        "start_url": "/",
        "display": "standalone",
        "icons": [{ "src": "/static/icons/logo-192.png", "sizes": "192x192", "type": "image/png" }],
    }))
}

async fn list_notes(State(notes): State<AppState>) -> Json<Value> {
    jitter().await;
    Json(Value::Array(notes.items.read().await.clone()))
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

async fn search(State(notes): State<AppState>, Query(params): Query<SearchParams>) -> Json<Value> {
    jitter().await;
    let needle = params.q.to_lowercase();
    let hits: Vec<Value> = notes
        .items
        .read()
        .await
        .iter()
        .filter(|n| n.to_string().to_lowercase().contains(&needle))
        .cloned()
        .collect();
    Json(json!({ "query": params.q, "results": hits }))
}

async fn capture(State(notes): State<AppState>, Json(note): Json<Value>) -> impl IntoResponse {
    if !note.is_object() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "note must be a JSON object" })),
        );
    }
    let mut items = notes.items.write().await;
    items.push(note);
    tracing::info!(count = items.len(), "note captured");
    (StatusCode::CREATED, Json(json!({ "id": items.len() })))
}

async fn health() -> &'static str {
    "ok"
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/offline", get(offline))
        .route("/notes/{id}", get(note_page))
        .route("/static/css/design-system.css", get(stylesheet))
        .route("/static/js/app.js", get(app_js))
        .route("/static/icons/logo-192.png", get(logo))
        .route("/favicon.ico", get(logo))
        .route("/manifest.json", get(manifest))
        .route("/api/notes", get(list_notes))
        .route("/search", get(search))
        .route("/capture", post(capture))
        .route("/health", get(health))
        .with_state(state)
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = "0.0.0.0:3000";
    tracing::info!(addr, "demo origin starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(AppState::default())).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn call(state: &AppState, req: Request<Body>) -> (StatusCode, String) {
        let resp = app(Arc::clone(state)).oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn serves_every_core_asset() {
        let state = AppState::default();
        for path in [
            "/",
            "/static/css/design-system.css",
            "/static/js/app.js",
            "/manifest.json",
            "/offline",
            "/static/icons/logo-192.png",
        ] {
            let req = Request::builder().uri(path).body(Body::empty()).unwrap();
            let (status, _) = call(&state, req).await;
            assert_eq!(status, StatusCode::OK, "{path}");
        }
    }

    #[tokio::test]
    async fn captured_notes_are_searchable() {
        let state = AppState::default();
        let req = Request::builder()
            .method("POST")
            .uri("/capture")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"content":"Rust ownership notes"}"#))
            .unwrap();
        let (status, _) = call(&state, req).await;
        assert_eq!(status, StatusCode::CREATED);

        let req = Request::builder()
            .uri("/search?q=ownership")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&state, req).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["results"].as_array().unwrap().len(), 1);
    }
}
