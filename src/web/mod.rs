//! # Módulo Web — API HTTP + SSE
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Frontend (EventSource / fetch)                          │
//! ├─────────────────────────────────────────────────────────┤
//! │ Axum Router (este módulo)                               │
//! │  ├── GET  /health       → JSON {status, service}        │
//! │  ├── POST /ingest       → JSON {source_id, ...} (50MB)  │
//! │  ├── POST /answer       → SSE (answer)                  │
//! │  ├── POST /report       → SSE (plan → write → judge)    │
//! │  └── POST /flashcards   → SSE (flashcards + CSV)        │
//! ├─────────────────────────────────────────────────────────┤
//! │ CORS (tower_http) → frontend em localhost:3000           │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Submódulos
//!
//! | Módulo | Responsabilidade |
//! |--------|------------------|
//! | [`state`] | Estado compartilhado (`AppState`) |
//! | [`events`] | Eventos SSE e enquadramento dos frames |
//! | [`sse`] | Emissor: produtor assíncrono → corpo `text/event-stream` |
//! | [`error`] | Erros JSON `{detail}` |
//! | [`handlers`] | Handlers Axum para cada rota |

pub mod error;
pub mod events;
pub mod handlers;
pub mod sse;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowHeaders, CorsLayer};

use state::AppState;

/// PDFs chegam em base64 dentro do JSON.
const INGEST_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Origens do frontend de desenvolvimento.
const ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://127.0.0.1:3000"];

/// Cria o router Axum com todas as rotas da aplicação.
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = ALLOWED_ORIGINS
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/ingest",
            post(handlers::ingest).layer(DefaultBodyLimit::max(INGEST_BODY_LIMIT)),
        )
        // ── SSE ──────────────────────────────────────────────
        .route("/answer", post(handlers::answer))
        .route("/report", post(handlers::report))
        .route("/flashcards", post(handlers::flashcards))
        .layer(cors)
        .with_state(state)
}
