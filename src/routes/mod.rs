//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One listener serves three request kinds: WebSocket upgrades (accepted on
//! any URL via the fallback), the `POST /log` debug sink, and a plaintext
//! `ok` for everything else. CORS is wide open; the protocol has no
//! browser-credential surface to protect.

pub mod log;
pub mod ws;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/log", post(log::append_log))
        .fallback(ws::handle_any)
        .layer(DefaultBodyLimit::max(log::MAX_LOG_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}
