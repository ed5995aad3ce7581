//! Router configuration for the digest daemon.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;

use super::state::{SharedDigest, PLACEHOLDER_BODY};

/// Create the daemon router.
///
/// `/` serves the latest digest; every other path is a 404.
pub fn create_router(state: SharedDigest) -> Router {
    Router::new()
        .route("/", get(serve_digest))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn serve_digest(State(state): State<SharedDigest>) -> Response {
    match state.latest().await {
        Some(body) => ([(header::CONTENT_TYPE, state.mode().content_type())], body).into_response(),
        None => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            PLACEHOLDER_BODY,
        )
            .into_response(),
    }
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
