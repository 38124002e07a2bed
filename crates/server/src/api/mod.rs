pub mod groupings;
pub mod playlists;
pub mod server;

use axum::{
    body::Body,
    extract::State,
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::debug;

use crate::auth::extract_token;
use crate::state::{AppState, HealthResponse};
use crate::utils::json_error_response;

pub fn api_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/server/info", get(server::get_info))
        .route("/playlists", get(playlists::list_playlists))
        .route(
            "/groupings/:playlist_id",
            get(groupings::get_grouping).delete(groupings::reset_grouping),
        )
        .route(
            "/groupings/:playlist_id/assign-track",
            post(groupings::assign_track),
        )
        .route(
            "/groupings/:playlist_id/assign-artist",
            post(groupings::assign_artist),
        )
        .route("/groupings/:playlist_id/combine", post(groupings::combine))
        .route("/groupings/:playlist_id/export", post(groupings::export))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

async fn require_auth(
    State(state): State<AppState>,
    req: axum::http::Request<Body>,
    next: Next,
) -> Response {
    if !state.auth.is_configured() {
        return json_error_response(StatusCode::SERVICE_UNAVAILABLE, "server not initialized");
    }
    let token = match extract_token(req.headers()) {
        Some(token) => token,
        None => return json_error_response(StatusCode::UNAUTHORIZED, "unauthorized"),
    };
    if !state.auth.verify(&token) {
        debug!("Rejected request to {} with unknown token", req.uri().path());
        return json_error_response(StatusCode::UNAUTHORIZED, "unauthorized");
    }
    next.run(req).await
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}
