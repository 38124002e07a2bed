pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod group_store;
pub mod keyed_lock;
pub mod state;
pub mod storage;
pub mod sync;
pub mod utils;

use axum::Router;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::api::api_router;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_router(state))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
}
