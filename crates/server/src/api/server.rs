use axum::{extract::State, Json};

use crate::state::{AppState, ServerInfoResponse};

pub async fn get_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    let config = state.config.read();
    Json(ServerInfoResponse {
        http_port: config.port,
        config_path: state.config_path.display().to_string(),
        catalog: config.catalog.kind.as_str(),
        cached_groupings: state.sync.cached_groupings(),
        storage_open: state.sync.storage_open(),
    })
}
