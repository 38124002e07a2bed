use axum::{extract::State, Json};

use crate::catalog::CatalogPlaylist;
use crate::state::{AppState, JsonResult, ListResponse};
use crate::utils::sync_error;

pub async fn list_playlists(
    State(state): State<AppState>,
) -> JsonResult<ListResponse<CatalogPlaylist>> {
    let items = state.sync.list_playlists().await.map_err(sync_error)?;
    Ok(Json(ListResponse {
        total: items.len(),
        items,
    }))
}
