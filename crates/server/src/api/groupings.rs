use axum::{
    extract::{rejection::JsonRejection, Path as AxumPath, State},
    Json,
};
use grouping::{Edit, EditReport};

use crate::state::{
    AppState, AssignArtistRequest, AssignArtistResponse, AssignTrackRequest, CombineRequest,
    CombineResponse, ExportRequest, ExportResponse, GroupingResponse, HealthResponse, JsonResult,
};
use crate::utils::{json_body, sync_error};

pub async fn get_grouping(
    State(state): State<AppState>,
    AxumPath(playlist_id): AxumPath<String>,
) -> JsonResult<GroupingResponse> {
    let grouping = state.sync.fetch(&playlist_id).await.map_err(sync_error)?;
    Ok(Json(GroupingResponse::from_stored(&playlist_id, &grouping)))
}

pub async fn reset_grouping(
    State(state): State<AppState>,
    AxumPath(playlist_id): AxumPath<String>,
) -> JsonResult<HealthResponse> {
    state.sync.reset(&playlist_id).await.map_err(sync_error)?;
    Ok(Json(HealthResponse { status: "ok" }))
}

pub async fn assign_track(
    State(state): State<AppState>,
    AxumPath(playlist_id): AxumPath<String>,
    payload: Result<Json<AssignTrackRequest>, JsonRejection>,
) -> JsonResult<GroupingResponse> {
    let payload = json_body(payload)?;
    let edit = Edit::AssignTrack {
        track_uri: payload.track_uri,
        source_genre: payload.source_genre,
        target_genre: payload.target_genre,
    };
    let outcome = state
        .sync
        .edit(&playlist_id, edit, payload.expected_revision)
        .await
        .map_err(sync_error)?;
    Ok(Json(GroupingResponse::from_stored(
        &playlist_id,
        &outcome.grouping,
    )))
}

pub async fn assign_artist(
    State(state): State<AppState>,
    AxumPath(playlist_id): AxumPath<String>,
    payload: Result<Json<AssignArtistRequest>, JsonRejection>,
) -> JsonResult<AssignArtistResponse> {
    let payload = json_body(payload)?;
    let edit = Edit::AssignByArtist {
        artist: payload.artist,
        source_genre: payload.source_genre,
        target_genre: payload.target_genre,
    };
    let outcome = state
        .sync
        .edit(&playlist_id, edit, payload.expected_revision)
        .await
        .map_err(sync_error)?;
    let moved = match outcome.report {
        EditReport::ArtistMoved(moved) => moved,
        _ => 0,
    };
    Ok(Json(AssignArtistResponse {
        grouping: GroupingResponse::from_stored(&playlist_id, &outcome.grouping),
        moved,
    }))
}

pub async fn combine(
    State(state): State<AppState>,
    AxumPath(playlist_id): AxumPath<String>,
    payload: Result<Json<CombineRequest>, JsonRejection>,
) -> JsonResult<CombineResponse> {
    let payload = json_body(payload)?;
    let edit = Edit::Combine {
        genres: payload.genres,
    };
    let outcome = state
        .sync
        .edit(&playlist_id, edit, payload.expected_revision)
        .await
        .map_err(sync_error)?;
    let merged_genre = match outcome.report {
        EditReport::Combined(name) => name,
        _ => String::new(),
    };
    Ok(Json(CombineResponse {
        grouping: GroupingResponse::from_stored(&playlist_id, &outcome.grouping),
        merged_genre,
    }))
}

pub async fn export(
    State(state): State<AppState>,
    AxumPath(playlist_id): AxumPath<String>,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> JsonResult<ExportResponse> {
    let payload = json_body(payload)?;
    let outcome = state
        .sync
        .export(&playlist_id, &payload.genre, payload.name.as_deref())
        .await
        .map_err(sync_error)?;
    Ok(Json(ExportResponse {
        playlist_id: outcome.playlist.id,
        playlist_name: outcome.playlist.name,
        tracks: outcome.tracks,
    }))
}
