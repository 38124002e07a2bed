use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::Json;
use common::Snapshot;
use grouping::StoredGrouping;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::auth::ApiTokens;
use crate::config::ServerConfig;
use crate::sync::GroupingService;

#[derive(Clone)]
pub struct AppState {
    pub config_path: PathBuf,
    pub config: Arc<RwLock<ServerConfig>>,
    pub auth: ApiTokens,
    pub sync: GroupingService,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ServerInfoResponse {
    pub http_port: u16,
    pub config_path: String,
    pub catalog: &'static str,
    pub cached_groupings: usize,
    pub storage_open: bool,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct GroupingResponse {
    pub playlist_id: String,
    pub revision: u64,
    pub digest: String,
    pub genre_groups: Snapshot,
}

impl GroupingResponse {
    pub fn from_stored(playlist_id: &str, grouping: &StoredGrouping) -> Self {
        Self {
            playlist_id: playlist_id.to_string(),
            revision: grouping.revision,
            digest: grouping.snapshot.digest(),
            genre_groups: grouping.snapshot.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct AssignArtistResponse {
    #[serde(flatten)]
    pub grouping: GroupingResponse,
    pub moved: usize,
}

#[derive(Serialize)]
pub struct CombineResponse {
    #[serde(flatten)]
    pub grouping: GroupingResponse,
    pub merged_genre: String,
}

#[derive(Serialize)]
pub struct ExportResponse {
    pub playlist_id: String,
    pub playlist_name: String,
    pub tracks: usize,
}

#[derive(Debug, Deserialize)]
pub struct AssignTrackRequest {
    pub track_uri: String,
    pub source_genre: String,
    pub target_genre: String,
    #[serde(default)]
    pub expected_revision: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct AssignArtistRequest {
    pub artist: String,
    pub source_genre: String,
    pub target_genre: String,
    #[serde(default)]
    pub expected_revision: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CombineRequest {
    pub genres: Vec<String>,
    #[serde(default)]
    pub expected_revision: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub genre: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub type JsonResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;
