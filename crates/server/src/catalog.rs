use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{CatalogTrack, Track};
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPlaylist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub track_count: usize,
    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<String>,
}

/// Upstream music catalog: the source of playlist contents and the place
/// exported buckets are written to.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list_playlists(&self) -> Result<Vec<CatalogPlaylist>, CatalogError>;

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<CatalogTrack>, CatalogError>;

    async fn create_playlist(
        &self,
        name: &str,
        tracks: &[Track],
    ) -> Result<CatalogPlaylist, CatalogError>;
}

#[derive(Debug)]
pub enum CatalogError {
    NotFound(String),
    Http(reqwest::Error),
    Status(StatusCode),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::NotFound(id) => write!(f, "playlist not found: {}", id),
            CatalogError::Http(err) => write!(f, "catalog request failed: {}", err),
            CatalogError::Status(status) => write!(f, "catalog responded with http {}", status),
            CatalogError::Io(err) => write!(f, "io error: {}", err),
            CatalogError::Json(err) => write!(f, "json error: {}", err),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        CatalogError::Http(err)
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io(err)
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Json(err)
    }
}

#[derive(Deserialize)]
struct ItemsResponse<T> {
    items: Vec<T>,
}

#[derive(Serialize)]
struct CreatePlaylistBody<'a> {
    name: &'a str,
    track_uris: Vec<&'a str>,
}

/// REST catalog reached over HTTP.
pub struct HttpCatalog {
    client: Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpCatalog {
    pub fn new(client: Client, base_url: &str, token: Option<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: token.filter(|token| !token.trim().is_empty()),
            timeout,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.timeout(self.timeout);
        match &self.token {
            Some(token) => request.bearer_auth(token.trim()),
            None => request,
        }
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn list_playlists(&self) -> Result<Vec<CatalogPlaylist>, CatalogError> {
        let url = format!("{}/playlists", self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(CatalogError::Status(response.status()));
        }
        let body: ItemsResponse<CatalogPlaylist> = response.json().await?;
        Ok(body.items)
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<CatalogTrack>, CatalogError> {
        let url = format!(
            "{}/playlists/{}/tracks",
            self.base_url,
            url_escape(playlist_id)
        );
        let response = self.authorize(self.client.get(&url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(playlist_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(CatalogError::Status(response.status()));
        }
        let body: ItemsResponse<CatalogTrack> = response.json().await?;
        debug!("Catalog returned {} tracks for {}", body.items.len(), playlist_id);
        Ok(body.items)
    }

    async fn create_playlist(
        &self,
        name: &str,
        tracks: &[Track],
    ) -> Result<CatalogPlaylist, CatalogError> {
        let url = format!("{}/playlists", self.base_url);
        let body = CreatePlaylistBody {
            name,
            track_uris: tracks.iter().map(|track| track.uri.as_str()).collect(),
        };
        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CatalogError::Status(response.status()));
        }
        let playlist: CatalogPlaylist = response.json().await?;
        info!("Created catalog playlist {} ({})", playlist.name, playlist.id);
        Ok(playlist)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalPlaylist {
    pub id: String,
    pub name: String,
    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub tracks: Vec<CatalogTrack>,
}

impl LocalPlaylist {
    fn summary(&self) -> CatalogPlaylist {
        CatalogPlaylist {
            id: self.id.clone(),
            name: self.name.clone(),
            track_count: self.tracks.len(),
            image_url: self.image_url.clone(),
        }
    }
}

#[derive(Default, Deserialize)]
struct LocalCatalogFile {
    #[serde(default)]
    playlists: Vec<LocalPlaylist>,
}

/// Catalog served from a JSON file; exported playlists live in memory.
#[derive(Clone, Default)]
pub struct LocalCatalog {
    playlists: Arc<RwLock<Vec<LocalPlaylist>>>,
}

impl LocalCatalog {
    pub fn new(playlists: Vec<LocalPlaylist>) -> Self {
        Self {
            playlists: Arc::new(RwLock::new(playlists)),
        }
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            warn!("Catalog file {:?} not found; starting with no playlists", path);
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        let file: LocalCatalogFile = serde_json::from_str(&contents)?;
        info!("Loaded {} playlists from {:?}", file.playlists.len(), path);
        Ok(Self::new(file.playlists))
    }
}

#[async_trait]
impl Catalog for LocalCatalog {
    async fn list_playlists(&self) -> Result<Vec<CatalogPlaylist>, CatalogError> {
        Ok(self
            .playlists
            .read()
            .iter()
            .map(LocalPlaylist::summary)
            .collect())
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<CatalogTrack>, CatalogError> {
        self.playlists
            .read()
            .iter()
            .find(|playlist| playlist.id == playlist_id)
            .map(|playlist| playlist.tracks.clone())
            .ok_or_else(|| CatalogError::NotFound(playlist_id.to_string()))
    }

    async fn create_playlist(
        &self,
        name: &str,
        tracks: &[Track],
    ) -> Result<CatalogPlaylist, CatalogError> {
        let playlist = LocalPlaylist {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            image_url: None,
            tracks: tracks
                .iter()
                .map(|track| CatalogTrack {
                    uri: track.uri.clone(),
                    name: track.name.clone(),
                    artist: track.artist.clone(),
                    image_url: track.image_url.clone(),
                    genres: Vec::new(),
                })
                .collect(),
        };
        let summary = playlist.summary();
        self.playlists.write().push(playlist);
        Ok(summary)
    }
}

fn url_escape(input: &str) -> String {
    let mut out = String::new();
    for byte in input.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b':' => {
                out.push(*byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
