use std::sync::Arc;

use common::{Track, UNKNOWN_GENRE};
use grouping::{
    engine, Classifier, Edit, EditReport, GroupingError, PersistError, SnapshotPersistence,
    StoredGrouping,
};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogError, CatalogPlaylist};
use crate::group_store::GroupStore;
use crate::keyed_lock::KeyedLocks;
use crate::storage::StorageHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    NotFound(String),
    InvalidArgument(String),
    Conflict(String),
    UpstreamUnavailable(String),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::NotFound(message) => write!(f, "not found: {}", message),
            SyncError::InvalidArgument(message) => write!(f, "invalid argument: {}", message),
            SyncError::Conflict(message) => write!(f, "conflict: {}", message),
            SyncError::UpstreamUnavailable(message) => {
                write!(f, "upstream unavailable: {}", message)
            }
        }
    }
}

impl std::error::Error for SyncError {}

impl From<GroupingError> for SyncError {
    fn from(err: GroupingError) -> Self {
        match err {
            GroupingError::NotFound(message) => SyncError::NotFound(message),
            GroupingError::InvalidArgument(message) => SyncError::InvalidArgument(message),
            GroupingError::Conflict(message) => SyncError::Conflict(message),
            GroupingError::Snapshot(err) => SyncError::InvalidArgument(err.to_string()),
        }
    }
}

impl From<PersistError> for SyncError {
    fn from(err: PersistError) -> Self {
        SyncError::UpstreamUnavailable(format!("grouping storage: {}", err))
    }
}

impl From<CatalogError> for SyncError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(id) => SyncError::NotFound(format!("playlist {}", id)),
            other => SyncError::UpstreamUnavailable(format!("catalog: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EditOutcome {
    pub grouping: Arc<StoredGrouping>,
    pub report: EditReport,
}

#[derive(Clone, Debug)]
pub struct ExportOutcome {
    pub playlist: CatalogPlaylist,
    pub tracks: usize,
}

#[derive(Clone)]
pub struct GroupingService {
    store: GroupStore,
    locks: KeyedLocks,
    storage: StorageHandle,
    catalog: Arc<dyn Catalog>,
    classifier: Arc<dyn Classifier>,
}

impl GroupingService {
    pub fn new(
        storage: StorageHandle,
        catalog: Arc<dyn Catalog>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            store: GroupStore::new(),
            locks: KeyedLocks::new(),
            storage,
            catalog,
            classifier,
        }
    }

    pub fn cached_groupings(&self) -> usize {
        self.store.len()
    }

    pub fn storage_open(&self) -> bool {
        self.storage.is_open()
    }

    pub async fn list_playlists(&self) -> Result<Vec<CatalogPlaylist>, SyncError> {
        Ok(self.catalog.list_playlists().await?)
    }

    /// Returns the canonical grouping, classifying the playlist on first use.
    pub async fn fetch(&self, playlist_id: &str) -> Result<Arc<StoredGrouping>, SyncError> {
        if let Some(grouping) = self.store.get(playlist_id) {
            return Ok(grouping);
        }
        let storage = self.storage.get().await?;
        {
            let _guard = self.locks.acquire(playlist_id).await;
            if let Some(grouping) = self.load_current(storage.as_ref(), playlist_id)? {
                return Ok(grouping);
            }
        }

        // classification talks to the catalog, so it runs without the lock
        let tracks = self.catalog.playlist_tracks(playlist_id).await?;
        let snapshot = self.classifier.classify(&tracks).map_err(|err| {
            warn!("Classifier failed for {}: {}", playlist_id, err);
            SyncError::UpstreamUnavailable(format!("classifier: {}", err))
        })?;

        let _guard = self.locks.acquire(playlist_id).await;
        if let Some(grouping) = self.load_current(storage.as_ref(), playlist_id)? {
            debug!("Discarding duplicate classification of {}", playlist_id);
            return Ok(grouping);
        }
        let grouping = StoredGrouping::initial(snapshot);
        storage.save(playlist_id, &grouping)?;
        let published = self.store.replace(playlist_id, grouping);
        info!(
            "Classified playlist {}: {} tracks in {} genres ({} unknown)",
            playlist_id,
            published.snapshot.track_count(),
            published.snapshot.bucket_count(),
            published
                .snapshot
                .get(UNKNOWN_GENRE)
                .map(|bucket| bucket.len())
                .unwrap_or(0)
        );
        Ok(published)
    }

    /// Applies one edit atomically. `expected_revision`, when given, must
    /// match the current revision.
    ///
    /// The edit runs on its own task: a caller that goes away does not
    /// cancel it, the result is still published.
    pub async fn edit(
        &self,
        playlist_id: &str,
        edit: Edit,
        expected_revision: Option<u64>,
    ) -> Result<EditOutcome, SyncError> {
        let service = self.clone();
        let playlist_id = playlist_id.to_string();
        tokio::spawn(async move {
            service
                .apply_edit(&playlist_id, edit, expected_revision)
                .await
        })
        .await
        .map_err(|err| SyncError::UpstreamUnavailable(format!("edit task failed: {}", err)))?
    }

    async fn apply_edit(
        &self,
        playlist_id: &str,
        edit: Edit,
        expected_revision: Option<u64>,
    ) -> Result<EditOutcome, SyncError> {
        let storage = self.storage.get().await?;
        let _guard = self.locks.acquire(playlist_id).await;
        let current = self
            .load_current(storage.as_ref(), playlist_id)?
            .ok_or_else(|| SyncError::NotFound(format!("grouping for playlist {}", playlist_id)))?;
        if let Some(expected) = expected_revision {
            if expected != current.revision {
                return Err(SyncError::Conflict(format!(
                    "grouping is at revision {}, not {}",
                    current.revision, expected
                )));
            }
        }

        let (snapshot, report) = engine::apply(&current.snapshot, &edit)?;
        if snapshot == current.snapshot {
            debug!("{} on {} changed nothing", edit.label(), playlist_id);
            return Ok(EditOutcome {
                grouping: current,
                report,
            });
        }
        let next = current.next(snapshot);
        storage.save(playlist_id, &next)?;
        let published = self.store.replace(playlist_id, next);
        info!(
            "Applied {} to {} (revision {})",
            edit.label(),
            playlist_id,
            published.revision
        );
        Ok(EditOutcome {
            grouping: published,
            report,
        })
    }

    /// Drops the canonical grouping; the next fetch classifies again.
    pub async fn reset(&self, playlist_id: &str) -> Result<bool, SyncError> {
        let storage = self.storage.get().await?;
        let _guard = self.locks.acquire(playlist_id).await;
        let persisted = storage.remove(playlist_id)?;
        let cached = self.store.remove(playlist_id);
        if persisted || cached {
            info!("Reset grouping for {}", playlist_id);
        }
        Ok(persisted || cached)
    }

    /// Writes one bucket to the catalog as a new playlist.
    pub async fn export(
        &self,
        playlist_id: &str,
        genre: &str,
        name: Option<&str>,
    ) -> Result<ExportOutcome, SyncError> {
        let grouping = match self.store.get(playlist_id) {
            Some(grouping) => grouping,
            None => {
                let storage = self.storage.get().await?;
                let _guard = self.locks.acquire(playlist_id).await;
                self.load_current(storage.as_ref(), playlist_id)?
                    .ok_or_else(|| {
                        SyncError::NotFound(format!("grouping for playlist {}", playlist_id))
                    })?
            }
        };
        let bucket = grouping
            .snapshot
            .get(genre)
            .ok_or_else(|| SyncError::NotFound(format!("genre {}", genre)))?;
        if bucket.is_empty() {
            return Err(SyncError::InvalidArgument(format!("genre {} has no tracks", genre)));
        }
        let name = name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(genre);
        let tracks: Vec<Track> = bucket.tracks().to_vec();
        let playlist = self.catalog.create_playlist(name, &tracks).await?;
        info!(
            "Exported genre {} of {} as playlist {}",
            genre, playlist_id, playlist.id
        );
        Ok(ExportOutcome {
            playlist,
            tracks: tracks.len(),
        })
    }

    // Caller holds the playlist lock.
    fn load_current(
        &self,
        storage: &dyn SnapshotPersistence,
        playlist_id: &str,
    ) -> Result<Option<Arc<StoredGrouping>>, SyncError> {
        if let Some(grouping) = self.store.get(playlist_id) {
            return Ok(Some(grouping));
        }
        match storage.load(playlist_id)? {
            Some(grouping) => {
                debug!(
                    "Loaded grouping for {} at revision {}",
                    playlist_id, grouping.revision
                );
                Ok(Some(self.store.replace(playlist_id, grouping)))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{LocalCatalog, LocalPlaylist};
    use async_trait::async_trait;
    use common::{CatalogTrack, Snapshot};
    use grouping::{MemoryPersistence, TagClassifier};
    use reqwest::StatusCode;

    struct DownCatalog;

    #[async_trait]
    impl Catalog for DownCatalog {
        async fn list_playlists(&self) -> Result<Vec<CatalogPlaylist>, CatalogError> {
            Err(CatalogError::Status(StatusCode::BAD_GATEWAY))
        }

        async fn playlist_tracks(
            &self,
            _playlist_id: &str,
        ) -> Result<Vec<CatalogTrack>, CatalogError> {
            Err(CatalogError::Status(StatusCode::BAD_GATEWAY))
        }

        async fn create_playlist(
            &self,
            _name: &str,
            _tracks: &[Track],
        ) -> Result<CatalogPlaylist, CatalogError> {
            Err(CatalogError::Io(std::io::Error::other("connection reset")))
        }
    }

    struct BrokenClassifier;

    impl Classifier for BrokenClassifier {
        fn classify(&self, _tracks: &[CatalogTrack]) -> Result<Snapshot, GroupingError> {
            Err(GroupingError::InvalidArgument("model unavailable".to_string()))
        }
    }

    fn catalog_track(uri: &str, artist: &str, genre: Option<&str>) -> CatalogTrack {
        CatalogTrack {
            uri: uri.to_string(),
            name: format!("Song {}", uri),
            artist: artist.to_string(),
            image_url: None,
            genres: genre.map(|g| vec![g.to_string()]).unwrap_or_default(),
        }
    }

    fn service_with(persistence: MemoryPersistence) -> GroupingService {
        let catalog = LocalCatalog::new(vec![LocalPlaylist {
            id: "p1".to_string(),
            name: "Mix".to_string(),
            image_url: None,
            tracks: vec![
                catalog_track("A", "x", Some("rock")),
                catalog_track("B", "y", Some("rock")),
                catalog_track("C", "z", Some("pop")),
                catalog_track("D", "w", None),
            ],
        }]);
        GroupingService::new(
            StorageHandle::ready(Arc::new(persistence)),
            Arc::new(catalog),
            Arc::new(TagClassifier::new()),
        )
    }

    fn assign(uri: &str, from: &str, to: &str) -> Edit {
        Edit::AssignTrack {
            track_uri: uri.to_string(),
            source_genre: from.to_string(),
            target_genre: to.to_string(),
        }
    }

    #[tokio::test]
    async fn fetch_classifies_once_and_persists() {
        let persistence = MemoryPersistence::new();
        let service = service_with(persistence.clone());
        let first = service.fetch("p1").await.unwrap();
        let second = service.fetch("p1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.revision, 1);
        assert_eq!(first.snapshot.get(UNKNOWN_GENRE).unwrap().len(), 1);
        assert_eq!(persistence.load("p1").unwrap().unwrap(), *first);
    }

    #[tokio::test]
    async fn fetch_unknown_playlist_is_not_found() {
        let service = service_with(MemoryPersistence::new());
        let err = service.fetch("missing").await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn catalog_failure_is_upstream_unavailable() {
        let persistence = MemoryPersistence::new();
        let service = GroupingService::new(
            StorageHandle::ready(Arc::new(persistence.clone())),
            Arc::new(DownCatalog),
            Arc::new(TagClassifier::new()),
        );

        let err = service.fetch("p1").await.unwrap_err();
        assert!(matches!(err, SyncError::UpstreamUnavailable(_)));
        let err = service.list_playlists().await.unwrap_err();
        assert!(matches!(err, SyncError::UpstreamUnavailable(_)));
        assert_eq!(service.cached_groupings(), 0);
        assert!(persistence.is_empty());
    }

    #[tokio::test]
    async fn classifier_failure_publishes_nothing() {
        let persistence = MemoryPersistence::new();
        let reference = service_with(MemoryPersistence::new());
        let service = GroupingService::new(
            StorageHandle::ready(Arc::new(persistence.clone())),
            Arc::clone(&reference.catalog),
            Arc::new(BrokenClassifier),
        );

        let err = service.fetch("p1").await.unwrap_err();
        assert!(matches!(err, SyncError::UpstreamUnavailable(_)));
        assert_eq!(service.cached_groupings(), 0);
        assert!(persistence.is_empty());
    }

    #[tokio::test]
    async fn export_failure_keeps_grouping() {
        let persistence = MemoryPersistence::new();
        service_with(persistence.clone()).fetch("p1").await.unwrap();

        let service = GroupingService::new(
            StorageHandle::ready(Arc::new(persistence.clone())),
            Arc::new(DownCatalog),
            Arc::new(TagClassifier::new()),
        );
        let err = service.export("p1", "rock", None).await.unwrap_err();
        assert!(matches!(err, SyncError::UpstreamUnavailable(_)));
        assert_eq!(persistence.load("p1").unwrap().unwrap().revision, 1);
    }

    #[tokio::test]
    async fn edit_publishes_and_persists() {
        let persistence = MemoryPersistence::new();
        let service = service_with(persistence.clone());
        service.fetch("p1").await.unwrap();

        let outcome = service.edit("p1", assign("B", "rock", "pop"), Some(1)).await.unwrap();
        assert_eq!(outcome.grouping.revision, 2);
        let pop: Vec<&str> = outcome
            .grouping
            .snapshot
            .get("pop")
            .unwrap()
            .tracks()
            .iter()
            .map(|t| t.uri.as_str())
            .collect();
        assert_eq!(pop, vec!["C", "B"]);
        assert_eq!(persistence.load("p1").unwrap().unwrap().revision, 2);
    }

    #[tokio::test]
    async fn failed_edit_changes_nothing() {
        let persistence = MemoryPersistence::new();
        let service = service_with(persistence.clone());
        let before = service.fetch("p1").await.unwrap();

        let err = service.edit("p1", assign("A", "rock", "rock"), None).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
        let err = service.edit("p1", assign("A", "rock", "pop"), Some(7)).await.unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));

        let after = service.fetch("p1").await.unwrap();
        assert_eq!(after, before);
        assert_eq!(persistence.load("p1").unwrap().unwrap().revision, 1);
    }

    #[tokio::test]
    async fn edit_without_grouping_is_not_found() {
        let service = service_with(MemoryPersistence::new());
        let err = service.edit("p1", assign("A", "rock", "pop"), None).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn noop_edit_keeps_revision() {
        let service = service_with(MemoryPersistence::new());
        service.fetch("p1").await.unwrap();
        let outcome = service
            .edit(
                "p1",
                Edit::AssignByArtist {
                    artist: "nobody".to_string(),
                    source_genre: "rock".to_string(),
                    target_genre: "pop".to_string(),
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.report, EditReport::ArtistMoved(0));
        assert_eq!(outcome.grouping.revision, 1);
    }

    #[tokio::test]
    async fn abandoned_edit_still_publishes() {
        let service = service_with(MemoryPersistence::new());
        service.fetch("p1").await.unwrap();

        let held = service.locks.acquire("p1").await;
        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            service.edit("p1", assign("A", "rock", "pop"), None),
        )
        .await;
        assert!(abandoned.is_err());
        drop(held);

        let mut grouping = service.fetch("p1").await.unwrap();
        for _ in 0..100 {
            if grouping.revision == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            grouping = service.fetch("p1").await.unwrap();
        }
        assert_eq!(grouping.revision, 2);
        assert_eq!(grouping.snapshot.locate("A"), Some("pop"));
    }

    #[tokio::test]
    async fn restart_reloads_persisted_grouping() {
        let persistence = MemoryPersistence::new();
        let service = service_with(persistence.clone());
        service.fetch("p1").await.unwrap();
        service.edit("p1", assign("A", "rock", "pop"), None).await.unwrap();

        let restarted = service_with(persistence);
        let grouping = restarted.fetch("p1").await.unwrap();
        assert_eq!(grouping.revision, 2);
        assert_eq!(grouping.snapshot.locate("A"), Some("pop"));
    }

    #[tokio::test]
    async fn reset_then_fetch_reclassifies() {
        let persistence = MemoryPersistence::new();
        let service = service_with(persistence.clone());
        service.fetch("p1").await.unwrap();
        service.edit("p1", assign("A", "rock", "pop"), None).await.unwrap();

        assert!(service.reset("p1").await.unwrap());
        assert!(persistence.is_empty());
        assert!(!service.reset("p1").await.unwrap());

        let grouping = service.fetch("p1").await.unwrap();
        assert_eq!(grouping.revision, 1);
        assert_eq!(grouping.snapshot.locate("A"), Some("rock"));
    }

    #[tokio::test]
    async fn export_creates_catalog_playlist() {
        let service = service_with(MemoryPersistence::new());
        service.fetch("p1").await.unwrap();

        let outcome = service.export("p1", "rock", None).await.unwrap();
        assert_eq!(outcome.playlist.name, "rock");
        assert_eq!(outcome.tracks, 2);
        let playlists = service.list_playlists().await.unwrap();
        assert_eq!(playlists.len(), 2);

        let err = service.export("p1", "jazz", None).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));

        service.edit("p1", assign("C", "pop", "rock"), None).await.unwrap();
        let err = service.export("p1", "pop", Some("Empty")).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_edits_are_linearized() {
        let persistence = MemoryPersistence::new();
        let service = service_with(persistence.clone());
        service.fetch("p1").await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..32 {
            let service = service.clone();
            tasks.push(tokio::spawn(async move {
                let (uri, from, to) = if i % 2 == 0 {
                    ("A", "rock", "pop")
                } else {
                    ("A", "pop", "rock")
                };
                service.edit("p1", assign(uri, from, to), None).await.is_ok()
            }));
        }
        let mut applied = 0u64;
        for task in tasks {
            if task.await.unwrap() {
                applied += 1;
            }
        }

        let grouping = service.fetch("p1").await.unwrap();
        assert!(applied > 0);
        assert_eq!(grouping.revision, 1 + applied);
        assert_eq!(grouping.snapshot.track_count(), 4);
        grouping.snapshot.validate().unwrap();
        assert_eq!(persistence.load("p1").unwrap().unwrap(), *grouping);
    }
}
