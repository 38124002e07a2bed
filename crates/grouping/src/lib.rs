pub mod classify;
pub mod engine;
pub mod persist;

pub use classify::{Classifier, TagClassifier};
pub use common::{CatalogTrack, GenreBucket, Snapshot, SnapshotError, Track, UNKNOWN_GENRE};
pub use engine::{
    apply, assign_by_artist, assign_track, combine_genres, merged_genre_name, Edit, EditReport,
};
pub use persist::{
    MemoryPersistence, PersistError, RedbPersistence, SnapshotPersistence, StoredGrouping,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupingError {
    NotFound(String),
    InvalidArgument(String),
    Conflict(String),
    Snapshot(SnapshotError),
}

impl std::fmt::Display for GroupingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupingError::NotFound(message) => write!(f, "not found: {}", message),
            GroupingError::InvalidArgument(message) => write!(f, "invalid argument: {}", message),
            GroupingError::Conflict(message) => write!(f, "conflict: {}", message),
            GroupingError::Snapshot(err) => write!(f, "invalid snapshot: {}", err),
        }
    }
}

impl std::error::Error for GroupingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GroupingError::Snapshot(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SnapshotError> for GroupingError {
    fn from(err: SnapshotError) -> Self {
        GroupingError::Snapshot(err)
    }
}
