use std::path::PathBuf;
use std::sync::Arc;

use grouping::{PersistError, RedbPersistence, SnapshotPersistence};
use tokio::sync::OnceCell;
use tracing::{info, warn};

type Opener = dyn Fn() -> Result<Arc<dyn SnapshotPersistence>, PersistError> + Send + Sync;

/// Shared handle to grouping persistence. The backing store is opened on
/// first use; concurrent first callers wait on the same open, and a failed
/// open is retried by the next caller.
#[derive(Clone)]
pub struct StorageHandle {
    cell: Arc<OnceCell<Arc<dyn SnapshotPersistence>>>,
    opener: Arc<Opener>,
}

impl StorageHandle {
    pub fn redb(path: PathBuf) -> Self {
        Self::with_opener(move || {
            let store = RedbPersistence::open(&path)?;
            info!(
                "Opened grouping database at {:?} ({} stored groupings)",
                path,
                store.playlist_ids()?.len()
            );
            Ok(Arc::new(store) as Arc<dyn SnapshotPersistence>)
        })
    }

    pub fn with_opener<F>(opener: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn SnapshotPersistence>, PersistError> + Send + Sync + 'static,
    {
        Self {
            cell: Arc::new(OnceCell::new()),
            opener: Arc::new(opener),
        }
    }

    pub fn ready(store: Arc<dyn SnapshotPersistence>) -> Self {
        Self {
            cell: Arc::new(OnceCell::new_with(Some(Arc::clone(&store)))),
            opener: Arc::new(move || Ok(Arc::clone(&store))),
        }
    }

    pub async fn get(&self) -> Result<Arc<dyn SnapshotPersistence>, PersistError> {
        let store = self
            .cell
            .get_or_try_init(|| {
                let opener = Arc::clone(&self.opener);
                async move {
                    match tokio::task::spawn_blocking(move || opener()).await {
                        Ok(result) => result.map_err(|err| {
                            warn!("Failed to open grouping storage: {}", err);
                            err
                        }),
                        Err(err) => Err(PersistError::Io(std::io::Error::other(err.to_string()))),
                    }
                }
            })
            .await?;
        Ok(Arc::clone(store))
    }

    pub fn is_open(&self) -> bool {
        self.cell.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grouping::MemoryPersistence;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_opens_once() {
        let opens = Arc::new(AtomicUsize::new(0));
        let handle = {
            let opens = Arc::clone(&opens);
            StorageHandle::with_opener(move || {
                opens.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(50));
                Ok(Arc::new(MemoryPersistence::new()) as Arc<dyn SnapshotPersistence>)
            })
        };

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move { handle.get().await.map(|_| ()) }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert!(handle.is_open());
    }

    #[tokio::test]
    async fn failed_open_is_retried() {
        let opens = Arc::new(AtomicUsize::new(0));
        let handle = {
            let opens = Arc::clone(&opens);
            StorageHandle::with_opener(move || {
                if opens.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(PersistError::Io(std::io::Error::other("disk unavailable")))
                } else {
                    Ok(Arc::new(MemoryPersistence::new()) as Arc<dyn SnapshotPersistence>)
                }
            })
        };

        assert!(handle.get().await.is_err());
        assert!(!handle.is_open());
        handle.get().await.unwrap();
        handle.get().await.unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn redb_handle_opens_file() {
        let dir = tempfile::tempdir().unwrap();
        let handle = StorageHandle::redb(dir.path().join("groupings.redb"));
        let store = handle.get().await.unwrap();
        assert_eq!(store.load("p1").unwrap(), None);
    }
}
