use std::collections::HashMap;
use std::fs;
use std::path::Path;

use common::{Snapshot, SnapshotError};
use parking_lot::RwLock;
use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition,
    TableError, TransactionError,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

const GROUPINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("groupings");

/// The canonical grouping of one playlist together with its revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredGrouping {
    pub revision: u64,
    pub snapshot: Snapshot,
}

impl StoredGrouping {
    pub fn initial(snapshot: Snapshot) -> Self {
        Self {
            revision: 1,
            snapshot,
        }
    }

    pub fn next(&self, snapshot: Snapshot) -> Self {
        Self {
            revision: self.revision + 1,
            snapshot,
        }
    }
}

pub trait SnapshotPersistence: Send + Sync {
    fn load(&self, playlist_id: &str) -> Result<Option<StoredGrouping>, PersistError>;
    fn save(&self, playlist_id: &str, grouping: &StoredGrouping) -> Result<(), PersistError>;
    /// Returns whether a grouping was stored for `playlist_id`.
    fn remove(&self, playlist_id: &str) -> Result<bool, PersistError>;
}

#[derive(Clone, Default)]
pub struct MemoryPersistence {
    inner: std::sync::Arc<RwLock<HashMap<String, StoredGrouping>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl SnapshotPersistence for MemoryPersistence {
    fn load(&self, playlist_id: &str) -> Result<Option<StoredGrouping>, PersistError> {
        Ok(self.inner.read().get(playlist_id).cloned())
    }

    fn save(&self, playlist_id: &str, grouping: &StoredGrouping) -> Result<(), PersistError> {
        self.inner
            .write()
            .insert(playlist_id.to_string(), grouping.clone());
        Ok(())
    }

    fn remove(&self, playlist_id: &str) -> Result<bool, PersistError> {
        Ok(self.inner.write().remove(playlist_id).is_some())
    }
}

pub struct RedbPersistence {
    db: Database,
}

impl RedbPersistence {
    pub fn open(path: &Path) -> Result<Self, PersistError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let db = if path.exists() {
            Database::open(path)?
        } else {
            Database::create(path)?
        };
        let store = Self { db };
        store.init_tables()?;
        debug!("Opened grouping store at {:?}", path);
        Ok(store)
    }

    fn init_tables(&self) -> Result<(), PersistError> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(GROUPINGS_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn playlist_ids(&self) -> Result<Vec<String>, PersistError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(GROUPINGS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut ids = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            ids.push(entry.0.value().to_string());
        }
        Ok(ids)
    }
}

impl SnapshotPersistence for RedbPersistence {
    fn load(&self, playlist_id: &str) -> Result<Option<StoredGrouping>, PersistError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(GROUPINGS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let grouping: StoredGrouping = match table.get(playlist_id)? {
            Some(value) => decode_value(value.value())?,
            None => return Ok(None),
        };
        grouping.snapshot.validate()?;
        Ok(Some(grouping))
    }

    fn save(&self, playlist_id: &str, grouping: &StoredGrouping) -> Result<(), PersistError> {
        let bytes = encode_value(grouping)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(GROUPINGS_TABLE)?;
            table.insert(playlist_id, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove(&self, playlist_id: &str) -> Result<bool, PersistError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(GROUPINGS_TABLE)?;
            let removed = table.remove(playlist_id)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }
}

#[derive(Debug)]
pub enum PersistError {
    Io(std::io::Error),
    Database(DatabaseError),
    Table(TableError),
    Transaction(TransactionError),
    Storage(StorageError),
    Commit(CommitError),
    Bincode(Box<bincode::ErrorKind>),
    Corrupt(SnapshotError),
}

impl From<std::io::Error> for PersistError {
    fn from(err: std::io::Error) -> Self {
        PersistError::Io(err)
    }
}

impl From<DatabaseError> for PersistError {
    fn from(err: DatabaseError) -> Self {
        PersistError::Database(err)
    }
}

impl From<TableError> for PersistError {
    fn from(err: TableError) -> Self {
        PersistError::Table(err)
    }
}

impl From<TransactionError> for PersistError {
    fn from(err: TransactionError) -> Self {
        PersistError::Transaction(err)
    }
}

impl From<StorageError> for PersistError {
    fn from(err: StorageError) -> Self {
        PersistError::Storage(err)
    }
}

impl From<CommitError> for PersistError {
    fn from(err: CommitError) -> Self {
        PersistError::Commit(err)
    }
}

impl From<Box<bincode::ErrorKind>> for PersistError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        PersistError::Bincode(err)
    }
}

impl From<SnapshotError> for PersistError {
    fn from(err: SnapshotError) -> Self {
        PersistError::Corrupt(err)
    }
}

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistError::Io(err) => write!(f, "io error: {}", err),
            PersistError::Database(err) => write!(f, "redb database error: {}", err),
            PersistError::Table(err) => write!(f, "redb table error: {}", err),
            PersistError::Transaction(err) => write!(f, "redb transaction error: {}", err),
            PersistError::Storage(err) => write!(f, "redb storage error: {}", err),
            PersistError::Commit(err) => write!(f, "redb commit error: {}", err),
            PersistError::Bincode(err) => write!(f, "bincode error: {}", err),
            PersistError::Corrupt(err) => write!(f, "stored grouping is invalid: {}", err),
        }
    }
}

impl std::error::Error for PersistError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistError::Io(err) => Some(err),
            PersistError::Database(err) => Some(err),
            PersistError::Table(err) => Some(err),
            PersistError::Transaction(err) => Some(err),
            PersistError::Storage(err) => Some(err),
            PersistError::Commit(err) => Some(err),
            PersistError::Bincode(err) => Some(err),
            PersistError::Corrupt(err) => Some(err),
        }
    }
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, PersistError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, PersistError> {
    Ok(bincode::deserialize(bytes)?)
}
