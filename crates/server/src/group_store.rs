use std::collections::HashMap;
use std::sync::Arc;

use grouping::StoredGrouping;
use parking_lot::RwLock;

/// The live canonical grouping per playlist. Entries are swapped whole, so a
/// reader sees either the previous grouping or the next one.
#[derive(Clone, Default)]
pub struct GroupStore {
    inner: Arc<RwLock<HashMap<String, Arc<StoredGrouping>>>>,
}

impl GroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, playlist_id: &str) -> Option<Arc<StoredGrouping>> {
        self.inner.read().get(playlist_id).cloned()
    }

    pub fn replace(&self, playlist_id: &str, grouping: StoredGrouping) -> Arc<StoredGrouping> {
        let grouping = Arc::new(grouping);
        self.inner
            .write()
            .insert(playlist_id.to_string(), Arc::clone(&grouping));
        grouping
    }

    pub fn remove(&self, playlist_id: &str) -> bool {
        self.inner.write().remove(playlist_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
