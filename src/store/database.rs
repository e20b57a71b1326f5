use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::store::collection::Collection;

/// A named set of collections, created lazily on first access.
///
/// A given name resolves to exactly one `Collection` instance for the
/// lifetime of the database, so every component sharing a `Database`
/// handle sees the same data through the same lock.
pub struct Database {
    name: String,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl Database {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the collection registered under `name`, creating it if needed.
    pub async fn collection(&self, name: &str) -> Arc<Collection> {
        {
            let collections = self.collections.read().await;
            if let Some(c) = collections.get(name) {
                return c.clone();
            }
        }

        let mut collections = self.collections.write().await;
        // Re-check under the write lock: another task may have created it
        // between lock acquisitions.
        if let Some(c) = collections.get(name) {
            return c.clone();
        }
        debug!("creating collection '{}' in database '{}'", name, self.name);
        let c = Arc::new(Collection::new(name));
        collections.insert(name.to_string(), c.clone());
        c
    }

    pub async fn collection_names(&self) -> Vec<String> {
        self.collections.read().await.keys().cloned().collect()
    }
}
