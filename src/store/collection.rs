use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::document::Document;

/// A name-scoped set of documents guarded by a single reader/writer lock.
///
/// Reads run in parallel; any mutation excludes every other operation on
/// the same collection. Collections are independent of each other: there
/// is no cross-collection locking, so multi-collection sequences are not
/// transactional.
pub struct Collection {
    name: String,
    data: RwLock<HashMap<String, Document>>,
}

impl Collection {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            data: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert a document. The key is taken from the document's `id` field
    /// when present, otherwise a fresh one is assigned and written back
    /// into the stored copy. Fails if the key is already taken.
    pub async fn insert(&self, mut doc: Document) -> Result<String, StoreError> {
        let id = match doc.get("id").and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                doc.insert("id".to_string(), id.clone().into());
                id
            }
        };

        let mut data = self.data.write().await;
        if data.contains_key(&id) {
            return Err(StoreError::DuplicateKey);
        }
        data.insert(id.clone(), doc);
        Ok(id)
    }

    /// Return clones of every document matching the predicate. The result
    /// reflects a single snapshot of the collection; iteration order is
    /// unspecified.
    pub async fn find<P>(&self, pred: P) -> Vec<Document>
    where
        P: Fn(&Document) -> bool,
    {
        let data = self.data.read().await;
        data.values().filter(|d| pred(d)).cloned().collect()
    }

    /// Return a clone of the first document matching the predicate, if any.
    pub async fn find_one<P>(&self, pred: P) -> Option<Document>
    where
        P: Fn(&Document) -> bool,
    {
        let data = self.data.read().await;
        data.values().find(|d| pred(d)).cloned()
    }

    /// Remove every matching document, returning how many were removed.
    pub async fn delete<P>(&self, pred: P) -> usize
    where
        P: Fn(&Document) -> bool,
    {
        let mut data = self.data.write().await;
        let keys: Vec<String> = data
            .iter()
            .filter(|(_, d)| pred(d))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &keys {
            data.remove(k);
        }
        keys.len()
    }

    /// Atomically find the first matching document and remove it, inside
    /// one critical section. No concurrent caller can observe or consume
    /// the same document.
    pub async fn consume_once<P>(&self, pred: P) -> Result<Document, StoreError>
    where
        P: Fn(&Document) -> bool,
    {
        let mut data = self.data.write().await;
        let key = data
            .iter()
            .find(|(_, d)| pred(d))
            .map(|(k, _)| k.clone());
        key.and_then(|k| data.remove(&k)).ok_or(StoreError::NotFound)
    }

    /// Atomically swap the first matching document for a replacement,
    /// under one lock acquisition. The predicate is evaluated inside the
    /// critical section, so a caller that read the document earlier and
    /// lost a race gets `NotFound` instead of a double-apply.
    ///
    /// The replacement is stored under its own `id` (assigned when
    /// missing). If that key is already taken by another document the
    /// matched document is left in place and `DuplicateKey` is returned.
    pub async fn replace<P>(&self, pred: P, mut doc: Document) -> Result<String, StoreError>
    where
        P: Fn(&Document) -> bool,
    {
        let new_id = match doc.get("id").and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                doc.insert("id".to_string(), id.clone().into());
                id
            }
        };

        let mut data = self.data.write().await;
        let old_key = data
            .iter()
            .find(|(_, d)| pred(d))
            .map(|(k, _)| k.clone());
        let old_key = old_key.ok_or(StoreError::NotFound)?;
        if new_id != old_key && data.contains_key(&new_id) {
            return Err(StoreError::DuplicateKey);
        }
        data.remove(&old_key);
        data.insert(new_id.clone(), doc);
        Ok(new_id)
    }

    /// Mutate every matching document in place, under the write lock.
    /// Returns how many documents were updated.
    pub async fn update<P, F>(&self, pred: P, mut apply: F) -> usize
    where
        P: Fn(&Document) -> bool,
        F: FnMut(&mut Document),
    {
        let mut data = self.data.write().await;
        let mut count = 0;
        for doc in data.values_mut() {
            if pred(doc) {
                apply(doc);
                count += 1;
            }
        }
        count
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}
