use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures_util::{stream, StreamExt};
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::{Document, DocumentStore, SnapshotStream};

type Published = Result<Vec<Document>, String>;

/// In-process document store with real-time snapshot delivery
///
/// Used for local runs without a managed backend and as the store behind
/// the test suite. Writes can be made to fail on demand to exercise the
/// error paths of its callers.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Value>>,
    watchers: HashMap<String, watch::Sender<Published>>,
    unavailable: bool,
    writes: usize,
}

impl Inner {
    fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable {
            return Err(AppError::Store("memory store is unavailable".to_string()));
        }
        Ok(())
    }

    fn publish(&self, collection: &str) {
        if let Some(tx) = self.watchers.get(collection) {
            tx.send_replace(Ok(self.snapshot(collection)));
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every read and write fail until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Delivers an error to every subscriber of `collection`
    pub fn fail_subscriptions(&self, collection: &str, message: &str) {
        if let Some(tx) = self.lock().watchers.get(collection) {
            tx.send_replace(Err(message.to_string()));
        }
    }

    /// Number of successful writes (set, delete, add) so far
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Current contents of a collection
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.lock().snapshot(collection)
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Document>> {
        let inner = self.lock();
        inner.check_available()?;
        Ok(inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> AppResult<()> {
        let mut inner = self.lock();
        inner.check_available()?;
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        inner.writes += 1;
        inner.publish(collection);
        tracing::debug!(collection = %collection, id = %id, "Document written");
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> AppResult<()> {
        let mut inner = self.lock();
        inner.check_available()?;
        if let Some(docs) = inner.collections.get_mut(collection) {
            docs.remove(id);
        }
        inner.writes += 1;
        inner.publish(collection);
        tracing::debug!(collection = %collection, id = %id, "Document deleted");
        Ok(())
    }

    async fn add(&self, collection: &str, data: Value) -> AppResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        self.set(collection, &id, data).await?;
        Ok(id)
    }

    async fn add_stamped(
        &self,
        collection: &str,
        data: Value,
        stamp_field: &str,
    ) -> AppResult<String> {
        let Value::Object(mut fields) = data else {
            return Err(AppError::InvalidInput(
                "documents must be JSON objects".to_string(),
            ));
        };
        fields.insert(
            stamp_field.to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        self.add(collection, Value::Object(fields)).await
    }

    fn subscribe(&self, collection: &str) -> SnapshotStream {
        // the first item is the collection itself, whatever was last published
        let (rx, current) = {
            let mut inner = self.lock();
            let current = inner.snapshot(collection);
            let rx = inner
                .watchers
                .entry(collection.to_string())
                .or_insert_with(|| watch::channel(Ok(current.clone())).0)
                .subscribe();
            (rx, current)
        };

        stream::unfold((rx, Some(current)), |(mut rx, first)| async move {
            if let Some(current) = first {
                return Some((Ok(current), (rx, None)));
            }
            if rx.changed().await.is_err() {
                return None;
            }
            let item = rx
                .borrow_and_update()
                .clone()
                .map_err(AppError::Store);
            Some((item, (rx, None)))
        })
        .boxed()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store
            .set("users/u1/favorites", "603", json!({"movieId": 603}))
            .await
            .unwrap();

        let doc = store.get("users/u1/favorites", "603").await.unwrap().unwrap();
        assert_eq!(doc.data["movieId"], 603);

        store.delete("users/u1/favorites", "603").await.unwrap();
        assert!(store.get("users/u1/favorites", "603").await.unwrap().is_none());
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_set_overwrites_whole_document() {
        let store = MemoryStore::new();
        store
            .set("c", "1", json!({"title": "Old", "extra": true}))
            .await
            .unwrap();
        store.set("c", "1", json!({"title": "New"})).await.unwrap();

        let doc = store.get("c", "1").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({"title": "New"}));
    }

    #[tokio::test]
    async fn test_unavailable_store_rejects_writes() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        let result = store.set("c", "1", json!({})).await;
        assert!(matches!(result, Err(AppError::Store(_))));
        assert_eq!(store.write_count(), 0);

        store.set_unavailable(false);
        tokio_test::assert_ok!(store.set("c", "1", json!({})).await);
    }

    #[tokio::test]
    async fn test_add_generates_keys() {
        let store = MemoryStore::new();
        let first = store.add("messages", json!({"message": "a"})).await.unwrap();
        let second = store.add("messages", json!({"message": "b"})).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.documents("messages").len(), 2);
    }

    #[tokio::test]
    async fn test_subscribe_yields_current_then_changes() {
        let store = MemoryStore::new();
        store.set("c", "1", json!({"n": 1})).await.unwrap();

        let mut snapshots = store.subscribe("c");
        let first = snapshots.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        store.set("c", "2", json!({"n": 2})).await.unwrap();
        let second = snapshots.next().await.unwrap().unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[1].id, "2");

        store.delete("c", "1").await.unwrap();
        let third = snapshots.next().await.unwrap().unwrap();
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].id, "2");
    }

    #[tokio::test]
    async fn test_subscription_errors_do_not_end_stream() {
        let store = MemoryStore::new();
        let mut snapshots = store.subscribe("c");
        assert!(snapshots.next().await.unwrap().unwrap().is_empty());

        store.fail_subscriptions("c", "permission denied");
        let err = snapshots.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("permission denied"));

        store.set("c", "1", json!({})).await.unwrap();
        assert_eq!(snapshots.next().await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_late_subscriber_starts_from_contents_after_failure() {
        let store = MemoryStore::new();
        store.set("c", "1", json!({"n": 1})).await.unwrap();
        let _early = store.subscribe("c");
        store.fail_subscriptions("c", "permission denied");

        let mut late = store.subscribe("c");
        let first = late.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, "1");
    }

    #[tokio::test]
    async fn test_add_stamped_sets_commit_time() {
        let store = MemoryStore::new();
        let before = Utc::now();
        let id = store
            .add_stamped("messages", json!({"message": "hi"}), "createdAt")
            .await
            .unwrap();

        let doc = store.get("messages", &id).await.unwrap().unwrap();
        let stamped: chrono::DateTime<Utc> =
            doc.data["createdAt"].as_str().unwrap().parse().unwrap();
        assert!(stamped >= before);
        assert_eq!(doc.data["message"], "hi");

        assert!(matches!(
            store.add_stamped("messages", json!("text"), "createdAt").await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = MemoryStore::new();
        let mut other = store.subscribe("users/u2/favorites");
        assert!(other.next().await.unwrap().unwrap().is_empty());

        store
            .set("users/u1/favorites", "603", json!({}))
            .await
            .unwrap();

        assert!(store.documents("users/u2/favorites").is_empty());
        let pending = tokio::time::timeout(std::time::Duration::from_millis(50), other.next()).await;
        assert!(pending.is_err(), "unrelated collection must not be notified");
    }
}
