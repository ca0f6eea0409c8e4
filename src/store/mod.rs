//! Remote document store abstraction
//!
//! Keyed hierarchical document storage: documents live in collections
//! addressed by slash-separated paths (`users/{uid}/favorites`). Besides
//! point reads and writes, a store can stream full snapshots of a collection
//! whenever its contents change.

use futures_util::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;

use crate::error::AppResult;

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

/// Append-only collection receiving support messages
pub const MESSAGES_COLLECTION: &str = "messages";

/// A stored document: its key within the collection and its JSON body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Stream of complete collection snapshots
///
/// The first item reflects the collection at subscription time; every later
/// item is the full document set after a change. Errors do not end the
/// stream; the store keeps trying to deliver snapshots after reporting one.
pub type SnapshotStream = BoxStream<'static, AppResult<Vec<Document>>>;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads one document
    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Document>>;

    /// Creates or fully overwrites one document
    async fn set(&self, collection: &str, id: &str, data: Value) -> AppResult<()>;

    /// Deletes one document; deleting a missing document is not an error
    async fn delete(&self, collection: &str, id: &str) -> AppResult<()>;

    /// Appends a document under a store-generated key and returns that key
    async fn add(&self, collection: &str, data: Value) -> AppResult<String>;

    /// Like `add`, with `stamp_field` set to the store's own clock at commit
    async fn add_stamped(&self, collection: &str, data: Value, stamp_field: &str)
        -> AppResult<String>;

    /// Opens a standing subscription to a collection
    fn subscribe(&self, collection: &str) -> SnapshotStream;

    /// Store name for logging
    fn name(&self) -> &'static str;
}
