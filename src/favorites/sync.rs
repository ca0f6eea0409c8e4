use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    auth::AuthProvider,
    favorites::FavoriteIndex,
    models::{FavoriteRecord, Identity},
    notify::Notifier,
    store::{Document, DocumentStore, SnapshotStream},
};

const SYNC_FAILED_NOTICE: &str =
    "Could not sync your favorites. Showing the last list we received.";

struct ActiveSubscription {
    uid: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ActiveSubscription {
    fn stop(self) {
        self.cancel.cancel();
        self.task.abort();
        tracing::debug!(uid = %self.uid, "Favorites subscription closed");
    }
}

/// Keeps at most one favorites subscription open, bound to the current identity
pub struct FavoriteSync {
    store: Arc<dyn DocumentStore>,
    index: Arc<FavoriteIndex>,
    notifier: Arc<dyn Notifier>,
    active: Mutex<Option<ActiveSubscription>>,
}

impl FavoriteSync {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<FavoriteIndex>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            index,
            notifier,
            active: Mutex::new(None),
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveSubscription>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn index(&self) -> &Arc<FavoriteIndex> {
        &self.index
    }

    /// Uid the open subscription belongs to
    pub fn active_uid(&self) -> Option<String> {
        self.active().as_ref().map(|a| a.uid.clone())
    }

    /// Follows an identity change
    ///
    /// Same uid: nothing happens. Otherwise the old subscription is closed and
    /// the index emptied before anything else, then a subscription for the new
    /// identity (if any) is opened. Must be called inside a Tokio runtime.
    pub fn switch_to(&self, identity: Option<&Identity>) {
        let mut active = self.active();
        self.switch_locked(&mut active, identity);
    }

    /// Follows whoever the auth provider reports as signed in right now
    ///
    /// The identity is read while the subscription lock is held, so a caller
    /// acting on an older announcement cannot reopen the subscription of a
    /// user who has since signed out.
    pub fn follow_current(&self, auth: &dyn AuthProvider) {
        let mut active = self.active();
        let identity = auth.current();
        self.switch_locked(&mut active, identity.as_ref());
    }

    fn switch_locked(&self, active: &mut Option<ActiveSubscription>, identity: Option<&Identity>) {
        let current = active.as_ref().map(|a| a.uid.as_str());
        if current == identity.map(|i| i.uid.as_str()) {
            return;
        }

        if let Some(previous) = active.take() {
            previous.stop();
        }
        let generation = self.index.reset();

        let Some(identity) = identity else {
            tracing::info!("Favorites cleared, no identity");
            return;
        };

        let collection = identity.favorites_collection();
        let snapshots = self.store.subscribe(&collection);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(follow(
            snapshots,
            self.index.clone(),
            self.notifier.clone(),
            generation,
            cancel.clone(),
            identity.uid.clone(),
        ));

        tracing::info!(
            uid = %identity.uid,
            collection = %collection,
            store = self.store.name(),
            "Favorites subscription opened"
        );
        *active = Some(ActiveSubscription {
            uid: identity.uid.clone(),
            cancel,
            task,
        });
    }

    pub fn stop(&self) {
        self.switch_to(None);
    }
}

impl Drop for FavoriteSync {
    fn drop(&mut self) {
        if let Some(active) = self.active().take() {
            active.stop();
        }
    }
}

async fn follow(
    mut snapshots: SnapshotStream,
    index: Arc<FavoriteIndex>,
    notifier: Arc<dyn Notifier>,
    generation: u64,
    cancel: CancellationToken,
    uid: String,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = snapshots.next() => next,
        };

        match next {
            Some(Ok(documents)) => {
                let count = documents.len();
                if !index.publish(generation, decode(&uid, documents)) {
                    tracing::debug!(uid = %uid, "Snapshot for a previous identity dropped");
                    break;
                }
                tracing::debug!(uid = %uid, count, "Favorites snapshot applied");
            }
            Some(Err(err)) => {
                tracing::error!(uid = %uid, error = %err, "Favorites subscription error");
                notifier.error(SYNC_FAILED_NOTICE);
            }
            None => {
                tracing::warn!(uid = %uid, "Favorites subscription ended");
                break;
            }
        }
    }
}

fn decode(uid: &str, documents: Vec<Document>) -> Vec<FavoriteRecord> {
    documents
        .iter()
        .filter_map(|doc| match FavoriteRecord::from_document(&doc.id, &doc.data) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(uid = %uid, doc_id = %doc.id, error = %err, "Skipping malformed favorite");
                None
            }
        })
        .collect()
}
