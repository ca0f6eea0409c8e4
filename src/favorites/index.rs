use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use tokio::sync::watch;

use crate::models::{FavoriteRecord, MovieKey};

/// One complete snapshot of a user's favorites
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FavoriteSet {
    records: Vec<FavoriteRecord>,
}

impl FavoriteSet {
    pub fn new(records: Vec<FavoriteRecord>) -> Self {
        Self { records }
    }

    pub fn contains(&self, key: &MovieKey) -> bool {
        self.records.iter().any(|record| record.matches(key))
    }

    pub fn records(&self) -> &[FavoriteRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

struct IndexState {
    generation: u64,
    /// Toggled keys awaiting a snapshot, with the membership they expect
    pending: HashMap<MovieKey, bool>,
}

/// Read-side cache of the current identity's favorites
///
/// Readers load the whole set through an `ArcSwap`, so they see either the
/// previous or the next snapshot and never a mix. Each identity gets its own
/// generation; snapshots published under an older generation are dropped.
pub struct FavoriteIndex {
    snapshot: ArcSwap<FavoriteSet>,
    state: Mutex<IndexState>,
    version: watch::Sender<u64>,
}

impl Default for FavoriteIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl FavoriteIndex {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(FavoriteSet::default()),
            state: Mutex::new(IndexState {
                generation: 0,
                pending: HashMap::new(),
            }),
            version: watch::channel(0).0,
        }
    }

    fn state(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Empties the set and starts a new generation, returning it
    pub fn reset(&self) -> u64 {
        let generation = {
            let mut state = self.state();
            state.generation += 1;
            state.pending.clear();
            self.snapshot.store(Arc::new(FavoriteSet::default()));
            state.generation
        };
        self.bump_version();
        generation
    }

    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    /// Replaces the whole set; returns false when `generation` is stale
    pub fn publish(&self, generation: u64, records: Vec<FavoriteRecord>) -> bool {
        {
            let mut state = self.state();
            if state.generation != generation {
                return false;
            }
            let next = FavoriteSet::new(records);
            state
                .pending
                .retain(|key, expect_favorite| next.contains(key) != *expect_favorite);
            self.snapshot.store(Arc::new(next));
        }
        self.bump_version();
        true
    }

    pub fn is_favorite(&self, key: &MovieKey) -> bool {
        self.snapshot.load().contains(key)
    }

    pub fn list(&self) -> Vec<FavoriteRecord> {
        self.snapshot.load().records().to_vec()
    }

    pub fn snapshot(&self) -> Arc<FavoriteSet> {
        self.snapshot.load_full()
    }

    /// Records a toggle whose remote write succeeded but whose snapshot has
    /// not arrived yet. Ignored if the identity changed in the meantime.
    pub fn mark_pending(&self, generation: u64, key: MovieKey, expect_favorite: bool) {
        let mut state = self.state();
        if state.generation != generation {
            return;
        }
        if self.snapshot.load().contains(&key) == expect_favorite {
            state.pending.remove(&key);
        } else {
            state.pending.insert(key, expect_favorite);
        }
    }

    pub fn is_pending(&self, key: &MovieKey) -> bool {
        self.state().pending.contains_key(key)
    }

    /// Change notifications, one per reset or accepted snapshot
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}
