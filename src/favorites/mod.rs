//! Favorites synchronization
//!
//! The remote store is the source of truth. A standing subscription per
//! identity feeds complete snapshots into the [`FavoriteIndex`]; toggles
//! write to the store and wait for the next snapshot to see their effect.

pub mod index;
pub mod sync;
pub mod toggle;

pub use index::{FavoriteIndex, FavoriteSet};
pub use sync::FavoriteSync;
pub use toggle::{toggle_favorite, ToggleOutcome};
