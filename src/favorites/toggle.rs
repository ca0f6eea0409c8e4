use serde::Serialize;

use crate::{
    error::AppResult,
    favorites::FavoriteIndex,
    models::{Identity, LooseMovie},
    store::DocumentStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleOutcome {
    Added,
    Removed,
}

/// Adds or removes one favorite in the remote store
///
/// Membership is decided from the index; the index itself is only updated
/// by the next snapshot. The document path is built from `identity` as
/// passed in, so a sign-out racing the write cannot redirect it to another
/// user. On failure nothing local changes.
pub async fn toggle_favorite(
    store: &dyn DocumentStore,
    index: &FavoriteIndex,
    identity: &Identity,
    movie: LooseMovie,
) -> AppResult<ToggleOutcome> {
    let movie = movie.into_movie_ref()?;
    let key = movie.key();
    let collection = identity.favorites_collection();
    let generation = index.generation();

    let (outcome, result) = if index.is_favorite(&key) {
        (
            ToggleOutcome::Removed,
            store.delete(&collection, key.as_str()).await,
        )
    } else {
        let data = serde_json::to_value(&movie)?;
        (
            ToggleOutcome::Added,
            store.set(&collection, key.as_str(), data).await,
        )
    };

    if let Err(err) = result {
        tracing::error!(
            uid = %identity.uid,
            movie_id = %key,
            outcome = ?outcome,
            store = store.name(),
            error = %err,
            "Favorite toggle failed"
        );
        return Err(err);
    }

    index.mark_pending(generation, key.clone(), outcome == ToggleOutcome::Added);
    tracing::info!(uid = %identity.uid, movie_id = %key, outcome = ?outcome, "Favorite toggled");
    Ok(outcome)
}
