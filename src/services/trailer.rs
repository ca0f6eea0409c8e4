use crate::{
    error::{AppError, AppResult},
    models::Video,
    services::providers::CatalogProvider,
};

/// Looks up the first playable YouTube trailer or teaser for a movie
pub async fn find_trailer(provider: &dyn CatalogProvider, movie_id: i64) -> AppResult<Video> {
    let videos = provider.videos(movie_id).await?;
    let total = videos.len();

    match videos.into_iter().find(Video::is_trailer) {
        Some(video) => {
            tracing::debug!(movie_id, key = %video.key, provider = provider.name(), "Trailer found");
            Ok(video)
        }
        None => {
            tracing::info!(movie_id, videos = total, "No trailer among catalog videos");
            Err(AppError::NotFound(
                "Trailer not found for this movie".to_string(),
            ))
        }
    }
}
