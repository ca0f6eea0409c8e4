/// Movie catalog provider abstraction
///
/// The catalog is a third-party read-only source of movie metadata. Every
/// call needs a caller-supplied API key; providers fail with
/// `AppError::MissingApiKey` before touching the network when none is set.
use crate::{
    error::AppResult,
    models::{Genre, Movie, Page, Video},
};

pub mod tmdb;

pub use tmdb::TmdbProvider;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// One page of upcoming releases, in the provider's order
    async fn upcoming(&self, page: u32) -> AppResult<Page<Movie>>;

    /// Genre id to name mappings
    async fn genres(&self) -> AppResult<Vec<Genre>>;

    /// Videos attached to a movie
    ///
    /// Localized results are requested first; an empty localized list falls
    /// back to the provider's default language.
    async fn videos(&self, movie_id: i64) -> AppResult<Vec<Video>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
