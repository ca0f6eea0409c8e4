/// The Movie Database (TMDB) v3 API provider
///
/// Endpoints used:
/// 1. Upcoming: /movie/upcoming?page=N
/// 2. Genres: /genre/movie/list
/// 3. Videos: /movie/{id}/videos, localized first, then the fallback language
///
/// The API key comes from the settings store on every call, so a key saved at
/// runtime applies immediately. Responses are cached in Redis when a cache is
/// configured.
use std::sync::Arc;

use reqwest::{Client as HttpClient, StatusCode};
use serde::de::DeserializeOwned;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{Genre, GenreList, Movie, Page, Video, VideoList},
    services::providers::CatalogProvider,
    settings::SettingsStore,
};

const UPCOMING_CACHE_TTL: u64 = 3600; // 1 hour
const GENRES_CACHE_TTL: u64 = 86400; // 1 day
const VIDEOS_CACHE_TTL: u64 = 21600; // 6 hours

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_url: String,
    language: String,
    fallback_language: String,
    settings: Arc<SettingsStore>,
    cache: Option<Cache>,
}

impl TmdbProvider {
    pub fn new(
        settings: Arc<SettingsStore>,
        cache: Option<Cache>,
        api_url: String,
        language: String,
        fallback_language: String,
    ) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            language,
            fallback_language,
            settings,
            cache,
        }
    }

    fn api_key(&self) -> AppResult<String> {
        self.settings.api_key().ok_or(AppError::MissingApiKey)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        language: &str,
        extra: &[(&str, String)],
    ) -> AppResult<T> {
        let api_key = self.api_key()?;
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", api_key.as_str()), ("language", language)])
            .query(extra)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::UNAUTHORIZED => Err(AppError::ExternalApi(
                "TMDB rejected the configured API key".to_string(),
            )),
            StatusCode::NOT_FOUND => Err(AppError::NotFound(format!("TMDB resource {}", path))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::ExternalApi(format!(
                    "TMDB API returned status {}: {}",
                    status, body
                )))
            }
        }
    }

    async fn videos_in(&self, movie_id: i64, language: &str) -> AppResult<Vec<Video>> {
        let path = format!("/movie/{}/videos", movie_id);
        let fetch = async {
            let list: VideoList = self.fetch(&path, language, &[]).await?;
            Ok::<_, AppError>(list.results)
        };

        match &self.cache {
            Some(cache) => cached!(
                cache,
                CacheKey::Videos {
                    language: language.to_string(),
                    movie_id,
                },
                VIDEOS_CACHE_TTL,
                fetch
            ),
            None => fetch.await,
        }
    }
}

#[async_trait::async_trait]
impl CatalogProvider for TmdbProvider {
    async fn upcoming(&self, page: u32) -> AppResult<Page<Movie>> {
        self.api_key()?;
        let page = page.max(1);
        let fetch = async {
            let movies: Page<Movie> = self
                .fetch("/movie/upcoming", &self.language, &[("page", page.to_string())])
                .await?;
            tracing::info!(
                page,
                results = movies.results.len(),
                provider = "tmdb",
                "Upcoming movies fetched"
            );
            Ok::<_, AppError>(movies)
        };

        match &self.cache {
            Some(cache) => cached!(
                cache,
                CacheKey::Upcoming {
                    language: self.language.clone(),
                    page,
                },
                UPCOMING_CACHE_TTL,
                fetch
            ),
            None => fetch.await,
        }
    }

    async fn genres(&self) -> AppResult<Vec<Genre>> {
        self.api_key()?;
        let fetch = async {
            let list: GenreList = self.fetch("/genre/movie/list", &self.language, &[]).await?;
            Ok::<_, AppError>(list.genres)
        };

        match &self.cache {
            Some(cache) => cached!(
                cache,
                CacheKey::Genres {
                    language: self.language.clone(),
                },
                GENRES_CACHE_TTL,
                fetch
            ),
            None => fetch.await,
        }
    }

    async fn videos(&self, movie_id: i64) -> AppResult<Vec<Video>> {
        self.api_key()?;
        let localized = self.videos_in(movie_id, &self.language).await?;
        if !localized.is_empty() || self.language == self.fallback_language {
            return Ok(localized);
        }

        tracing::debug!(
            movie_id,
            language = %self.language,
            fallback = %self.fallback_language,
            "No localized videos, retrying in fallback language"
        );
        self.videos_in(movie_id, &self.fallback_language).await
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{StatusCode as HttpStatus, Uri},
        Json, Router,
    };
    use serde_json::{json, Value};

    async fn fake_tmdb(uri: Uri) -> (HttpStatus, Json<Value>) {
        let query = uri.query().unwrap_or_default();
        if !query.contains("api_key=good-key") {
            return (
                HttpStatus::UNAUTHORIZED,
                Json(json!({"status_code": 7, "status_message": "Invalid API key"})),
            );
        }

        match uri.path() {
            "/movie/upcoming" => (
                HttpStatus::OK,
                Json(json!({
                    "page": 2,
                    "results": [{"id": 27205, "title": "A Origem", "genre_ids": [28]}],
                    "total_pages": 3,
                    "total_results": 41
                })),
            ),
            "/genre/movie/list" => (
                HttpStatus::OK,
                Json(json!({"genres": [{"id": 28, "name": "Ação"}]})),
            ),
            "/movie/27205/videos" if query.contains("language=pt-BR") => {
                (HttpStatus::OK, Json(json!({"id": 27205, "results": []})))
            }
            "/movie/27205/videos" => (
                HttpStatus::OK,
                Json(json!({
                    "id": 27205,
                    "results": [{"key": "YoHD9XEInc0", "site": "YouTube", "type": "Trailer"}]
                })),
            ),
            _ => (
                HttpStatus::NOT_FOUND,
                Json(json!({"status_code": 34, "status_message": "Not found"})),
            ),
        }
    }

    async fn provider(api_key: Option<&str>) -> TmdbProvider {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().fallback(fake_tmdb))
                .await
                .unwrap()
        });

        TmdbProvider::new(
            Arc::new(SettingsStore::in_memory(api_key.map(str::to_string))),
            None,
            format!("http://{}", addr),
            "pt-BR".to_string(),
            "en-US".to_string(),
        )
    }

    #[tokio::test]
    async fn test_upcoming_page() {
        let tmdb = provider(Some("good-key")).await;
        let page = tmdb.upcoming(2).await.unwrap();
        assert_eq!(page.page, 2);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.results[0].title, "A Origem");
    }

    #[tokio::test]
    async fn test_genres() {
        let tmdb = provider(Some("good-key")).await;
        let genres = tmdb.genres().await.unwrap();
        assert_eq!(genres, vec![Genre { id: 28, name: "Ação".to_string() }]);
    }

    #[tokio::test]
    async fn test_videos_fall_back_to_default_language() {
        let tmdb = provider(Some("good-key")).await;
        let videos = tmdb.videos(27205).await.unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].key, "YoHD9XEInc0");
    }

    #[tokio::test]
    async fn test_missing_key_blocks_every_call() {
        let tmdb = provider(None).await;
        assert!(matches!(tmdb.upcoming(1).await, Err(AppError::MissingApiKey)));
        assert!(matches!(tmdb.genres().await, Err(AppError::MissingApiKey)));
        assert!(matches!(tmdb.videos(27205).await, Err(AppError::MissingApiKey)));
    }

    #[tokio::test]
    async fn test_rejected_key() {
        let tmdb = provider(Some("bad-key")).await;
        let result = tmdb.genres().await;
        assert!(matches!(result, Err(AppError::ExternalApi(msg)) if msg.contains("API key")));
    }

    #[tokio::test]
    async fn test_key_saved_at_runtime_applies() {
        let tmdb = provider(None).await;
        tmdb.settings.set_api_key("good-key").await.unwrap();
        assert!(tmdb.genres().await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_movie_is_not_found() {
        let tmdb = provider(Some("good-key")).await;
        let result = tmdb.videos(1).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
