use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    favorites::ToggleOutcome,
    models::{normalize_id, FavoriteRecord, Genre, Identity, LooseMovie, Movie, SupportRequest},
    notify::Notice,
    services::{find_trailer, genre_names, MovieFilter},
};

use super::AppState;

// Request/Response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub api_key_configured: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    pub page: Option<u32>,
    pub genre: Option<i64>,
    pub month: Option<String>,
}

/// A movie as rendered on a card of the upcoming list
#[derive(Debug, Serialize)]
pub struct MovieCard {
    #[serde(flatten)]
    pub movie: Movie,
    pub release_year: String,
    pub genres: Vec<String>,
    pub is_favorite: bool,
}

#[derive(Debug, Serialize)]
pub struct UpcomingResponse {
    pub page: u32,
    pub total_pages: u32,
    pub total_results: u32,
    pub results: Vec<MovieCard>,
}

#[derive(Debug, Serialize)]
pub struct TrailerResponse {
    pub movie_id: i64,
    pub key: String,
    pub name: Option<String>,
    pub embed_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteStatusResponse {
    pub movie_id: i64,
    pub is_favorite: bool,
    /// A toggle was accepted but its snapshot has not arrived yet
    pub pending: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponse {
    pub movie_id: i64,
    pub outcome: ToggleOutcome,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub identity: Option<Identity>,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PasswordResetRequest {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayNameRequest {
    pub display_name: String,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

pub async fn get_settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    Json(SettingsResponse {
        api_key_configured: state.settings.has_api_key(),
    })
}

pub async fn set_api_key(
    State(state): State<AppState>,
    Json(request): Json<ApiKeyRequest>,
) -> AppResult<StatusCode> {
    state.settings.set_api_key(&request.api_key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Upcoming movies with genre names and favorite flags, optionally filtered
pub async fn upcoming_movies(
    State(state): State<AppState>,
    Query(params): Query<UpcomingQuery>,
) -> AppResult<Json<UpcomingResponse>> {
    let filter = MovieFilter::new(params.genre, params.month.as_deref())?;
    let page = params.page.unwrap_or(1).max(1);

    let (movies, genres) = tokio::try_join!(state.catalog.upcoming(page), state.catalog.genres())?;

    let results = filter
        .apply(movies.results)
        .into_iter()
        .map(|movie| MovieCard {
            release_year: movie.release_year().to_string(),
            genres: genre_names(&movie, &genres),
            is_favorite: state.session.is_favorite(&movie.id.into()),
            movie,
        })
        .collect();

    Ok(Json(UpcomingResponse {
        page: movies.page,
        total_pages: movies.total_pages,
        total_results: movies.total_results,
        results,
    }))
}

pub async fn genres(State(state): State<AppState>) -> AppResult<Json<Vec<Genre>>> {
    Ok(Json(state.catalog.genres().await?))
}

pub async fn movie_trailer(
    State(state): State<AppState>,
    Path(movie_id): Path<i64>,
) -> AppResult<Json<TrailerResponse>> {
    let video = find_trailer(state.catalog.as_ref(), movie_id).await?;
    Ok(Json(TrailerResponse {
        movie_id,
        embed_url: format!("https://www.youtube.com/embed/{}?autoplay=1", video.key),
        key: video.key,
        name: video.name,
    }))
}

pub async fn list_favorites(State(state): State<AppState>) -> Json<Vec<FavoriteRecord>> {
    Json(state.session.favorites())
}

/// Membership of one movie; the id may be any numeric form
pub async fn favorite_status(
    State(state): State<AppState>,
    Path(movie_id): Path<String>,
) -> AppResult<Json<FavoriteStatusResponse>> {
    let key = normalize_id(&Value::String(movie_id.clone()))
        .ok_or_else(|| AppError::InvalidMovieReference(format!("not a movie id: {}", movie_id)))?;

    Ok(Json(FavoriteStatusResponse {
        movie_id: key.id(),
        is_favorite: state.session.is_favorite(&key),
        pending: state.session.is_pending(&key),
    }))
}

pub async fn toggle_favorite(
    State(state): State<AppState>,
    Json(movie): Json<LooseMovie>,
) -> AppResult<Json<ToggleResponse>> {
    // sign-in is checked before the reference itself
    let key = movie.key();
    let outcome = state.session.toggle_favorite(movie).await?;
    Ok(Json(ToggleResponse {
        movie_id: key?.id(),
        outcome,
    }))
}

pub async fn current_session(State(state): State<AppState>) -> Json<SessionResponse> {
    Json(SessionResponse {
        identity: state.session.identity(),
    })
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> AppResult<Json<Identity>> {
    let identity = state
        .session
        .sign_in(&request.email, &request.password)
        .await?;
    Ok(Json(identity))
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<Identity>)> {
    let identity = state
        .session
        .register(&request.email, &request.password, &request.display_name)
        .await?;
    Ok((StatusCode::CREATED, Json(identity)))
}

pub async fn sign_out(State(state): State<AppState>) -> AppResult<StatusCode> {
    state.session.sign_out().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn password_reset(
    State(state): State<AppState>,
    request: Option<Json<PasswordResetRequest>>,
) -> AppResult<StatusCode> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    state
        .session
        .send_password_reset(request.email.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_display_name(
    State(state): State<AppState>,
    Json(request): Json<DisplayNameRequest>,
) -> AppResult<Json<Identity>> {
    let identity = state
        .session
        .update_display_name(&request.display_name)
        .await?;
    Ok(Json(identity))
}

pub async fn submit_support(
    State(state): State<AppState>,
    Json(request): Json<SupportRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let id = state.session.submit_support(request).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// Drains pending user notices
pub async fn take_notices(State(state): State<AppState>) -> Json<Vec<Notice>> {
    Json(state.notices.take_pending())
}
