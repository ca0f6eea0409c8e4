use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_request_id, request_id_middleware};

/// Creates the API router with all routes and the tracing/request-id layers
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Client settings
        .route("/settings", get(handlers::get_settings))
        .route("/settings/api-key", put(handlers::set_api_key))
        // Catalog
        .route("/movies/upcoming", get(handlers::upcoming_movies))
        .route("/movies/:id/trailer", get(handlers::movie_trailer))
        .route("/genres", get(handlers::genres))
        // Favorites
        .route("/favorites", get(handlers::list_favorites))
        .route("/favorites/toggle", post(handlers::toggle_favorite))
        .route("/favorites/:id", get(handlers::favorite_status))
        // Identity and profile
        .route("/session", get(handlers::current_session))
        .route("/auth/sign-in", post(handlers::sign_in))
        .route("/auth/register", post(handlers::register))
        .route("/auth/sign-out", post(handlers::sign_out))
        .route("/auth/password-reset", post(handlers::password_reset))
        .route("/profile/display-name", put(handlers::update_display_name))
        // Support and notices
        .route("/support/messages", post(handlers::submit_support))
        .route("/notices", get(handlers::take_notices))
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
        .with_state(state)
}
