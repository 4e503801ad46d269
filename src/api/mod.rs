pub mod auth;
mod error;
mod feed;
mod users;
mod validation;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Public routes: signup, login, refresh and the feed
    let public_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/feeds", get(feed::list_feed));

    // /api/v1/auth/user/** — any authenticated role
    let user_routes = Router::new()
        .route("/me", get(users::me))
        .route("/logout", post(auth::logout))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_user,
        ));

    // /api/v1/auth/manager/** — manager or admin
    let manager_routes = Router::new()
        .route(
            "/categories",
            get(users::list_categories).post(users::create_category),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_manager,
        ));

    // /api/v1/auth/admin/** — admin only
    let admin_routes = Router::new()
        .route("/users", get(users::list_users))
        .route("/users/:id", delete(users::delete_user))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", public_routes)
        .nest("/api/v1/auth/user", user_routes)
        .nest("/api/v1/auth/manager", manager_routes)
        .nest("/api/v1/auth/admin", admin_routes)
        .layer(cors_layer(&state.config.cors.allowed_origins))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn health_check() -> &'static str {
    "OK"
}
