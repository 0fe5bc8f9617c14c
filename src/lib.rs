pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod services;
pub mod storage;
pub mod utils;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::services::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/forgot-password", post(handlers::auth::forgot_password))
        .route("/auth/reset-password", post(handlers::auth::reset_password));

    let protected = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/tree", get(handlers::files::tree))
        .route("/usage", get(handlers::files::usage))
        .route(
            "/file",
            get(handlers::files::read_file)
                .put(handlers::files::write_file)
                .post(handlers::files::create_entry)
                .patch(handlers::files::rename_entry)
                .delete(handlers::files::delete_entry),
        )
        .route("/move", post(handlers::files::move_entry))
        .route("/upload", post(handlers::upload::upload_files))
        .route("/download", get(handlers::files::download))
        .route(
            "/user",
            get(handlers::user::get_profile).patch(handlers::user::update_profile),
        )
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .nest("/api", public.merge(protected))
        .route("/health", get(handlers::health::health_check));

    if let Some(dir) = &state.config.static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
