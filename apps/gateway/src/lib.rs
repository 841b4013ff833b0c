pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;
pub mod streams;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use auth::jwt::JwtValidator;
use config::Config;
use gateway::Gateway;
use streams::memory::MemoryStreamDirectory;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the production collaborators: HS256 bearer tokens and the
    /// in-process stream directory seeded with the configured room owners.
    pub fn from_config(config: Config) -> Self {
        let auth = Arc::new(JwtValidator::new(&config.jwt_secret));
        let streams = Arc::new(MemoryStreamDirectory::with_rooms(
            config.room_owners.iter().cloned(),
        ));
        Self {
            gateway: Arc::new(Gateway::new(auth, streams)),
            config: Arc::new(config),
        }
    }
}

/// The full HTTP application: routes plus CORS and request tracing.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
