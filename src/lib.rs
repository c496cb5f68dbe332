pub mod baas;
pub mod background;
pub mod components;
pub mod config;
pub mod error;
pub mod helpers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use axum::http::header;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::baas::{realtime::Realtime, Baas};
use crate::config::AppCfg;
use crate::middleware::{cors::CorsExt, logging::HttpLoggingExt};
use crate::routes::AppState;

/// Build the full HTTP application from configuration.
pub fn app(cfg: &AppCfg) -> Router {
    let baas = Baas::new(&cfg.baas, Realtime::new(cfg.realtime.buffer));
    app_with_state(AppState::new(baas, cfg), &cfg.allowed_origins)
}

/// Build the HTTP application around an existing backend.
pub fn app_with_state(state: AppState, allowed_origins: &[String]) -> Router {
    routes::router(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::CACHE_CONTROL,
                    header::HeaderValue::from_static("no-store"),
                ))
                .layer(CompressionLayer::new()),
        )
        .with_cors(allowed_origins)
        .with_http_logging()
}
