use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{self, CorsLayer};

pub trait CorsExt<S> {
    fn with_cors(self, allowed_origins: &[String]) -> Router<S>;
}

impl<S> CorsExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Add CORS to Router. An empty list allows any origin.
    fn with_cors(self, allowed_origins: &[String]) -> Router<S> {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o.trim_end_matches('/')).ok())
            .collect();

        let allow_origin = if origins.is_empty() {
            cors::AllowOrigin::any()
        } else {
            cors::AllowOrigin::predicate(move |origin, _| origins.iter().any(|o| o == origin))
        };

        let cors_layer = CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(cors::Any)
            .allow_headers(cors::Any);

        self.layer(cors_layer)
    }
}
