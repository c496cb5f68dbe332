use axum::http::{Request, Response};
use axum::Router;
use tower_http::trace::TraceLayer;

pub trait HttpLoggingExt<S> {
    fn with_http_logging(self) -> Self;
}

impl<S> HttpLoggingExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Log every request path and the response status
    fn with_http_logging(self) -> Router<S> {
        self.layer(
            TraceLayer::new_for_http()
                .on_request(|request: &Request<_>, _span: &_| {
                    let path = request
                        .uri()
                        .path_and_query()
                        .map(|p| p.as_str())
                        .unwrap_or_else(|| request.uri().path());
                    tracing::info!(target: "tower_http", method = %request.method(), path);
                })
                .on_response(|response: &Response<_>, latency: std::time::Duration, _span: &_| {
                    let status = response.status();
                    tracing::info!(
                        target: "tower_http",
                        status = format!("{} {}", status.as_str(), status.canonical_reason().unwrap_or_default()),
                        ?latency
                    )
                }),
        )
    }
}
