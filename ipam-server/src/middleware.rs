//! HTTP middleware

use axum::http::{header, HeaderName, Method, StatusCode};
use ipam_common::protocol::PRINCIPAL_HEADER;
use std::time::Duration;
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Create logging middleware
pub fn logging_middleware() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}

/// Create CORS middleware
pub fn cors_middleware() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(PRINCIPAL_HEADER),
        ])
}

/// Create timeout middleware; long pool writes are bounded by this
pub fn timeout_middleware(timeout_secs: u64) -> TimeoutLayer {
    TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(timeout_secs.max(1)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use axum_test::TestServer;

    #[tokio::test]
    async fn test_slow_request_times_out() {
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "done"
                }),
            )
            .route("/fast", get(|| async { "done" }))
            .layer(timeout_middleware(1));
        let server = TestServer::new(app).unwrap();

        server.get("/fast").await.assert_status_ok();
        server
            .get("/slow")
            .await
            .assert_status(StatusCode::REQUEST_TIMEOUT);
    }
}
