use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use slog::{o, Drain, Logger};
use slog_async::Async;
use slog_term::{FullFormat, TermDecorator};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Requests slower than this are logged at warn level.
const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(1);

/// Options for the root logger.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    async_buffer_size: usize,
    use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            async_buffer_size: 1024,
            use_color: true,
        }
    }
}

/// Builds the root logger backing the access log and service logs.
pub fn setup_logger(config: LoggerConfig) -> Logger {
    let decorator = if config.use_color {
        TermDecorator::new().force_color().build()
    } else {
        TermDecorator::new().build()
    };

    let drain = FullFormat::new(decorator).build().fuse();

    let drain = Async::new(drain)
        .chan_size(config.async_buffer_size)
        .build()
        .fuse();

    Logger::root(
        drain,
        o!("service" => "edupay-api", "version" => env!("CARGO_PKG_VERSION")),
    )
}

/// State handed to the access-log middleware.
#[derive(Clone)]
pub struct LoggingState {
    logger: Logger,
    slow_threshold: Duration,
}

impl LoggingState {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            slow_threshold: SLOW_REQUEST_THRESHOLD,
        }
    }

    #[cfg(test)]
    fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }
}

/// Access log. One record per request, carrying the request id so log lines
/// correlate with error bodies and response metadata.
pub async fn logging_middleware(
    axum::extract::State(state): axum::extract::State<Arc<LoggingState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let start_time = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;
    let duration = start_time.elapsed();
    let status = response.status().as_u16();
    let duration_ms: u128 = duration.as_millis();
    let request_id = crate::request_id::current_request_id()
        .map(|rid| rid.as_str().to_string())
        .unwrap_or_else(|| "-".to_string());

    if duration >= state.slow_threshold {
        slog::warn!(
            &state.logger,
            "Slow HTTP request";
            "request_id" => request_id,
            "method" => method,
            "path" => path,
            "status" => status,
            "duration_ms" => duration_ms,
        );
    } else {
        slog::info!(
            &state.logger,
            "HTTP request handled";
            "request_id" => request_id,
            "method" => method,
            "path" => path,
            "status" => status,
            "duration_ms" => duration_ms,
        );
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    fn discard_logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    #[tokio::test]
    async fn middleware_passes_responses_through() {
        let state = Arc::new(LoggingState::new(discard_logger()));

        let app = Router::new()
            .route("/health", get(|| async { "OK" }))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                logging_middleware,
            ));

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn slow_requests_take_the_warn_path() {
        // A zero threshold classifies every request as slow.
        let state = Arc::new(
            LoggingState::new(discard_logger()).with_slow_threshold(Duration::ZERO),
        );

        let app = Router::new()
            .route("/health", get(|| async { "OK" }))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                logging_middleware,
            ));

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
