use std::any::Any;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    middleware::Next,
    response::IntoResponse,
};

use crate::error::AppError;
use crate::metrics::Metrics;

// Counts every request, and every response with a 5xx status as an error.
pub async fn metrics_middleware(
    State(metrics): State<Arc<Metrics>>,
    req: Request<Body>,
    next: Next,
) -> Response<Body> {
    metrics.record_request();
    let res = next.run(req).await;
    if res.status().is_server_error() {
        metrics.record_error();
    }
    res
}

/// Builds the response for a handler panic: counted, logged and answered with
/// the regular internal error document.
pub fn panic_response(metrics: &Metrics, panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    metrics.record_panic();

    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    AppError::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}
