use std::sync::Arc;

use axum::{
    extract::{FromRequest, FromRequestParts, State},
    middleware,
    routing::get,
    Json, Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    timeout::{RequestBodyTimeoutLayer, TimeoutLayer},
    trace::TraceLayer,
};

use crate::error::AppError;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::middleware::metrics::{metrics_middleware, panic_response};
use crate::AppState;

pub mod agendas;
pub mod appointments;
pub mod auth;
pub mod businesses;
pub mod health;
pub mod users;

/// JSON body extractor whose rejections use the API error document.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// The public `/v1` API with its middleware stack.
pub fn api_router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let router = Router::new()
        .route("/v1/readiness", get(health::readiness))
        .route("/v1/liveness", get(health::liveness))
        .nest("/v1/auth", auth::router(&state.config.rate_limit)?)
        .nest("/v1/users", users::router())
        .nest("/v1/businesses", businesses::router())
        .nest("/v1/agendas", agendas::router())
        .nest("/v1/appointments", appointments::router())
        .with_state(state.clone());

    Ok(with_middleware(router, &state))
}

/// Operator endpoints served on the debug host.
pub fn debug_router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/debug/vars", get(debug_vars))
        .route("/debug/liveness", get(health::liveness))
        .with_state(metrics)
}

async fn debug_vars(State(metrics): State<Arc<Metrics>>) -> Json<MetricsSnapshot> {
    Json(metrics.snapshot())
}

/// Layers shared by every API route, innermost first: body and response
/// deadlines, panic recovery, request counters and tracing.
pub fn with_middleware(router: Router, state: &AppState) -> Router {
    let metrics = state.metrics.clone();
    let web = &state.config.web;

    router
        .layer(RequestBodyTimeoutLayer::new(web.read_timeout))
        .layer(TimeoutLayer::new(web.write_timeout))
        .layer(CatchPanicLayer::custom(move |panic| {
            panic_response(&metrics, panic)
        }))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}


#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use super::testing::*;
    use super::*;

    async fn boom() -> &'static str {
        panic!("handler exploded")
    }

    #[tokio::test]
    async fn panics_become_counted_internal_errors() {
        let state = test_state().await;
        let app = with_middleware(Router::new().route("/boom", get(boom)), &state);

        let (status, body) = send(&app, request(Method::GET, "/boom", None, None)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");

        let snapshot = state.metrics.snapshot();
        assert_eq!(snapshot.requests, 1);
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.panics, 1);
    }

    #[tokio::test]
    async fn malformed_json_is_an_invalid_argument() {
        let state = test_state().await;
        let app = app(&state);

        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/v1/users")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "InvalidArgument");
    }

    #[tokio::test]
    async fn debug_vars_expose_request_counters() {
        let state = test_state().await;
        let app = app(&state);
        send(&app, request(Method::GET, "/v1/liveness", None, None)).await;
        send(&app, request(Method::GET, "/v1/auth/authenticate", None, None)).await;

        let debug = debug_router(state.metrics.clone());
        let (status, body) = send(&debug, request(Method::GET, "/debug/vars", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["requests"], 2);
        assert_eq!(body["panics"], 0);

        let (status, body) =
            send(&debug, request(Method::GET, "/debug/liveness", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "up");
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let state = test_state().await;
        let (status, _) = send(&app(&state), request(Method::GET, "/v1/nowhere", None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
