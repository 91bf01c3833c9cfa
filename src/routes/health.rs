use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub host: String,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
}

/// Pings the database.
pub async fn readiness(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ok".to_string(),
            }),
        ),
        Err(e) => {
            tracing::error!("Readiness check failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ReadinessResponse {
                    status: "db not ready".to_string(),
                }),
            )
        }
    }
}

pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: "up".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        host: std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::routes::testing::*;

    #[tokio::test]
    async fn probes_report_status() {
        let state = test_state().await;
        let app = app(&state);

        let (status, body) = send(&app, request(Method::GET, "/v1/readiness", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(&app, request(Method::GET, "/v1/liveness", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "up");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn readiness_fails_when_the_pool_is_closed() {
        let state = test_state().await;
        state.db.close().await;

        let (status, _) = send(&app(&state), request(Method::GET, "/v1/readiness", None, None)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
