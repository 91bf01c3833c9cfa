use std::sync::Arc;
use std::time::Duration;

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use axum_extra::{
    headers::{
        authorization::{Basic, Bearer},
        Authorization,
    },
    TypedHeader,
};
use chrono::Utc;
use serde::Serialize;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorError,
    GovernorLayer,
};

use crate::config::RateLimitConfig;
use crate::error::{AppError, AppResult};
use crate::routes::ApiPath;
use crate::services::auth::Claims;
use crate::AppState;

/// How often idle rate-limiter entries are purged.
const LIMITER_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

pub fn router(rate_limit: &RateLimitConfig) -> anyhow::Result<Router<Arc<AppState>>> {
    let mut builder = GovernorConfigBuilder::default().key_extractor(SmartIpKeyExtractor);
    builder
        .per_millisecond((1000 / rate_limit.token_per_second.max(1)).max(1))
        .burst_size(rate_limit.token_burst.max(1))
        .error_handler(rate_limited_response);

    let config = Arc::new(
        builder
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build token rate limiter config"))?,
    );

    // The task ends once the router holding the limiter is dropped.
    let limiter = Arc::downgrade(config.limiter());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LIMITER_CLEANUP_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(limiter) = limiter.upgrade() else {
                break;
            };
            tracing::debug!("token rate limiter size: {}", limiter.len());
            limiter.retain_recent();
        }
    });

    Ok(Router::new()
        .route("/token/:kid", get(token))
        .layer(GovernorLayer { config })
        .route("/authenticate", get(authenticate)))
}

fn rate_limited_response(error: GovernorError) -> http::Response<Body> {
    let (status, body, retry_after) = match error {
        GovernorError::TooManyRequests { wait_time, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            serde_json::json!({
                "error": {
                    "kind": "ResourceExhausted",
                    "code": "RATE_LIMITED",
                    "message": "Rate limit exceeded",
                    "details": { "retry_after_seconds": wait_time }
                }
            }),
            Some(wait_time),
        ),
        GovernorError::UnableToExtractKey => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({
                "error": {
                    "kind": "InvalidArgument",
                    "code": "INVALID_ARGUMENT",
                    "message": "Unable to determine client IP for rate limiting"
                }
            }),
            None,
        ),
        GovernorError::Other { code, msg, .. } => (
            StatusCode::from_u16(code.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            serde_json::json!({
                "error": {
                    "kind": "Internal",
                    "code": "INTERNAL_ERROR",
                    "message": msg.unwrap_or_else(|| "Rate limiting error".to_string())
                }
            }),
            None,
        ),
    };

    let mut resp = http::Response::new(Body::from(body.to_string()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Some(seconds) = retry_after {
        resp.headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
    }
    resp
}

// ============================================================================
// Extractors
// ============================================================================

/// Verified bearer-token claims.
pub struct AuthClaims(pub Claims);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthClaims {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|e| {
                    tracing::debug!("Missing or malformed bearer token: {}", e);
                    AppError::Unauthenticated
                })?;

        let claims = state.auth.authenticate(bearer.token()).await?;
        Ok(AuthClaims(claims))
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Exchanges basic-auth credentials for a token signed with `kid`.
async fn token(
    State(state): State<Arc<AppState>>,
    ApiPath(kid): ApiPath<String>,
    credentials: Option<TypedHeader<Authorization<Basic>>>,
) -> AppResult<Json<TokenResponse>> {
    let TypedHeader(Authorization(basic)) = credentials.ok_or_else(|| {
        tracing::debug!("Token request without basic credentials");
        AppError::Unauthenticated
    })?;

    let user = state
        .users
        .authenticate(basic.username(), basic.password())
        .await?;
    let token = state.auth.issue_token(&kid, &user, Utc::now()).await?;

    tracing::info!("Issued token for user {} with key {}", user.id, kid);
    Ok(Json(TokenResponse { token }))
}

async fn authenticate(AuthClaims(claims): AuthClaims) -> Json<Claims> {
    Json(claims)
}
