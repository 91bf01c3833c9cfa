use std::collections::BTreeMap;

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::calendar::CalendarError;
use crate::db::StoreError;
use crate::query::QueryError;

pub type FieldErrors = BTreeMap<&'static str, String>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Per-field validation failures, keyed by field name.
    #[error("Validation failed")]
    Validation(FieldErrors),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Access denied")]
    PermissionDenied,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Business not found")]
    BusinessNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Time slot is already reserved")]
    AlreadyReserved,

    #[error("Email or phone number is already in use")]
    UniqueEmailOrPhone,

    #[error("Scheduled time must be in the future")]
    PastTime,

    #[error("User is disabled")]
    UserDisabled,

    #[error("Appointment is already cancelled")]
    AlreadyCancelled,

    #[error("Requested time is outside the business agenda")]
    OutsideAgenda,

    #[error("No daily agenda for the requested date")]
    NoDailyAgenda,

    #[error("Business has no general agenda")]
    NoGeneralAgenda,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Error kinds as exposed to clients; each maps onto one HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    Aborted,
    FailedPrecondition,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Aborted => StatusCode::CONFLICT,
            ErrorKind::FailedPrecondition => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    kind: ErrorKind,
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidArgument(_) | AppError::Validation(_) => ErrorKind::InvalidArgument,
            AppError::Unauthenticated | AppError::Jwt(_) => ErrorKind::Unauthenticated,
            AppError::PermissionDenied => ErrorKind::PermissionDenied,
            AppError::NotFound(_) | AppError::BusinessNotFound | AppError::UserNotFound => {
                ErrorKind::NotFound
            }
            AppError::Conflict(_) | AppError::AlreadyReserved | AppError::UniqueEmailOrPhone => {
                ErrorKind::Aborted
            }
            AppError::PastTime
            | AppError::UserDisabled
            | AppError::AlreadyCancelled
            | AppError::OutsideAgenda
            | AppError::NoDailyAgenda
            | AppError::NoGeneralAgenda => ErrorKind::FailedPrecondition,
            AppError::Internal(_) | AppError::Database(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidArgument(_) => "INVALID_ARGUMENT",
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::Jwt(_) => "INVALID_TOKEN",
            AppError::PermissionDenied => "PERMISSION_DENIED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BusinessNotFound => "BUSINESS_NOT_FOUND",
            AppError::UserNotFound => "USER_NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::AlreadyReserved => "ALREADY_RESERVED",
            AppError::UniqueEmailOrPhone => "UNIQUE_EMAIL_OR_PHONE",
            AppError::PastTime => "PAST_TIME",
            AppError::UserDisabled => "USER_DISABLED",
            AppError::AlreadyCancelled => "ALREADY_CANCELLED",
            AppError::OutsideAgenda => "OUTSIDE_AGENDA",
            AppError::NoDailyAgenda => "NO_DAILY_AGENDA",
            AppError::NoGeneralAgenda => "NO_GENERAL_AGENDA",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                "An internal error occurred".to_string()
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "A database error occurred".to_string()
            }
            AppError::Jwt(e) => {
                tracing::warn!("JWT error: {:?}", e);
                "Invalid or expired token".to_string()
            }
            AppError::InvalidArgument(msg) | AppError::NotFound(msg) | AppError::Conflict(msg) => {
                msg.clone()
            }
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Validation(fields) => serde_json::to_value(fields).ok(),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let body = ErrorResponse {
            error: ErrorBody {
                kind,
                code: self.code().to_string(),
                message: self.public_message(),
                details: self.details(),
            },
        };
        (kind.status(), Json(body)).into_response()
    }
}

impl From<CalendarError> for AppError {
    fn from(e: CalendarError) -> Self {
        AppError::InvalidArgument(e.to_string())
    }
}

impl From<QueryError> for AppError {
    fn from(e: QueryError) -> Self {
        AppError::InvalidArgument(e.to_string())
    }
}

/// Default translation for store failures. Engines map `NotFound` and
/// `Conflict` to their own domain kinds before falling back to this.
impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound("Record not found".to_string()),
            StoreError::Conflict => AppError::Conflict("Record already exists".to_string()),
            StoreError::Internal(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(e: bcrypt::BcryptError) -> Self {
        AppError::Internal(anyhow::Error::new(e))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidArgument(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidArgument(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidArgument(rejection.body_text())
    }
}

pub type AppResult<T> = Result<T, AppError>;
