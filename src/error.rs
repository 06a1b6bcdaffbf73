/// Unified error types for the CyberGuard consultation backend
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Missing or malformed request field
    #[error("{0}")]
    Validation(String),

    /// Missing or wrong admin credentials
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Balance below the price of the requested operation
    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredit { required: Decimal, available: Decimal },

    /// Rate limiting errors
    #[error("Rate limit exceeded for {bucket}")]
    RateLimitExceeded {
        bucket: &'static str,
        retry_after: std::time::Duration,
    },

    /// Not found errors
    #[error("{0}")]
    NotFound(String),

    /// Conflict errors (e.g., duplicate session token)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// AI or payment collaborator failed mid-call
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A security tool could not finish its probe
    #[error("{0}")]
    ToolFailure(String),

    /// Collaborator not configured
    #[error("{0}")]
    ServiceUnavailable(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Short machine-readable code used in error bodies and metrics
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "BadRequest",
            ApiError::Unauthorized(_) => "Unauthorized",
            ApiError::InsufficientCredit { .. } => "InsufficientCredit",
            ApiError::RateLimitExceeded { .. } => "RateLimited",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Conflict(_) => "Conflict",
            ApiError::Upstream(_) => "UpstreamUnavailable",
            ApiError::ToolFailure(_) => "ToolFailure",
            ApiError::ServiceUnavailable(_) => "ServiceUnavailable",
            ApiError::Database(_) | ApiError::Internal(_) | ApiError::Io(_) => "InternalServerError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::InsufficientCredit { .. } => StatusCode::PAYMENT_REQUIRED,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_)
            | ApiError::ToolFailure(_)
            | ApiError::Database(_)
            | ApiError::Internal(_)
            | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error body shared by every endpoint
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_credits: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_credits: Option<f64>,
}

/// Convert ApiError to HTTP response
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let mut body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
            required_credits: None,
            user_credits: None,
        };

        let mut retry_after = None;

        match &self {
            ApiError::InsufficientCredit { required, available } => {
                body.message =
                    "Insufficient credits. Please purchase more credits to continue.".to_string();
                body.required_credits = required.to_f64();
                body.user_credits = available.to_f64();
            }
            ApiError::RateLimitExceeded { retry_after: after, .. } => {
                body.message = "Too many requests, please try again later".to_string();
                retry_after = Some(after.as_secs().max(1));
            }
            ApiError::Upstream(detail) => {
                tracing::error!(error = %detail, "upstream collaborator failed");
                body.message = "Upstream service failed, please try again later".to_string();
            }
            ApiError::Database(_) | ApiError::Internal(_) | ApiError::Io(_) => {
                tracing::error!(error = %self, "internal error");
                body.message = "Internal server error".to_string(); // Don't leak details
            }
            _ => {}
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Result type alias for service operations
pub type ApiResult<T> = Result<T, ApiError>;
