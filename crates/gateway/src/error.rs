//! JSON error responses.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lingoclaw_core::Error;
use lingoclaw_core::error::{AuthError, ProviderError, QuotaError, RepositoryError, status_for};
use serde::Serialize;
use serde_json::Value;
use tracing::error;

/// An error rendered as `{code, message, error_type, detail?}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub error_type: &'static str,
    pub message: String,
    pub detail: Option<Value>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: u16,
    message: &'a str,
    error_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a Value>,
}

impl ApiError {
    pub fn new(error_type: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::from_u16(status_for(error_type))
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            error_type,
            message: message.into(),
            detail: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message)
    }
}

fn quota_exceeded(e: &Error) -> Option<(i64, i64)> {
    match e {
        Error::Quota(QuotaError::Exceeded {
            remaining,
            required,
        })
        | Error::Provider(ProviderError::Quota(QuotaError::Exceeded {
            remaining,
            required,
        })) => Some((*remaining, *required)),
        _ => None,
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        if let Some((remaining, required)) = quota_exceeded(&e) {
            let mut api = Self::new("token_quota_exceeded", "Token quota exceeded");
            api.detail = Some(serde_json::json!({ "remaining": remaining, "required": required }));
            return api;
        }
        let error_type = e.error_type();
        if status_for(error_type) >= 500 {
            error!(error_type, error = %e, "Request failed");
            return Self::new(error_type, "Internal server error");
        }
        Self::new(error_type, e.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Error::from(e).into()
    }
}

impl From<QuotaError> for ApiError {
    fn from(e: QuotaError) -> Self {
        Error::from(e).into()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        Error::from(e).into()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.status.as_u16(),
            message: &self.message,
            error_type: self.error_type,
            detail: self.detail.as_ref(),
        };
        (self.status, Json(body)).into_response()
    }
}
