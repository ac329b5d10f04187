//! Unified error handling for the Sofia proxy.
//!
//! Every failure path terminates in a `ProxyError`, which serializes to the
//! JSON envelope the frontend expects: `{error, message?, details?}`. The
//! `message` field is the Turkish human-readable text shown to students; the
//! `error` field is the stable machine-readable label.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Shape-validation failures, kept distinct so logs can tell a missing field
/// from a wrongly-typed one. All of them map to the same 400 envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is absent or null.
    MissingField(&'static str),
    /// A required field is present but empty.
    EmptyField(&'static str),
    /// A field has the wrong JSON type.
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing required field '{}'", field),
            Self::EmptyField(field) => write!(f, "field '{}' must not be empty", field),
            Self::WrongType { field, expected } => {
                write!(f, "field '{}' must be {}", field, expected)
            }
        }
    }
}

/// Unified error type for proxy operations.
#[derive(Debug, Clone)]
pub enum ProxyError {
    /// Request used a method other than POST.
    MethodNotAllowed,
    /// Server-side Claude API key is not configured.
    ApiKeyMissing,
    /// Request body failed shape validation.
    InvalidRequest(ValidationError),
    /// Claude API returned a non-2xx status; relayed as-is.
    Upstream { status: u16, details: Value },
    /// Anything else: body parse failure, transport error, unforeseen failure.
    Internal(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MethodNotAllowed => write!(f, "Method not allowed"),
            Self::ApiKeyMissing => write!(f, "Claude API key not configured"),
            Self::InvalidRequest(e) => write!(f, "Invalid request: {}", e),
            Self::Upstream { status, .. } => {
                write!(f, "Claude API error (status {})", status)
            }
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {}

/// The JSON error envelope returned on every failure path.
#[derive(Serialize)]
pub struct ErrorEnvelope {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ProxyError {
    /// Get the HTTP status code for this error. Upstream errors relay the
    /// provider's own status so the frontend can tell rate limiting from a
    /// bad model name without the proxy interpreting provider error codes.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::ApiKeyMissing => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the stable `error` label the frontend matches on.
    pub fn error_label(&self) -> &'static str {
        match self {
            Self::MethodNotAllowed => "Method not allowed",
            Self::ApiKeyMissing => "Claude API key not configured",
            Self::InvalidRequest(_) => "Invalid request",
            Self::Upstream { .. } => "Claude API error",
            Self::Internal(_) => "Internal server error",
        }
    }

    /// Get the localized end-user message, if the error carries one.
    pub fn message(&self) -> Option<&'static str> {
        match self {
            Self::MethodNotAllowed => None,
            Self::ApiKeyMissing => {
                Some("API anahtarı yapılandırılmamış. Lütfen yöneticiye başvurun.")
            }
            Self::InvalidRequest(_) => Some("Geçersiz istek formatı"),
            Self::Upstream { .. } => Some("Claude API ile iletişim kurulamadı"),
            Self::Internal(_) => Some("İstek işlenirken bir hata oluştu"),
        }
    }

    /// Build the serializable envelope for this error.
    pub fn envelope(&self) -> ErrorEnvelope {
        let details = match self {
            Self::Upstream { details, .. } => Some(details.clone()),
            Self::Internal(msg) => Some(Value::String(msg.clone())),
            _ => None,
        };
        ErrorEnvelope {
            error: self.error_label(),
            message: self.message(),
            details,
        }
    }
}

impl From<ValidationError> for ProxyError {
    fn from(e: ValidationError) -> Self {
        Self::InvalidRequest(e)
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.envelope())).into_response()
    }
}
