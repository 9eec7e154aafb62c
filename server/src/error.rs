//! Response envelope and handler errors.
//!
//! Every response, success or failure, has the same shape:
//! `{ data, message, success }`, plus an `errors` field map on validation
//! failures. `data` is `null` on every error path.

use std::collections::BTreeMap;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Field name to message, e.g. `{"title": "A title is required."}`.
pub type FieldErrors = BTreeMap<String, String>;

pub const GENERIC_FAILURE: &str = "Request failed!";

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: Option<T>,
    pub message: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            data: Some(data),
            message: message.into(),
            success: true,
            errors: None,
        }
    }
}

impl Envelope<()> {
    /// A successful response that carries no payload.
    pub fn acknowledged(message: impl Into<String>) -> Self {
        Self {
            data: None,
            message: message.into(),
            success: true,
            errors: None,
        }
    }

    fn failure(message: impl Into<String>, errors: Option<FieldErrors>) -> Self {
        Self {
            data: None,
            message: message.into(),
            success: false,
            errors,
        }
    }
}

/// Build a response from a status and an envelope.
pub fn respond<T: Serialize>(status: StatusCode, envelope: Envelope<T>) -> Response {
    (status, Json(envelope)).into_response()
}

/// Errors a handler can return. Each maps to one status code.
#[derive(Debug, Error)]
pub enum AppError {
    /// Input failed validation; 400 with a field map.
    #[error("{message}")]
    Validation {
        message: String,
        errors: FieldErrors,
    },

    /// Malformed id or body; 400 without a field map.
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("The {method} method is not allowed for this endpoint!")]
    MethodNotAllowed {
        method: Method,
        allow: &'static [&'static str],
    },

    /// Persistence failure; 500. `detail` is only filled in development.
    #[error("internal error")]
    Internal { detail: Option<String> },
}

impl AppError {
    /// A single-field validation failure.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), message.into());
        Self::Validation {
            message: GENERIC_FAILURE.to_string(),
            errors,
        }
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        match self {
            Self::Validation { errors, .. } => respond(status, Envelope::failure(message, Some(errors))),
            Self::MethodNotAllowed { allow, .. } => {
                let mut response = respond(status, Envelope::failure(message, None));
                if let Ok(value) = HeaderValue::from_str(&allow.join(", ")) {
                    response.headers_mut().insert(header::ALLOW, value);
                }
                response
            }
            Self::Internal { detail } => respond(
                status,
                Envelope::failure(detail.unwrap_or_else(|| GENERIC_FAILURE.to_string()), None),
            ),
            Self::BadRequest(_) | Self::NotFound(_) => {
                respond(status, Envelope::failure(message, None))
            }
        }
    }
}
