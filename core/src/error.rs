//! Error types for the todo API client.
//!
//! # Design
//! `NotFound` gets a dedicated variant because callers frequently distinguish
//! "the resource does not exist" from "the server returned an unexpected
//! status." A 400 that carries a field map becomes `Validation` so forms can
//! put the messages back on their inputs. All other non-2xx responses land in
//! `HttpError` with the raw status code and body.
//!
//! `ApiError` is `Clone` because a deduplicated read hands the same result to
//! every caller waiting on it.

use thiserror::Error;

use crate::types::FieldErrors;

/// Errors returned by `TodoClient` parse methods and by transports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The server returned 404; the requested todo does not exist.
    #[error("resource not found")]
    NotFound,

    /// The server rejected the input with per-field messages.
    #[error("{message}")]
    Validation {
        status: u16,
        message: String,
        errors: FieldErrors,
    },

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response succeeded but its `data` field was absent or null.
    #[error("response is missing its data payload")]
    MissingPayload,

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// The request never produced a response.
    #[error("transport failed: {0}")]
    Transport(String),
}

impl ApiError {
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation { errors, .. } => Some(errors),
            _ => None,
        }
    }

    /// The server's envelope message, when the error came with one.
    pub fn server_message(&self) -> Option<String> {
        match self {
            Self::Validation { message, .. } => Some(message.clone()),
            Self::HttpError { body, .. } => serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|value| value.get("message")?.as_str().map(str::to_string)),
            _ => None,
        }
    }
}
