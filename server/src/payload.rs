//! Request bodies accepted by the todo endpoints, and the extractor that
//! turns malformed JSON into an enveloped 400.

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::{header, HeaderMap},
    Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::AppError;
use crate::store::{NewTodo, Todo};

pub const TITLE_REQUIRED: &str = "A title is required.";

/// JSON body extractor whose rejection is an `AppError`, so a bad body gets
/// the same envelope as every other failure.
///
/// A request with no body, or with a body that is not declared as JSON, is
/// read as `{}`. Field validation then reports what is missing.
#[derive(Debug)]
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let declared_json = is_json(req.headers());
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

        if !declared_json || bytes.iter().all(u8::is_ascii_whitespace) {
            debug!(bytes = bytes.len(), "no JSON body; reading it as an empty object");
            return serde_json::from_str("{}")
                .map(Self)
                .map_err(|e| AppError::BadRequest(e.to_string()));
        }
        match Json::<T>::from_bytes(&bytes) {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::BadRequest(rejection.body_text())),
        }
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .is_some_and(|mime| mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json"))
}

/// `POST /api/todos` body. `title` is optional here so that a missing title
/// becomes a field error rather than a parse error.
#[derive(Debug, Default, Deserialize)]
pub struct CreateTodo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

impl CreateTodo {
    pub fn validate(self) -> Result<NewTodo, AppError> {
        let title = match self.title {
            Some(title) if !title.trim().is_empty() => title,
            _ => return Err(AppError::field("title", TITLE_REQUIRED)),
        };
        Ok(NewTodo {
            title,
            body: self.body,
            completed: self.completed,
        })
    }
}

/// `PATCH /api/todos/{id}` body. Omitted fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTodo {
    pub title: Option<String>,
    pub body: Option<String>,
    pub completed: Option<bool>,
}

impl UpdateTodo {
    /// A supplied title must not be blank.
    pub fn validate(&self) -> Result<(), AppError> {
        match &self.title {
            Some(title) if title.trim().is_empty() => Err(AppError::field("title", TITLE_REQUIRED)),
            _ => Ok(()),
        }
    }

    pub fn apply(self, todo: &mut Todo) {
        if let Some(title) = self.title {
            todo.title = title;
        }
        if let Some(body) = self.body {
            todo.body = Some(body);
        }
        if let Some(completed) = self.completed {
            todo.completed = completed;
        }
    }
}
