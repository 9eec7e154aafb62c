//! Request builders and response parsers for the todo endpoints.
//!
//! Nothing here performs I/O. `build_*` turns an operation into an
//! `HttpRequest`; `parse_*` turns the matching `HttpResponse` back into a
//! typed value, so a `Transport` only ever moves plain data.
//!
//! Every response arrives wrapped in `{ data, message, success }`. The
//! parsers unwrap the envelope and report a successful response without
//! `data` as `ApiError::MissingPayload`, which the cache treats as stale data
//! rather than a hard failure.

use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{CreateTodo, Envelope, Todo, UpdateTodo};

/// Cache key (request path) of the todo collection.
pub const TODOS_KEY: &str = "/api/todos";

/// Cache key (request path) of a single todo.
pub fn todo_key(id: Uuid) -> String {
    format!("{TODOS_KEY}/{id}")
}

/// Inverse of `todo_key`.
pub fn parse_todo_key(key: &str) -> Option<Uuid> {
    let id = key.strip_prefix(TODOS_KEY)?.strip_prefix('/')?;
    Uuid::parse_str(id).ok()
}

/// Holds only the base URL; cheap to clone into fetchers.
#[derive(Debug, Clone)]
pub struct TodoClient {
    base_url: String,
}

impl TodoClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_list_todos(&self) -> HttpRequest {
        self.request(HttpMethod::Get, TODOS_KEY, None)
    }

    pub fn build_get_todo(&self, id: Uuid) -> HttpRequest {
        self.request(HttpMethod::Get, &todo_key(id), None)
    }

    pub fn build_create_todo(&self, input: &CreateTodo) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(input).map_err(|e| ApiError::SerializationError(e.to_string()))?;
        Ok(self.request(HttpMethod::Post, TODOS_KEY, Some(body)))
    }

    pub fn build_update_todo(&self, id: Uuid, input: &UpdateTodo) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(input).map_err(|e| ApiError::SerializationError(e.to_string()))?;
        Ok(self.request(HttpMethod::Patch, &todo_key(id), Some(body)))
    }

    pub fn build_delete_todo(&self, id: Uuid) -> HttpRequest {
        self.request(HttpMethod::Delete, &todo_key(id), None)
    }

    pub fn parse_list_todos(&self, response: HttpResponse) -> Result<Vec<Todo>, ApiError> {
        parse_data(response, 200)
    }

    pub fn parse_get_todo(&self, response: HttpResponse) -> Result<Todo, ApiError> {
        parse_data(response, 200)
    }

    pub fn parse_create_todo(&self, response: HttpResponse) -> Result<Todo, ApiError> {
        parse_data(response, 201)
    }

    pub fn parse_update_todo(&self, response: HttpResponse) -> Result<Todo, ApiError> {
        parse_data(response, 200)
    }

    /// Returns the server's confirmation message.
    pub fn parse_delete_todo(&self, response: HttpResponse) -> Result<String, ApiError> {
        let envelope: Envelope<serde_json::Value> = parse_envelope(response, 200)?;
        Ok(envelope.message)
    }

    fn request(&self, method: HttpMethod, path: &str, body: Option<String>) -> HttpRequest {
        let headers = if body.is_some() {
            vec![("content-type".to_string(), "application/json".to_string())]
        } else {
            Vec::new()
        };
        HttpRequest {
            method,
            path: format!("{}{path}", self.base_url),
            headers,
            body,
        }
    }
}

fn parse_data<T: DeserializeOwned>(response: HttpResponse, expected: u16) -> Result<T, ApiError> {
    parse_envelope(response, expected)?
        .data
        .ok_or(ApiError::MissingPayload)
}

fn parse_envelope<T: DeserializeOwned>(
    response: HttpResponse,
    expected: u16,
) -> Result<Envelope<T>, ApiError> {
    check_status(&response, expected)?;
    serde_json::from_str(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse, expected: u16) -> Result<(), ApiError> {
    if response.status == expected {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound);
    }
    if response.status == 400 {
        if let Ok(Envelope::<serde_json::Value> {
            message,
            errors: Some(errors),
            ..
        }) = serde_json::from_str(&response.body)
        {
            return Err(ApiError::Validation {
                status: response.status,
                message,
                errors,
            });
        }
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: response.body.clone(),
    })
}
