//! HTTP handlers for the todo endpoints.
//!
//! The item handlers share one order of checks: the id must parse as a UUID
//! before storage is touched, then the document must exist, and only then is
//! the request body validated and applied. A request checks out one store
//! handle and uses it throughout.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::Response,
};
use tracing::debug;
use uuid::Uuid;

use crate::error::{respond, AppError, Envelope};
use crate::payload::{CreateTodo, Payload, UpdateTodo};
use crate::store::{NewTodo, Todo, TodoStore};
use crate::AppState;

pub const COLLECTION_METHODS: &[&str] = &["GET", "POST"];
pub const ITEM_METHODS: &[&str] = &["GET", "PATCH", "DELETE"];
pub const SEED_METHODS: &[&str] = &["POST"];

const SUCCESS: &str = "Request successful!";

pub async fn list_todos(State(state): State<AppState>) -> Result<Response, AppError> {
    let store = state.store().await?;
    let todos = store.find().await.map_err(|e| state.store_failure(e))?;
    Ok(respond(StatusCode::OK, Envelope::ok(todos, SUCCESS)))
}

pub async fn create_todo(
    State(state): State<AppState>,
    Payload(input): Payload<CreateTodo>,
) -> Result<Response, AppError> {
    let new = input.validate().inspect_err(|_| debug!("rejected todo without a title"))?;
    let store = state.store().await?;
    let todo = store.insert(new).await.map_err(|e| state.store_failure(e))?;
    Ok(respond(StatusCode::CREATED, Envelope::ok(todo, "Todo created!")))
}

pub async fn get_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let (_, todo) = load(&state, &id).await?;
    Ok(respond(StatusCode::OK, Envelope::ok(todo, SUCCESS)))
}

pub async fn update_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Payload(input): Payload<UpdateTodo>,
) -> Result<Response, AppError> {
    let (store, mut todo) = load(&state, &id).await?;
    input.validate()?;
    input.apply(&mut todo);
    let updated = store.save(todo).await.map_err(|e| state.store_failure(e))?;
    Ok(respond(StatusCode::OK, Envelope::ok(updated, "Todo updated!")))
}

pub async fn delete_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let (store, todo) = load(&state, &id).await?;
    if !store.remove(todo.id).await.map_err(|e| state.store_failure(e))? {
        return Err(not_found());
    }
    Ok(respond(
        StatusCode::OK,
        Envelope::acknowledged(format!("The todo with an id of '{}' was deleted!", todo.id)),
    ))
}

/// Replace the collection with the sample todos. Routed in development only.
pub async fn seed(State(state): State<AppState>) -> Result<Response, AppError> {
    let store = state.store().await?;
    let todos = store
        .replace_all(sample_todos())
        .await
        .map_err(|e| state.store_failure(e))?;
    Ok(respond(StatusCode::OK, Envelope::ok(todos, "Seeded successfully")))
}

pub async fn collection_method_not_allowed(method: Method) -> AppError {
    AppError::MethodNotAllowed {
        method,
        allow: COLLECTION_METHODS,
    }
}

pub async fn item_method_not_allowed(method: Method) -> AppError {
    AppError::MethodNotAllowed {
        method,
        allow: ITEM_METHODS,
    }
}

pub async fn seed_method_not_allowed(method: Method) -> AppError {
    AppError::MethodNotAllowed {
        method,
        allow: SEED_METHODS,
    }
}

pub async fn route_not_found() -> AppError {
    AppError::NotFound("Route not found!".to_string())
}

async fn load(state: &AppState, raw_id: &str) -> Result<(Arc<dyn TodoStore>, Todo), AppError> {
    let id = parse_id(raw_id)?;
    let store = state.store().await?;
    let todo = store
        .find_by_id(id)
        .await
        .map_err(|e| state.store_failure(e))?
        .ok_or_else(not_found)?;
    Ok((store, todo))
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    if raw.trim().is_empty() {
        return Err(AppError::BadRequest("The 'id' is required!".to_string()));
    }
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("The 'id' format is invalid!".to_string()))
}

fn not_found() -> AppError {
    AppError::NotFound("Todo not found!".to_string())
}

fn sample_todos() -> Vec<NewTodo> {
    [
        ("Buy milk", Some("Two liters, whole."), false),
        ("Walk the dog", None, true),
        ("Write the weekly report", Some("Include the release notes."), false),
        ("Call the plumber", None, false),
    ]
    .into_iter()
    .map(|(title, body, completed)| NewTodo {
        title: title.to_string(),
        body: body.map(str::to_string),
        completed,
    })
    .collect()
}
