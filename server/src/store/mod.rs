//! Persistence layer for todo documents.
//!
//! # Design
//! `TodoStore` is the seam between the HTTP handlers and whatever holds the
//! documents. Two backends implement it: an in-process document store used by
//! tests and local runs, and a Postgres-backed store that keeps each todo as a
//! JSONB document. Handlers never see a backend directly; they obtain an
//! `Arc<dyn TodoStore>` from `db::Database`, which owns the connection
//! lifecycle.
//!
//! Both backends enforce the schema on `insert` and `save`: a todo whose title
//! is blank never reaches storage, even if a handler forgot to validate.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// A persisted todo document.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a document that has not been stored yet. The store assigns the
/// id and both timestamps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTodo {
    pub title: String,
    pub body: Option<String>,
    pub completed: bool,
}

impl NewTodo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: None,
            completed: false,
        }
    }

    pub(crate) fn into_todo(self, now: DateTime<Utc>) -> Todo {
        Todo {
            id: Uuid::new_v4(),
            title: self.title,
            body: self.body,
            completed: self.completed,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Errors raised by a `TodoStore` backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A document violated the schema (blank title).
    #[error("schema validation failed: {0}")]
    Schema(String),

    /// `save` targeted a document that no longer exists.
    #[error("todo {0} not found")]
    NotFound(Uuid),

    /// Any other backend failure.
    #[error("query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Connection(error.to_string()),
            other => Self::Query(other.to_string()),
        }
    }
}

/// Document operations over the single `todos` collection.
#[async_trait]
pub trait TodoStore: Send + Sync {
    /// All documents, newest `created_at` first.
    async fn find(&self) -> Result<Vec<Todo>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Todo>, StoreError>;

    async fn insert(&self, todo: NewTodo) -> Result<Todo, StoreError>;

    /// Rewrite the whole document and bump `updated_at`.
    async fn save(&self, todo: Todo) -> Result<Todo, StoreError>;

    /// Returns whether a document was removed.
    async fn remove(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Drop every document and insert `todos` in order.
    async fn replace_all(&self, todos: Vec<NewTodo>) -> Result<Vec<Todo>, StoreError>;

    /// Whether the underlying connection is still usable.
    fn is_connected(&self) -> bool;

    async fn close(&self);
}

/// Reject titles that are empty or whitespace-only.
pub(crate) fn ensure_title(title: &str) -> Result<(), StoreError> {
    if title.trim().is_empty() {
        return Err(StoreError::Schema("title is required".to_string()));
    }
    Ok(())
}
