//! HTTP service for the todo list.
//!
//! # Overview
//! Two endpoints over a single collection of todo documents:
//! `/api/todos` (list, create) and `/api/todos/{id}` (read, update, delete).
//! Every response uses the `{ data, message, success }` envelope from
//! `error`.
//!
//! # Design
//! - `AppState` owns an explicit `db::Database` handle; there is no global
//!   connection.
//! - Request bodies are typed per endpoint (`payload`) and validated before
//!   they reach the store.
//! - DTOs are defined independently from the `todo-core` client crate;
//!   integration tests catch schema drift.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod payload;
pub mod store;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::error;

pub use config::{Config, Environment};
pub use db::Database;
pub use error::{AppError, Envelope};
pub use store::{NewTodo, StoreError, Todo, TodoStore};

/// State shared by every handler.
#[derive(Clone, Debug)]
pub struct AppState {
    pub db: Arc<Database>,
    pub environment: Environment,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            db: Arc::new(Database::new(config.database_url.clone())),
            environment: config.environment,
        }
    }

    /// Live store handle; a connection failure becomes a 500.
    pub async fn store(&self) -> Result<Arc<dyn TodoStore>, AppError> {
        self.db.connection().await.map_err(|e| self.store_failure(e))
    }

    /// Translate a store error into the handler error the client sees.
    pub fn store_failure(&self, err: StoreError) -> AppError {
        if let StoreError::NotFound(_) = err {
            return AppError::NotFound("Todo not found!".to_string());
        }
        error!(error = %err, "persistence failure");
        AppError::Internal {
            detail: self.environment.is_development().then(|| err.to_string()),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        .route(
            "/api/todos",
            get(handlers::list_todos)
                .post(handlers::create_todo)
                .fallback(handlers::collection_method_not_allowed),
        )
        .route(
            "/api/todos/{id}",
            get(handlers::get_todo)
                .patch(handlers::update_todo)
                .delete(handlers::delete_todo)
                .fallback(handlers::item_method_not_allowed),
        );
    if state.environment.is_development() {
        router = router.route(
            "/api/seed",
            post(handlers::seed).fallback(handlers::seed_method_not_allowed),
        );
    }
    router
        .fallback(handlers::route_not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app(state)).await
}
