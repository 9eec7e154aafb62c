//! Postgres-backed document store.
//!
//! Each todo is kept whole as a JSONB document next to the columns needed for
//! lookup and ordering. `seq` breaks ties between documents created in the
//! same instant so listing stays newest-first.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::{ensure_title, NewTodo, StoreError, Todo, TodoStore};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS todos (
    id UUID PRIMARY KEY,
    seq BIGSERIAL NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    data JSONB NOT NULL
)";

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Todo collection stored in a Postgres table.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing pool. The `todos` table must already exist.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `url` and make sure the table exists.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        info!("postgres todo store ready");
        Ok(Self { pool })
    }

    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TodoStore for PostgresStore {
    async fn find(&self) -> Result<Vec<Todo>, StoreError> {
        let rows: Vec<(Json<Todo>,)> =
            sqlx::query_as("SELECT data FROM todos ORDER BY created_at DESC, seq DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(Json(todo),)| todo).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Todo>, StoreError> {
        let row: Option<(Json<Todo>,)> = sqlx::query_as("SELECT data FROM todos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(Json(todo),)| todo))
    }

    async fn insert(&self, todo: NewTodo) -> Result<Todo, StoreError> {
        ensure_title(&todo.title)?;
        let todo = todo.into_todo(Utc::now());
        sqlx::query("INSERT INTO todos (id, created_at, data) VALUES ($1, $2, $3)")
            .bind(todo.id)
            .bind(todo.created_at)
            .bind(Json(&todo))
            .execute(&self.pool)
            .await?;
        Ok(todo)
    }

    async fn save(&self, mut todo: Todo) -> Result<Todo, StoreError> {
        ensure_title(&todo.title)?;
        let mut tx = self.pool.begin().await?;
        let existing: Option<(Json<Todo>,)> =
            sqlx::query_as("SELECT data FROM todos WHERE id = $1 FOR UPDATE")
                .bind(todo.id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((Json(existing),)) = existing else {
            return Err(StoreError::NotFound(todo.id));
        };
        todo.created_at = existing.created_at;
        todo.updated_at = Utc::now();
        sqlx::query("UPDATE todos SET data = $2 WHERE id = $1")
            .bind(todo.id)
            .bind(Json(&todo))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(todo)
    }

    async fn remove(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM todos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_all(&self, todos: Vec<NewTodo>) -> Result<Vec<Todo>, StoreError> {
        for todo in &todos {
            ensure_title(&todo.title)?;
        }
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM todos").execute(&mut *tx).await?;
        let mut inserted = Vec::with_capacity(todos.len());
        for todo in todos {
            let todo = todo.into_todo(now);
            sqlx::query("INSERT INTO todos (id, created_at, data) VALUES ($1, $2, $3)")
                .bind(todo.id)
                .bind(todo.created_at)
                .bind(Json(&todo))
                .execute(&mut *tx)
                .await?;
            inserted.push(todo);
        }
        tx.commit().await?;
        Ok(inserted)
    }

    fn is_connected(&self) -> bool {
        !self.pool.is_closed()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
