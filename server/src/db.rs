//! Connection lifecycle for the todo store.
//!
//! # Design
//! `Database` is created once at startup from the configured connection
//! string and shared through the application state. It connects lazily on
//! the first request, hands out the same store handle while that handle
//! reports itself connected, and otherwise replaces it with a fresh
//! connection. Each call makes at most one connection attempt.
//!
//! Two requests that both find a dead handle may race to reconnect. The
//! second re-checks under the write lock and reuses the first one's handle,
//! so the worst case is one redundant attempt, never a corrupted slot.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::store::{MemoryStore, PostgresStore, StoreError, TodoStore};

/// Shared handle to the todo store, created from a connection string.
pub struct Database {
    url: String,
    connection: RwLock<Option<Arc<dyn TodoStore>>>,
}

impl Database {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection: RwLock::new(None),
        }
    }

    /// Return a live store handle, connecting or reconnecting as needed.
    pub async fn connection(&self) -> Result<Arc<dyn TodoStore>, StoreError> {
        if let Some(store) = self.connection.read().await.as_ref() {
            if store.is_connected() {
                return Ok(Arc::clone(store));
            }
        }

        let mut slot = self.connection.write().await;
        if let Some(store) = slot.as_ref() {
            if store.is_connected() {
                debug!("connection re-established by a concurrent request");
                return Ok(Arc::clone(store));
            }
        }
        if let Some(stale) = slot.take() {
            warn!("previous connection is no longer usable; reconnecting");
            stale.close().await;
        } else {
            info!("no previous connection; connecting");
        }

        let store = connect(&self.url).await?;
        *slot = Some(Arc::clone(&store));
        info!(scheme = scheme(&self.url), "database connected");
        Ok(store)
    }

    /// Whether a usable handle is currently held. Does not connect.
    pub async fn is_connected(&self) -> bool {
        self.connection
            .read()
            .await
            .as_ref()
            .is_some_and(|store| store.is_connected())
    }

    /// Close and drop the current handle; the next call to `connection`
    /// reconnects.
    pub async fn disconnect(&self) {
        if let Some(store) = self.connection.write().await.take() {
            store.close().await;
            info!("database disconnected");
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("scheme", &scheme(&self.url))
            .finish_non_exhaustive()
    }
}

async fn connect(url: &str) -> Result<Arc<dyn TodoStore>, StoreError> {
    let store: Arc<dyn TodoStore> = match url.split_once("://") {
        Some(("memory", name)) => MemoryStore::connect(name)?,
        Some(("postgres" | "postgresql", _)) => Arc::new(PostgresStore::connect(url).await?),
        _ => {
            return Err(StoreError::Connection(format!(
                "unsupported connection string scheme '{}'",
                scheme(url)
            )))
        }
    };
    Ok(store)
}

/// Scheme of a connection string, for logging without leaking credentials.
fn scheme(url: &str) -> &str {
    url.split_once("://").map_or("unknown", |(scheme, _)| scheme)
}
