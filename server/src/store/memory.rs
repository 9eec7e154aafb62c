//! In-process document store.
//!
//! Stores are named and registered process-wide, so connecting to
//! `memory://<name>` twice yields the same documents. That lets the
//! connection lifecycle in `db` drop and re-establish a handle without losing
//! data, the same way it would against a remote database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ensure_title, NewTodo, StoreError, Todo, TodoStore};

#[derive(Debug, Clone)]
struct Document {
    seq: u64,
    todo: Todo,
}

/// A named, in-memory todo collection.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    documents: RwLock<HashMap<Uuid, Document>>,
    next_seq: AtomicU64,
    reachable: AtomicBool,
    connection_attempts: AtomicU64,
}

type Registry = Mutex<HashMap<String, Arc<MemoryStore>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

impl MemoryStore {
    /// Open (or create) the store registered under `name`. An empty name maps
    /// to `default`.
    pub fn open(name: &str) -> Arc<Self> {
        let name = if name.is_empty() { "default" } else { name };
        let mut stores = registry().lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(stores.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Self {
                name: name.to_string(),
                documents: RwLock::new(HashMap::new()),
                next_seq: AtomicU64::new(0),
                reachable: AtomicBool::new(true),
                connection_attempts: AtomicU64::new(0),
            })
        }))
    }

    /// Connect to the named store, failing the way a remote server would when
    /// it has been marked unreachable.
    pub fn connect(name: &str) -> Result<Arc<Self>, StoreError> {
        let store = Self::open(name);
        store.connection_attempts.fetch_add(1, Ordering::SeqCst);
        store.check_reachable()?;
        Ok(store)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of times `connect` has been called for this store.
    pub fn connection_attempts(&self) -> u64 {
        self.connection_attempts.load(Ordering::SeqCst)
    }

    /// Simulate the backing server going away (or coming back). While
    /// unreachable, every operation and every connection attempt fails with
    /// `StoreError::Connection`.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Connection(format!(
                "memory store '{}' is unreachable",
                self.name
            )))
        }
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl TodoStore for MemoryStore {
    async fn find(&self) -> Result<Vec<Todo>, StoreError> {
        self.check_reachable()?;
        let documents = self.documents.read().await;
        let mut sorted: Vec<&Document> = documents.values().collect();
        sorted.sort_by(|a, b| {
            b.todo
                .created_at
                .cmp(&a.todo.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        Ok(sorted.into_iter().map(|doc| doc.todo.clone()).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Todo>, StoreError> {
        self.check_reachable()?;
        let documents = self.documents.read().await;
        Ok(documents.get(&id).map(|doc| doc.todo.clone()))
    }

    async fn insert(&self, todo: NewTodo) -> Result<Todo, StoreError> {
        self.check_reachable()?;
        ensure_title(&todo.title)?;
        let todo = todo.into_todo(Utc::now());
        let document = Document {
            seq: self.next_seq(),
            todo: todo.clone(),
        };
        self.documents.write().await.insert(todo.id, document);
        Ok(todo)
    }

    async fn save(&self, mut todo: Todo) -> Result<Todo, StoreError> {
        self.check_reachable()?;
        ensure_title(&todo.title)?;
        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(&todo.id)
            .ok_or(StoreError::NotFound(todo.id))?;
        todo.created_at = document.todo.created_at;
        todo.updated_at = Utc::now();
        document.todo = todo.clone();
        Ok(todo)
    }

    async fn remove(&self, id: Uuid) -> Result<bool, StoreError> {
        self.check_reachable()?;
        Ok(self.documents.write().await.remove(&id).is_some())
    }

    async fn replace_all(&self, todos: Vec<NewTodo>) -> Result<Vec<Todo>, StoreError> {
        self.check_reachable()?;
        for todo in &todos {
            ensure_title(&todo.title)?;
        }
        let mut documents = self.documents.write().await;
        documents.clear();
        let now = Utc::now();
        let mut inserted = Vec::with_capacity(todos.len());
        for todo in todos {
            let todo = todo.into_todo(now);
            documents.insert(
                todo.id,
                Document {
                    seq: self.next_seq(),
                    todo: todo.clone(),
                },
            );
            inserted.push(todo);
        }
        Ok(inserted)
    }

    fn is_connected(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Arc<MemoryStore> {
        MemoryStore::open(&Uuid::new_v4().to_string())
    }

    #[tokio::test]
    async fn find_returns_newest_first() {
        let store = fresh();
        let first = store.insert(NewTodo::new("first")).await.unwrap();
        let second = store.insert(NewTodo::new("second")).await.unwrap();
        let third = store.insert(NewTodo::new("third")).await.unwrap();

        let ids: Vec<Uuid> = store.find().await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
    }

    #[tokio::test]
    async fn insert_rejects_blank_title() {
        let store = fresh();
        let err = store.insert(NewTodo::new("  ")).await.unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));
        assert!(store.find().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_keeps_created_at_and_bumps_updated_at() {
        let store = fresh();
        let created = store.insert(NewTodo::new("walk dog")).await.unwrap();
        let mut edited = created.clone();
        edited.title = "walk cat".to_string();
        edited.created_at = chrono::DateTime::<Utc>::MIN_UTC;

        let saved = store.save(edited).await.unwrap();
        assert_eq!(saved.title, "walk cat");
        assert_eq!(saved.created_at, created.created_at);
        assert!(saved.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn save_missing_document_is_not_found() {
        let store = fresh();
        let ghost = NewTodo::new("ghost").into_todo(Utc::now());
        let err = store.save(ghost.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == ghost.id));
    }

    #[tokio::test]
    async fn remove_acknowledges_only_once() {
        let store = fresh();
        let todo = store.insert(NewTodo::new("once")).await.unwrap();
        assert!(store.remove(todo.id).await.unwrap());
        assert!(!store.remove(todo.id).await.unwrap());
    }

    #[tokio::test]
    async fn same_name_shares_documents() {
        let name = Uuid::new_v4().to_string();
        let a = MemoryStore::open(&name);
        a.insert(NewTodo::new("shared")).await.unwrap();
        let b = MemoryStore::connect(&name).unwrap();
        assert_eq!(b.find().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_store_fails_with_connection_error() {
        let store = fresh();
        store.set_reachable(false);
        assert!(!store.is_connected());
        assert!(matches!(store.find().await, Err(StoreError::Connection(_))));
        assert!(matches!(
            MemoryStore::connect(store.name()),
            Err(StoreError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn replace_all_drops_previous_documents() {
        let store = fresh();
        store.insert(NewTodo::new("old")).await.unwrap();
        let seeded = store
            .replace_all(vec![NewTodo::new("a"), NewTodo::new("b")])
            .await
            .unwrap();
        assert_eq!(seeded.len(), 2);
        let titles: Vec<String> = store.find().await.unwrap().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["b".to_string(), "a".to_string()]);
    }
}
