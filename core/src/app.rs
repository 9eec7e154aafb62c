//! Session facade: one client, one transport, one cache.
//!
//! `TodoApp` is what the screens talk to. Reads go through the cache keyed by
//! request path; every action runs as a cache mutation and settles into a
//! `Notice` for the user.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::cache::{Cache, CacheConfig, MutateOptions, MutationOutcome, ReadState};
use crate::client::{parse_todo_key, todo_key, TodoClient, TODOS_KEY};
use crate::error::ApiError;
use crate::transport::Transport;
use crate::types::{Todo, UpdateTodo};
use crate::views::{DetailView, DisplayMode, ListView, Notice, TodoForm};

pub const CREATED: &str = "The todo has been created!";
pub const CREATE_FAILED: &str = "Unable to create the todo!";
pub const UPDATED: &str = "The todo has been updated!";
pub const UPDATE_FAILED: &str = "Unable to update the todo!";
pub const TOGGLE_FAILED: &str = "Unable to update the completed status!";
pub const DELETED: &str = "The todo has been deleted!";
pub const DELETE_FAILED: &str = "Unable to delete the todo!";
pub const FORM_INVALID: &str = "Form validation errors found!";

/// Value cached under a request path: the list under `TODOS_KEY`, a single
/// todo under `todo_key(id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Todos(Vec<Todo>),
    Todo(Todo),
}

pub struct TodoApp<T> {
    client: TodoClient,
    transport: Arc<T>,
    cache: Cache<Resource>,
    mode: DisplayMode,
}

impl<T: Transport> TodoApp<T> {
    pub fn new(base_url: &str, transport: T) -> Self {
        Self::with_config(base_url, transport, CacheConfig::default())
    }

    pub fn with_config(base_url: &str, transport: T, config: CacheConfig) -> Self {
        let client = TodoClient::new(base_url);
        let transport = Arc::new(transport);
        let cache = Cache::with_config(config, {
            let client = client.clone();
            let transport = Arc::clone(&transport);
            move |key: String| fetch(client.clone(), Arc::clone(&transport), key)
        });
        Self {
            client,
            transport,
            cache,
            mode: DisplayMode::default(),
        }
    }

    #[must_use]
    pub fn with_display_mode(mut self, mode: DisplayMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn cache(&self) -> &Cache<Resource> {
        &self.cache
    }

    pub async fn todos(&self) -> ReadState<Resource> {
        self.cache.read(TODOS_KEY).await
    }

    pub async fn todo(&self, id: Uuid) -> ReadState<Resource> {
        self.cache.read(&todo_key(id)).await
    }

    pub async fn list_view(&self) -> ListView {
        ListView::from_state(&self.todos().await, self.mode)
    }

    pub async fn detail_view(&self, id: Uuid) -> DetailView {
        DetailView::from_state(&self.todo(id).await, self.mode)
    }

    /// Validate the form, then create the todo and put it at the head of the
    /// cached list.
    pub async fn create(&self, form: &mut TodoForm) -> Result<Notice, Notice> {
        if !form.validate() {
            return Err(Notice::error(FORM_INVALID));
        }
        let request = self
            .client
            .build_create_todo(&form.to_create())
            .map_err(|_| Notice::error(CREATE_FAILED))?;

        let result = self
            .cache
            .mutate(
                TODOS_KEY,
                |todos| async move {
                    let response = self.transport.execute(request).await?;
                    let created = self.client.parse_create_todo(response)?;
                    let mut list = list_of(todos.as_ref());
                    list.insert(0, created);
                    Ok(Resource::Todos(list))
                },
                MutateOptions::new(),
            )
            .await;

        match result {
            Ok(_) => {
                *form = TodoForm::new();
                Ok(Notice::success(CREATED))
            }
            Err(error) => Err(rejected(form, &error, CREATE_FAILED)),
        }
    }

    /// Validate the form, then save it over the todo with `id`.
    pub async fn update(&self, id: Uuid, form: &mut TodoForm) -> Result<Notice, Notice> {
        if !form.validate() {
            return Err(Notice::error(FORM_INVALID));
        }
        let request = self
            .client
            .build_update_todo(id, &form.to_update())
            .map_err(|_| Notice::error(UPDATE_FAILED))?;

        let result = self
            .cache
            .mutate(
                &todo_key(id),
                |_| async move {
                    let response = self.transport.execute(request).await?;
                    self.client.parse_update_todo(response).map(Resource::Todo)
                },
                MutateOptions::new().revalidate(false),
            )
            .await;

        match result {
            Ok(MutationOutcome::Committed(Resource::Todo(updated))) => {
                self.sync_list(updated).await;
                Ok(Notice::success(UPDATED))
            }
            Ok(_) => Ok(Notice::success(UPDATED)),
            Err(error) => Err(rejected(form, &error, UPDATE_FAILED)),
        }
    }

    /// Flip `completed` in the cached list immediately, then confirm with the
    /// server. The list rolls back if the request fails.
    pub async fn toggle_completed(&self, todo: &Todo) -> Result<Notice, Notice> {
        let id = todo.id;
        let completed = !todo.completed;
        let request = self
            .client
            .build_update_todo(id, &UpdateTodo::completed(completed))
            .map_err(|_| Notice::error(TOGGLE_FAILED))?;

        let result = self
            .cache
            .mutate(
                TODOS_KEY,
                |todos| async move {
                    let response = self.transport.execute(request).await?;
                    let updated = self.client.parse_update_todo(response)?;
                    Ok(Resource::Todos(replaced(list_of(todos.as_ref()), updated)))
                },
                MutateOptions::new().optimistic_data(move |todos| {
                    let list = list_of(todos)
                        .into_iter()
                        .map(|mut todo| {
                            if todo.id == id {
                                todo.completed = completed;
                            }
                            todo
                        })
                        .collect();
                    Resource::Todos(list)
                }),
            )
            .await;

        match result {
            Ok(outcome) => {
                if let MutationOutcome::Committed(Resource::Todos(list)) = outcome {
                    if let Some(updated) = list.into_iter().find(|todo| todo.id == id) {
                        self.refresh_item(updated).await;
                    }
                }
                Ok(Notice::success(UPDATED))
            }
            Err(error) => {
                debug!(%id, %error, "toggle failed");
                Err(Notice::error(TOGGLE_FAILED))
            }
        }
    }

    /// Drop the todo from the cached list immediately, then delete it on the
    /// server. The list rolls back if the request fails.
    pub async fn delete(&self, todo: &Todo) -> Result<Notice, Notice> {
        let id = todo.id;
        let request = self.client.build_delete_todo(id);

        let result = self
            .cache
            .mutate(
                TODOS_KEY,
                |todos| async move {
                    let response = self.transport.execute(request).await?;
                    self.client.parse_delete_todo(response)?;
                    Ok(Resource::Todos(without(list_of(todos.as_ref()), id)))
                },
                MutateOptions::new()
                    .optimistic_data(move |todos| Resource::Todos(without(list_of(todos), id))),
            )
            .await;

        match result {
            Ok(_) => {
                self.cache.invalidate(&todo_key(id));
                Ok(Notice::success(DELETED))
            }
            Err(error) => {
                debug!(%id, %error, "delete failed");
                Err(Notice::error(DELETE_FAILED))
            }
        }
    }

    /// Write a confirmed todo into the cached list, if there is one.
    async fn sync_list(&self, todo: Todo) {
        if self.cache.snapshot(TODOS_KEY).data.is_none() {
            return;
        }
        let result = self
            .cache
            .mutate(
                TODOS_KEY,
                |todos| async move { Ok(Resource::Todos(replaced(list_of(todos.as_ref()), todo))) },
                MutateOptions::new(),
            )
            .await;
        if let Err(error) = result {
            debug!(%error, "could not sync todo into cached list");
        }
    }

    /// Write a confirmed todo into its own key, if it is cached.
    async fn refresh_item(&self, todo: Todo) {
        let key = todo_key(todo.id);
        if self.cache.snapshot(&key).data.is_none() {
            return;
        }
        let result = self
            .cache
            .mutate(
                &key,
                |_| async move { Ok(Resource::Todo(todo)) },
                MutateOptions::new().revalidate(false),
            )
            .await;
        if let Err(error) = result {
            debug!(%error, "could not refresh cached todo");
        }
    }
}

async fn fetch<T: Transport>(
    client: TodoClient,
    transport: Arc<T>,
    key: String,
) -> Result<Resource, ApiError> {
    if key == TODOS_KEY {
        let response = transport.execute(client.build_list_todos()).await?;
        return client.parse_list_todos(response).map(Resource::Todos);
    }
    let Some(id) = parse_todo_key(&key) else {
        debug!(key = %key, "no endpoint for cache key");
        return Err(ApiError::NotFound);
    };
    let response = transport.execute(client.build_get_todo(id)).await?;
    client.parse_get_todo(response).map(Resource::Todo)
}

/// Notice for a failed form submission, moving any field errors onto the form.
fn rejected(form: &mut TodoForm, error: &ApiError, fallback: &str) -> Notice {
    if form.apply_server_errors(error) {
        Notice::error(FORM_INVALID)
    } else {
        debug!(%error, "form submission failed");
        Notice::error(fallback)
    }
}

fn list_of(resource: Option<&Resource>) -> Vec<Todo> {
    match resource {
        Some(Resource::Todos(todos)) => todos.clone(),
        _ => Vec::new(),
    }
}

fn replaced(mut todos: Vec<Todo>, todo: Todo) -> Vec<Todo> {
    if let Some(slot) = todos.iter_mut().find(|t| t.id == todo.id) {
        *slot = todo;
    }
    todos
}

fn without(mut todos: Vec<Todo>, id: Uuid) -> Vec<Todo> {
    todos.retain(|todo| todo.id != id);
    todos
}
