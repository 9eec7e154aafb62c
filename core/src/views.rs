//! View models for the list, detail and form screens.
//!
//! Views never fail to render. Every field read from the cache is treated as
//! possibly absent and replaced with a fallback, and a value of the wrong
//! shape renders as `Malformed` instead of surfacing as an error.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::app::Resource;
use crate::cache::ReadState;
use crate::client::todo_key;
use crate::error::ApiError;
use crate::types::{CreateTodo, Todo, UpdateTodo};

pub const TITLE_REQUIRED: &str = "A title is required.";
pub const UNTITLED: &str = "Untitled";

const TODOS_UNAVAILABLE: &str = "Whoops! There was a problem getting the todos!";
const TODO_UNAVAILABLE: &str = "Whoops! There was a problem getting the todo!";

/// Whether error views may show the underlying error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayMode {
    Development,
    #[default]
    Production,
}

impl DisplayMode {
    fn describe(self, error: &ApiError, fallback: &str) -> String {
        match self {
            Self::Development => error.server_message().unwrap_or_else(|| error.to_string()),
            Self::Production => fallback.to_string(),
        }
    }
}

/// One line of the todo list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoRow {
    pub id: Uuid,
    pub title: String,
    pub completed: bool,
    /// Path of the detail screen.
    pub href: String,
    pub edit_href: String,
}

impl From<&Todo> for TodoRow {
    fn from(todo: &Todo) -> Self {
        let href = todo_key(todo.id).replacen("/api", "", 1);
        Self {
            id: todo.id,
            title: display_title(&todo.title),
            completed: todo.completed,
            edit_href: format!("{href}/update"),
            href,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListView {
    Loading,
    Error(String),
    Empty,
    /// Rows to render. A failed revalidation keeps the rows and reports the
    /// error alongside them.
    Populated {
        rows: Vec<TodoRow>,
        stale_error: Option<String>,
    },
    /// The cached value is not a list.
    Malformed,
}

impl ListView {
    pub fn from_state(state: &ReadState<Resource>, mode: DisplayMode) -> Self {
        let error = state
            .error
            .as_ref()
            .map(|error| mode.describe(error, TODOS_UNAVAILABLE));
        match (&state.data, error) {
            (Some(Resource::Todos(todos)), error) if !todos.is_empty() => Self::Populated {
                rows: todos.iter().map(TodoRow::from).collect(),
                stale_error: error,
            },
            (Some(Resource::Todos(_)), None) => Self::Empty,
            (Some(Resource::Todo(_)), _) => Self::Malformed,
            (_, Some(error)) => Self::Error(error),
            (None, None) => Self::Loading,
        }
    }
}

/// Fields of a todo as the detail screen shows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoDetail {
    pub id: Uuid,
    pub title: String,
    /// `None` when the todo has no body or an empty one.
    pub body: Option<String>,
    pub completed: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Todo> for TodoDetail {
    fn from(todo: &Todo) -> Self {
        Self {
            id: todo.id,
            title: display_title(&todo.title),
            body: todo.body.clone().filter(|body| !body.is_empty()),
            completed: todo.completed,
            created_at: todo.created_at,
            updated_at: todo.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailView {
    Loading,
    Error(String),
    Ready {
        todo: TodoDetail,
        stale_error: Option<String>,
    },
    /// The cached value is not a single todo.
    Malformed,
}

impl DetailView {
    pub fn from_state(state: &ReadState<Resource>, mode: DisplayMode) -> Self {
        let error = state
            .error
            .as_ref()
            .map(|error| mode.describe(error, TODO_UNAVAILABLE));
        match (&state.data, error) {
            (Some(Resource::Todo(todo)), error) => Self::Ready {
                todo: TodoDetail::from(todo),
                stale_error: error,
            },
            (Some(Resource::Todos(_)), _) => Self::Malformed,
            (None, Some(error)) => Self::Error(error),
            (None, None) => Self::Loading,
        }
    }
}

fn display_title(title: &str) -> String {
    if title.trim().is_empty() {
        UNTITLED.to_string()
    } else {
        title.to_string()
    }
}

/// Client-side copy of the server's title rule.
pub fn validate_title(title: &str) -> Result<(), String> {
    if title.trim().is_empty() {
        Err(TITLE_REQUIRED.to_string())
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormField {
    pub value: String,
    pub touched: bool,
    pub error: Option<String>,
}

impl FormField {
    fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }
}

/// State of the create and update forms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoForm {
    pub title: FormField,
    pub body: FormField,
    pub completed: bool,
}

impl TodoForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update form pre-filled from an existing todo.
    pub fn from_todo(todo: &Todo) -> Self {
        Self {
            title: FormField::with_value(todo.title.clone()),
            body: FormField::with_value(todo.body.clone().unwrap_or_default()),
            completed: todo.completed,
        }
    }

    /// Set the title and re-check it, as on every keystroke.
    pub fn set_title(&mut self, value: impl Into<String>) {
        self.title.value = value.into();
        self.title.touched = true;
        self.title.error = validate_title(&self.title.value).err();
    }

    pub fn set_body(&mut self, value: impl Into<String>) {
        self.body.value = value.into();
        self.body.touched = true;
        self.body.error = None;
    }

    pub fn set_completed(&mut self, completed: bool) {
        self.completed = completed;
    }

    /// Touch every field and run the client-side rules. Returns whether the
    /// form may be submitted.
    pub fn validate(&mut self) -> bool {
        self.title.touched = true;
        self.body.touched = true;
        self.title.error = validate_title(&self.title.value).err();
        !self.has_errors()
    }

    pub fn has_errors(&self) -> bool {
        self.title.error.is_some() || self.body.error.is_some()
    }

    /// The submit button is disabled once every field was touched and any of
    /// them is invalid.
    pub fn can_submit(&self) -> bool {
        !(self.title.touched && self.body.touched && self.has_errors())
    }

    /// Copy per-field messages from a server rejection onto the form.
    /// Returns whether the error carried any.
    pub fn apply_server_errors(&mut self, error: &ApiError) -> bool {
        let Some(errors) = error.field_errors() else {
            return false;
        };
        if let Some(message) = errors.get("title") {
            self.title.touched = true;
            self.title.error = Some(message.clone());
        }
        if let Some(message) = errors.get("body") {
            self.body.touched = true;
            self.body.error = Some(message.clone());
        }
        true
    }

    pub fn to_create(&self) -> CreateTodo {
        CreateTodo {
            title: self.title.value.clone(),
            body: Some(self.body.value.clone()).filter(|body| !body.is_empty()),
            completed: self.completed,
        }
    }

    pub fn to_update(&self) -> UpdateTodo {
        UpdateTodo {
            title: Some(self.title.value.clone()),
            body: Some(self.body.value.clone()),
            completed: Some(self.completed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Transient notification (toast) raised by a user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}
