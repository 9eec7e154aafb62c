//! Client core for the todo service.
//!
//! # Overview
//! `TodoClient` builds `HttpRequest` values and parses `HttpResponse` values
//! without touching the network. A `Transport` performs the round-trip, the
//! `Cache` deduplicates reads and applies optimistic mutations, and the view
//! models in `views` turn cache state into what each screen shows.
//! `TodoApp` wires all of them together for one session.
//!
//! # Design
//! - `TodoClient` is stateless; it holds only `base_url`.
//! - Each CRUD operation is split into `build_*` (produces request) and
//!   `parse_*` (consumes response), so the I/O boundary is explicit.
//! - The cache is keyed by request path and generic over the cached value.
//! - DTOs are defined independently from the server crate; integration tests
//!   catch schema drift.

pub mod app;
pub mod cache;
pub mod client;
pub mod error;
pub mod http;
pub mod mutation;
pub mod transport;
pub mod types;
pub mod views;

pub use app::{Resource, TodoApp};
pub use cache::{Cache, CacheConfig, MutateOptions, MutationOutcome, ReadState};
pub use client::{todo_key, TodoClient, TODOS_KEY};
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use mutation::{Mutation, MutationState};
pub use transport::{Transport, UreqTransport};
pub use types::{CreateTodo, Todo, UpdateTodo};
pub use views::{DetailView, DisplayMode, ListView, Notice, NoticeKind, TodoForm};
