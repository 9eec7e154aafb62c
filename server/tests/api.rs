use axum::http::{self, header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use todo_server::store::MemoryStore;
use todo_server::{app, AppState, Config, Environment, Todo};
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    store_name: String,
}

impl TestApp {
    fn new(environment: Environment) -> Self {
        let store_name = Uuid::new_v4().to_string();
        let config = Config::new(format!("memory://{store_name}")).with_environment(environment);
        Self {
            router: app(AppState::new(&config)),
            store_name,
        }
    }

    fn production() -> Self {
        Self::new(Environment::Production)
    }

    async fn send(&self, request: Request<String>) -> axum::response::Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn create(&self, title: &str) -> Todo {
        let body = serde_json::json!({ "title": title }).to_string();
        let resp = self.send(json_request("POST", "/api/todos", &body)).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        data(resp).await
    }

    async fn list(&self) -> Vec<Todo> {
        let resp = self.send(empty_request("GET", "/api/todos")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        data(resp).await
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes: bytes::Bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Deserialize the envelope's `data` field.
async fn data<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let envelope = body_json(response).await;
    assert_eq!(envelope["success"], true);
    serde_json::from_value(envelope["data"].clone()).unwrap()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(String::new())
        .unwrap()
}

fn assert_failure_envelope(envelope: &Value) {
    assert_eq!(envelope["success"], false);
    assert!(envelope["data"].is_null());
    assert!(envelope["message"].is_string());
}

// --- list ---

#[tokio::test]
async fn list_todos_empty() {
    let app = TestApp::production();
    let resp = app.send(empty_request("GET", "/api/todos")).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let envelope = body_json(resp).await;
    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["data"], serde_json::json!([]));
}

#[tokio::test]
async fn list_after_creates_and_deletes_is_newest_first() {
    let app = TestApp::production();
    let mut created = Vec::new();
    for n in 0..5 {
        created.push(app.create(&format!("todo {n}")).await);
    }
    for todo in [&created[1], &created[3]] {
        let resp = app
            .send(empty_request("DELETE", &format!("/api/todos/{}", todo.id)))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let ids: Vec<Uuid> = app.list().await.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![created[4].id, created[2].id, created[0].id]);
}

// --- create ---

#[tokio::test]
async fn create_todo_returns_201() {
    let app = TestApp::production();
    let resp = app
        .send(json_request("POST", "/api/todos", r#"{"title":"Buy milk"}"#))
        .await;

    assert_eq!(resp.status(), StatusCode::CREATED);
    let envelope = body_json(resp).await;
    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["data"]["title"], "Buy milk");
    assert_eq!(envelope["data"]["completed"], false);
    assert!(envelope["data"]["createdAt"].is_string());
    assert!(envelope["data"]["updatedAt"].is_string());
}

#[tokio::test]
async fn create_todo_keeps_body() {
    let app = TestApp::production();
    let resp = app
        .send(json_request(
            "POST",
            "/api/todos",
            r#"{"title":"Groceries","body":"eggs, bread"}"#,
        ))
        .await;

    assert_eq!(resp.status(), StatusCode::CREATED);
    let todo: Todo = data(resp).await;
    assert_eq!(todo.body.as_deref(), Some("eggs, bread"));
}

#[tokio::test]
async fn create_todo_blank_title_returns_400_with_field_error() {
    let app = TestApp::production();
    for body in [r#"{}"#, r#"{"title":""}"#, r#"{"title":"   "}"#, r#"{"body":"no title"}"#] {
        let resp = app.send(json_request("POST", "/api/todos", body)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
        let envelope = body_json(resp).await;
        assert_failure_envelope(&envelope);
        assert_eq!(envelope["errors"]["title"], "A title is required.", "{body}");
    }
    assert!(app.list().await.is_empty());
}

#[tokio::test]
async fn create_todo_malformed_json_returns_400() {
    let app = TestApp::production();
    let resp = app
        .send(json_request("POST", "/api/todos", r#"{"title": "#))
        .await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let envelope = body_json(resp).await;
    assert_failure_envelope(&envelope);
    assert!(envelope.get("errors").is_none());
}

#[tokio::test]
async fn create_todo_without_json_body_returns_title_field_error() {
    let app = TestApp::production();
    let plain = Request::builder()
        .method("POST")
        .uri("/api/todos")
        .header(http::header::CONTENT_TYPE, "text/plain")
        .body("Buy milk".to_string())
        .unwrap();
    for request in [empty_request("POST", "/api/todos"), plain] {
        let resp = app.send(request).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let envelope = body_json(resp).await;
        assert_failure_envelope(&envelope);
        assert_eq!(envelope["errors"]["title"], "A title is required.");
    }
    assert!(app.list().await.is_empty());
}

// --- get ---

#[tokio::test]
async fn get_todo_not_found() {
    let app = TestApp::production();
    let resp = app
        .send(empty_request(
            "GET",
            "/api/todos/00000000-0000-0000-0000-000000000000",
        ))
        .await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_failure_envelope(&body_json(resp).await);
}

#[tokio::test]
async fn get_todo_bad_uuid_returns_400() {
    let app = TestApp::production();
    let resp = app.send(empty_request("GET", "/api/todos/not-a-uuid")).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_failure_envelope(&body_json(resp).await);
}

// --- update ---

#[tokio::test]
async fn update_todo_not_found() {
    let app = TestApp::production();
    let resp = app
        .send(json_request(
            "PATCH",
            "/api/todos/00000000-0000-0000-0000-000000000000",
            r#"{"title":"Nope"}"#,
        ))
        .await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_todo_blank_title_leaves_document_untouched() {
    let app = TestApp::production();
    let todo = app.create("Original").await;

    let resp = app
        .send(json_request(
            "PATCH",
            &format!("/api/todos/{}", todo.id),
            r#"{"title":"  ","completed":true}"#,
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let envelope = body_json(resp).await;
    assert_eq!(envelope["errors"]["title"], "A title is required.");

    let stored = app.list().await;
    assert_eq!(stored, vec![todo]);
}

#[tokio::test]
async fn update_todo_sets_body() {
    let app = TestApp::production();
    let todo = app.create("With notes").await;

    let resp = app
        .send(json_request(
            "PATCH",
            &format!("/api/todos/{}", todo.id),
            r#"{"body":"remember the receipt"}"#,
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Todo = data(resp).await;
    assert_eq!(updated.title, "With notes");
    assert_eq!(updated.body.as_deref(), Some("remember the receipt"));
    assert_eq!(updated.created_at, todo.created_at);
}

// --- delete ---

#[tokio::test]
async fn delete_todo_not_found() {
    let app = TestApp::production();
    let resp = app
        .send(empty_request(
            "DELETE",
            "/api/todos/00000000-0000-0000-0000-000000000000",
        ))
        .await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_todo_malformed_id_returns_400() {
    let app = TestApp::production();
    let resp = app.send(empty_request("DELETE", "/api/todos/12345")).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- method handling ---

#[tokio::test]
async fn collection_rejects_unsupported_methods() {
    let app = TestApp::production();
    for method in ["PUT", "PATCH", "DELETE"] {
        let resp = app.send(empty_request(method, "/api/todos")).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
        assert_eq!(resp.headers()[header::ALLOW], "GET, POST");
        let envelope = body_json(resp).await;
        assert_failure_envelope(&envelope);
        assert_eq!(
            envelope["message"],
            format!("The {method} method is not allowed for this endpoint!")
        );
    }
}

#[tokio::test]
async fn item_rejects_unsupported_methods() {
    let app = TestApp::production();
    for method in ["POST", "PUT"] {
        let resp = app
            .send(empty_request(
                method,
                "/api/todos/00000000-0000-0000-0000-000000000000",
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
        assert_eq!(resp.headers()[header::ALLOW], "GET, PATCH, DELETE");
    }
}

#[tokio::test]
async fn unknown_route_returns_404_envelope() {
    let app = TestApp::production();
    let resp = app.send(empty_request("GET", "/api/nothing")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_failure_envelope(&body_json(resp).await);
}

// --- persistence failures ---

#[tokio::test]
async fn unreachable_store_returns_generic_500_in_production() {
    let app = TestApp::production();
    app.create("before outage").await;
    MemoryStore::open(&app.store_name).set_reachable(false);

    let resp = app.send(empty_request("GET", "/api/todos")).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let envelope = body_json(resp).await;
    assert_failure_envelope(&envelope);
    assert_eq!(envelope["message"], "Request failed!");

    MemoryStore::open(&app.store_name).set_reachable(true);
    assert_eq!(app.list().await.len(), 1);
}

#[tokio::test]
async fn unreachable_store_exposes_detail_in_development() {
    let app = TestApp::new(Environment::Development);
    MemoryStore::open(&app.store_name).set_reachable(false);

    let resp = app
        .send(json_request("POST", "/api/todos", r#"{"title":"lost"}"#))
        .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let envelope = body_json(resp).await;
    assert!(envelope["message"]
        .as_str()
        .unwrap()
        .contains("unreachable"));
}

// --- seed ---

#[tokio::test]
async fn seed_replaces_collection_in_development() {
    let app = TestApp::new(Environment::Development);
    app.create("will be replaced").await;

    let resp = app.send(empty_request("POST", "/api/seed")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let seeded: Vec<Todo> = data(resp).await;
    assert!(!seeded.is_empty());

    let listed = app.list().await;
    assert_eq!(listed.len(), seeded.len());
    assert!(listed.iter().all(|t| t.title != "will be replaced"));

    let resp = app.send(empty_request("GET", "/api/seed")).await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(resp.headers()[header::ALLOW], "POST");
}

#[tokio::test]
async fn seed_is_not_routed_in_production() {
    let app = TestApp::production();
    let resp = app.send(empty_request("POST", "/api/seed")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- full CRUD lifecycle ---

#[tokio::test]
async fn crud_lifecycle() {
    let app = TestApp::production();

    // create
    let created = app.create("Walk dog").await;
    assert_eq!(created.title, "Walk dog");
    assert!(!created.completed);
    let id = created.id;

    // list — should contain the one todo
    let todos = app.list().await;
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].id, id);

    // get
    let resp = app.send(empty_request("GET", &format!("/api/todos/{id}"))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let fetched: Todo = data(resp).await;
    assert_eq!(fetched, created);

    // update — partial: only completed
    let resp = app
        .send(json_request(
            "PATCH",
            &format!("/api/todos/{id}"),
            r#"{"completed":true}"#,
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Todo = data(resp).await;
    assert_eq!(updated.title, "Walk dog"); // unchanged
    assert!(updated.completed);

    // update — partial: only title
    let resp = app
        .send(json_request(
            "PATCH",
            &format!("/api/todos/{id}"),
            r#"{"title":"Walk cat"}"#,
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Todo = data(resp).await;
    assert_eq!(updated.title, "Walk cat");
    assert!(updated.completed); // unchanged from previous update

    // delete
    let resp = app
        .send(empty_request("DELETE", &format!("/api/todos/{id}")))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let envelope = body_json(resp).await;
    assert_eq!(envelope["success"], true);
    assert!(envelope["data"].is_null());
    assert!(envelope["message"].as_str().unwrap().contains(&id.to_string()));

    // get after delete — 404
    let resp = app.send(empty_request("GET", &format!("/api/todos/{id}"))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // delete again — 404, not a repeated 200
    let resp = app
        .send(empty_request("DELETE", &format!("/api/todos/{id}")))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // list after delete — empty
    assert!(app.list().await.is_empty());
}
