//! Verify build/parse methods against JSON test vectors stored in `test-vectors/`.
//!
//! Each vector file describes inputs, expected requests, simulated responses
//! in the `{ data, message, success }` envelope, and either the expected parse
//! result or the expected error kind. Comparing parsed JSON (not raw strings)
//! avoids false negatives from field-ordering differences.

use serde::Deserialize;
use serde_json::Value;
use todo_core::{ApiError, CreateTodo, HttpMethod, HttpRequest, HttpResponse, Todo, TodoClient, UpdateTodo};
use uuid::Uuid;

const BASE_URL: &str = "http://localhost:3000";

#[derive(Debug, Deserialize)]
struct Vectors {
    cases: Vec<Case>,
}

#[derive(Debug, Deserialize)]
struct Case {
    name: String,
    #[serde(default)]
    input: Value,
    #[serde(default)]
    input_id: Option<Uuid>,
    expected_request: ExpectedRequest,
    simulated_response: SimulatedResponse,
    #[serde(default)]
    expected_result: Value,
    #[serde(default)]
    expected_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExpectedRequest {
    method: String,
    path: String,
    #[serde(default)]
    headers: Vec<(String, String)>,
    #[serde(default)]
    body: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SimulatedResponse {
    status: u16,
    body: String,
}

impl Case {
    fn id(&self) -> Uuid {
        self.input_id.unwrap_or_else(|| panic!("{}: missing input_id", self.name))
    }

    fn check_request(&self, req: &HttpRequest) {
        let name = &self.name;
        let expected = &self.expected_request;
        assert_eq!(req.method, parse_method(&expected.method), "{name}: method");
        assert_eq!(req.path, format!("{BASE_URL}{}", expected.path), "{name}: path");
        assert_eq!(req.headers, expected.headers, "{name}: headers");
        let body: Option<Value> = req
            .body
            .as_deref()
            .map(|body| serde_json::from_str(body).unwrap());
        assert_eq!(body, expected.body, "{name}: body");
    }

    fn response(&self) -> HttpResponse {
        HttpResponse {
            status: self.simulated_response.status,
            headers: Vec::new(),
            body: self.simulated_response.body.clone(),
        }
    }

    /// Compare a parse result with the case's expected result or error kind.
    fn check_result<T>(&self, result: Result<T, ApiError>)
    where
        T: std::fmt::Debug + PartialEq + for<'de> Deserialize<'de>,
    {
        let name = &self.name;
        match &self.expected_error {
            Some(kind) => {
                let err = result.unwrap_err();
                let matched = match kind.as_str() {
                    "NotFound" => matches!(err, ApiError::NotFound),
                    "Validation" => matches!(err, ApiError::Validation { .. }),
                    "MissingPayload" => matches!(err, ApiError::MissingPayload),
                    "HttpError" => matches!(err, ApiError::HttpError { .. }),
                    other => panic!("{name}: unknown expected_error: {other}"),
                };
                assert!(matched, "{name}: expected {kind}, got {err:?}");
            }
            None => {
                let expected: T = serde_json::from_value(self.expected_result.clone()).unwrap();
                assert_eq!(result.unwrap(), expected, "{name}: parsed result");
            }
        }
    }
}

fn load(raw: &str) -> Vec<Case> {
    serde_json::from_str::<Vectors>(raw).unwrap().cases
}

fn client() -> TodoClient {
    TodoClient::new(BASE_URL)
}

fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PATCH" => HttpMethod::Patch,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

#[test]
fn create_test_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/create.json")) {
        let input: CreateTodo = serde_json::from_value(case.input.clone()).unwrap();
        case.check_request(&c.build_create_todo(&input).unwrap());
        case.check_result::<Todo>(c.parse_create_todo(case.response()));
    }
}

#[test]
fn list_test_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/list.json")) {
        case.check_request(&c.build_list_todos());
        case.check_result::<Vec<Todo>>(c.parse_list_todos(case.response()));
    }
}

#[test]
fn get_test_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/get.json")) {
        case.check_request(&c.build_get_todo(case.id()));
        case.check_result::<Todo>(c.parse_get_todo(case.response()));
    }
}

#[test]
fn update_test_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/update.json")) {
        let input: UpdateTodo = serde_json::from_value(case.input.clone()).unwrap();
        case.check_request(&c.build_update_todo(case.id(), &input).unwrap());
        case.check_result::<Todo>(c.parse_update_todo(case.response()));
    }
}

#[test]
fn delete_test_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/delete.json")) {
        case.check_request(&c.build_delete_todo(case.id()));
        case.check_result::<String>(c.parse_delete_todo(case.response()));
    }
}
