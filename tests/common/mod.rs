//! In-process fake of the automation server API for integration tests.
//!
//! Serves the subset of endpoints the client uses under `/api`, keeps queues
//! and items in memory, and records every request so tests can assert on the
//! wire traffic. Any `METHOD /path` can be made to fail with a given status.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ats_client::Client;
use ats_client::model::WorkqueueId;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use secrecy::SecretString;
use serde_json::{Value, json};

pub const TOKEN: &str = "test-token";
pub const QUEUE: WorkqueueId = WorkqueueId(1);
pub const SESSION: i64 = 77;
pub const PROCESS: i64 = 5;

const TIMESTAMP: &str = "2025-01-01T08:00:00";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub body: Value,
    pub authorization: Option<String>,
}

#[derive(Default)]
pub struct FakeState {
    queues: HashMap<i64, VecDeque<i64>>,
    items: HashMap<i64, Value>,
    next_id: i64,
    failures: HashMap<String, StatusCode>,
    pub requests: Vec<Recorded>,
    pub logs: Vec<Value>,
}

impl FakeState {
    fn insert_item(&mut self, queue: i64, data: Value, reference: &str) -> Value {
        self.next_id += 1;
        let id = self.next_id;
        let item = json!({
            "id": id,
            "reference": reference,
            "data": data,
            "status": "new",
            "message": "",
            "locked": false,
            "workqueue_id": queue,
            "created_at": TIMESTAMP,
            "updated_at": TIMESTAMP,
        });
        self.items.insert(id, item.clone());
        self.queues.entry(queue).or_default().push_back(id);
        item
    }
}

pub struct FakeServer {
    pub url: String,
    state: Arc<Mutex<FakeState>>,
}

impl FakeServer {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(FakeState {
            next_id: 100,
            ..FakeState::default()
        }));
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}/api"),
            state,
        }
    }

    pub fn client(&self) -> Client {
        Client::new(&self.url, Some(SecretString::from(TOKEN))).unwrap()
    }

    /// Put an item straight onto a queue, bypassing the client.
    pub fn seed(&self, queue: WorkqueueId, data: Value, reference: &str) -> i64 {
        let item = self.state.lock().unwrap().insert_item(queue.0, data, reference);
        item["id"].as_i64().unwrap()
    }

    /// Make `METHOD path` (path relative to `/api`) answer `status`.
    pub fn fail(&self, method: Method, path: &str, status: StatusCode) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(format!("{method} {path}"), status);
    }

    pub fn heal(&self, method: Method, path: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .remove(&format!("{method} {path}"));
    }

    pub fn item(&self, id: i64) -> Value {
        self.state.lock().unwrap().items[&id].clone()
    }

    pub fn queue_len(&self, queue: WorkqueueId) -> usize {
        self.state
            .lock()
            .unwrap()
            .queues
            .get(&queue.0)
            .map_or(0, VecDeque::len)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub fn logs(&self) -> Vec<Value> {
        self.state.lock().unwrap().logs.clone()
    }

    /// Wait until the log endpoint received a record whose message contains
    /// `needle`, or give up after two seconds.
    pub async fn wait_for_log(&self, needle: &str) -> Option<Value> {
        for _ in 0..200 {
            let found = self
                .logs()
                .into_iter()
                .find(|l| l["message"].as_str().is_some_and(|m| m.contains(needle)));
            if found.is_some() {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }
}

async fn handle(
    State(state): State<Arc<Mutex<FakeState>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().strip_prefix("/api").unwrap_or(uri.path()).to_string();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut state = state.lock().unwrap();
    state.requests.push(Recorded {
        method: method.clone(),
        path: path.clone(),
        body: body.clone(),
        authorization: authorization.clone(),
    });

    if authorization.as_deref() != Some(format!("Bearer {TOKEN}").as_str()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if let Some(status) = state.failures.get(&format!("{method} {path}")) {
        return (*status, "injected failure").into_response();
    }

    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match (method.as_str(), segments.as_slice()) {
        ("GET", ["workqueues", id, "next_item"]) => {
            let queue: i64 = id.parse().unwrap();
            let next = state.queues.get_mut(&queue).and_then(VecDeque::pop_front);
            match next {
                Some(item_id) => {
                    let item = state.items.get_mut(&item_id).unwrap();
                    item["status"] = json!("in progress");
                    item["locked"] = json!(true);
                    axum::Json(item.clone()).into_response()
                }
                None => StatusCode::NO_CONTENT.into_response(),
            }
        }
        ("GET", ["workqueues", id]) => axum::Json(json!({
            "id": id.parse::<i64>().unwrap(),
            "name": "Client library test",
            "description": "fake",
            "enabled": true,
            "deleted": false,
            "created_at": TIMESTAMP,
            "updated_at": TIMESTAMP,
        }))
        .into_response(),
        ("POST", ["workqueues", id, "add"]) => {
            let queue: i64 = id.parse().unwrap();
            let reference = body["reference"].as_str().unwrap_or_default().to_string();
            let item = state.insert_item(queue, body["data"].clone(), &reference);
            axum::Json(item).into_response()
        }
        ("POST", ["workqueues", id, "clear"]) => {
            let queue: i64 = id.parse().unwrap();
            let status = body["workitem_status"].as_str().map(str::to_string);
            let ids: Vec<i64> = state.queues.get(&queue).cloned().unwrap_or_default().into();
            let keep: VecDeque<i64> = ids
                .into_iter()
                .filter(|item_id| match &status {
                    Some(s) => state.items[item_id]["status"].as_str() != Some(s),
                    None => false,
                })
                .collect();
            state.queues.insert(queue, keep);
            StatusCode::NO_CONTENT.into_response()
        }
        ("PUT", ["workitems", id]) => {
            let item_id: i64 = id.parse().unwrap();
            let item = state.items.get_mut(&item_id).unwrap();
            item["data"] = body["data"].clone();
            axum::Json(item.clone()).into_response()
        }
        ("PUT", ["workitems", id, "status"]) => {
            let item_id: i64 = id.parse().unwrap();
            let item = state.items.get_mut(&item_id).unwrap();
            item["status"] = body["status"].clone();
            item["message"] = body["message"].clone();
            axum::Json(item.clone()).into_response()
        }
        ("POST", ["sessions", _, "log"]) => {
            state.logs.push(body);
            StatusCode::NO_CONTENT.into_response()
        }
        ("GET", ["sessions", id]) => axum::Json(json!({
            "id": id.parse::<i64>().unwrap(),
            "process_id": PROCESS,
            "resource_id": 3,
            "dispatched_at": TIMESTAMP,
            "status": "in progress",
            "stop_requested": false,
            "deleted": false,
            "parameters": "",
            "created_at": TIMESTAMP,
            "updated_at": TIMESTAMP,
        }))
        .into_response(),
        ("GET", ["processes", id]) => axum::Json(json!({
            "id": id.parse::<i64>().unwrap(),
            "name": "invoice-robot",
            "description": "",
            "requirements": "",
            "target_type": "git",
            "target_source": "https://example.invalid/robot.git",
            "target_credentials_id": null,
            "credentials_id": null,
            "workqueue_id": QUEUE.0,
            "deleted": false,
            "created_at": TIMESTAMP,
            "updated_at": TIMESTAMP,
        }))
        .into_response(),
        ("GET", ["credentials", "by_name", name]) => {
            let name = urlencoding::decode(name).unwrap().into_owned();
            axum::Json(json!({
                "id": 9,
                "name": name,
                "data": {"tenant": "acme"},
                "username": "robot",
                "password": "hunter2",
                "deleted": false,
                "created_at": TIMESTAMP,
                "updated_at": TIMESTAMP,
            }))
            .into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
