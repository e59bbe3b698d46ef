//! In-process stand-ins for the network and the navigation side effect, for tests and offline
//! experiments.

use crate::error::{Error, Result};
use crate::guard::Navigator;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

type Scripted = std::result::Result<ApiResponse, String>;

/// Transport answering from per-endpoint queues of canned responses.
///
/// Each `(method, path)` pair has its own queue; the last queued response for an endpoint keeps
/// being returned once the others are used up. Unscripted endpoints answer 404. Every request
/// is recorded, and `send` yields once before answering so concurrent callers interleave.
#[derive(Debug, Default)]
pub struct FakeTransport {
    script: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a JSON response for `method path`
    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.push(method, path, Ok(ApiResponse::from_json(status, &body)))
    }

    /// Queues a transport-level failure (no HTTP response at all) for `method path`
    pub fn fail(&self, method: Method, path: &str, reason: &str) -> &Self {
        self.push(method, path, Err(reason.to_string()))
    }

    fn push(&self, method: Method, path: &str, scripted: Scripted) -> &Self {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        script
            .entry((method, path.trim_start_matches('/').to_string()))
            .or_default()
            .push_back(scripted);
        self
    }

    /// Every request sent so far, in order
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        let path = path.trim_start_matches('/');
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    fn answer(&self, request: &ApiRequest) -> Scripted {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (request.method.clone(), request.path.clone());
        match script.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(not_found),
            Some(queue) => queue.front().cloned().unwrap_or_else(not_found),
            None => not_found(),
        }
    }
}

fn not_found() -> Scripted {
    Ok(ApiResponse::from_json(
        StatusCode::NOT_FOUND,
        &json!({"detail": "Not found."}),
    ))
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        tokio::task::yield_now().await;
        self.answer(request).map_err(Error::Transport)
    }
}

/// Remembers every navigation instead of performing it
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    history: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_string());
    }
}

#[tokio::test]
async fn test_fake_transport_script() {
    let fake = FakeTransport::new();
    fake.respond(Method::GET, "stats/", 500, json!({"error": "boom"}))
        .respond(Method::GET, "stats/", 200, json!({"images": 3}));

    let req = ApiRequest::get("stats/");
    assert_eq!(fake.send(&req).await.unwrap().status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(fake.send(&req).await.unwrap().status, StatusCode::OK);
    // last response repeats
    assert_eq!(fake.send(&req).await.unwrap().status, StatusCode::OK);
    assert_eq!(
        fake.send(&ApiRequest::get("images/")).await.unwrap().status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(fake.requests_to("stats/").len(), 3);

    fake.fail(Method::POST, "jobs/add-repositories/", "connection reset");
    assert!(matches!(
        fake.send(&ApiRequest::post("jobs/add-repositories/")).await,
        Err(Error::Transport(_))
    ));
}
