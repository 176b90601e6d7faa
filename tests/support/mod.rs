// Scripted in-memory transport for integration tests.
#![allow(dead_code)]

use mwclient::api::{
    ApiRequest, ApiResponse, ApiResult, BackoffPolicy, Error, ErrorKind, RequestBody, Session,
    SessionConfig, Transport,
};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const API_URL: &str = "https://wiki.example.org/w/api.php";

pub enum Scripted {
    Json(Value),
    JsonWithCookies(Value, Vec<String>),
    Status(u16, String),
    Fault,
}

/// Replays queued replies in order and records every request it receives.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_json(&self, value: Value) {
        self.replies
            .lock()
            .expect("lock")
            .push_back(Scripted::Json(value));
    }

    /// Queues a JSON reply that also sets `cookies` (raw `Set-Cookie` values).
    pub fn push_json_with_cookies(&self, value: Value, cookies: &[&str]) {
        let cookies = cookies.iter().map(|cookie| cookie.to_string()).collect();
        self.replies
            .lock()
            .expect("lock")
            .push_back(Scripted::JsonWithCookies(value, cookies));
    }

    pub fn push_status(&self, status: u16, body: &str) {
        self.replies
            .lock()
            .expect("lock")
            .push_back(Scripted::Status(status, body.to_string()));
    }

    pub fn push_fault(&self) {
        self.replies.lock().expect("lock").push_back(Scripted::Fault);
    }

    /// Replies consumed by a successful login as `user` ending with `csrf` as the token.
    pub fn push_login(&self, user: &str, csrf: &str) {
        self.push_json(json!({"query": {"tokens": {"logintoken": "lt+\\"}}}));
        self.push_json(json!({"login": {"result": "Success", "lgusername": user}}));
        self.push_json(json!({"query": {"userinfo": {"id": 7, "name": user}}}));
        self.push_json(json!({"query": {"tokens": {"csrftoken": csrf}}}));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().expect("lock").clone()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().expect("lock").clear();
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().expect("lock").len()
    }

    pub fn actions(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|request| request.param("action").unwrap_or_default())
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        self.requests.lock().expect("lock").push(request.clone());
        let next = self.replies.lock().expect("lock").pop_front();
        match next {
            Some(Scripted::Json(value)) => Ok(ApiResponse {
                status: 200,
                body: value.to_string(),
                set_cookies: Vec::new(),
            }),
            Some(Scripted::JsonWithCookies(value, set_cookies)) => Ok(ApiResponse {
                status: 200,
                body: value.to_string(),
                set_cookies,
            }),
            Some(Scripted::Status(status, body)) => Ok(ApiResponse {
                status,
                body,
                set_cookies: Vec::new(),
            }),
            Some(Scripted::Fault) => {
                Err(Error::new(ErrorKind::Io).with_message("connection reset"))
            }
            None => Err(Error::new(ErrorKind::Io).with_message("script exhausted")),
        }
    }
}

pub fn fast_config() -> SessionConfig {
    SessionConfig::new(API_URL)
        .expect("config")
        .with_backoff(BackoffPolicy::default().with_unit(Duration::from_millis(1)))
}

pub fn session_with(transport: &Arc<ScriptedTransport>) -> Session {
    Session::with_transport(fast_config(), transport.clone())
}

pub fn session_with_config(transport: &Arc<ScriptedTransport>, config: SessionConfig) -> Session {
    Session::with_transport(config, transport.clone())
}

pub fn multipart_field<'a>(request: &'a ApiRequest, key: &str) -> Option<&'a str> {
    match &request.body {
        RequestBody::Multipart { .. } => request.body.field(key),
        _ => None,
    }
}
