//! Shared test doubles: a scripted session source and a canned-response
//! executor, so session lifecycle and call paths can be driven offline.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::{ApiExecutor, ApiRequest};
use crate::error::{ClientError, Result};
use crate::session::{Session, SessionProvider, TokenSession};

/// Hands out pre-scripted token sessions in order.
#[derive(Clone)]
pub(crate) struct FakeProvider {
    tokens: Arc<Mutex<VecDeque<String>>>,
    acquired: Arc<AtomicUsize>,
    expire_first: bool,
}

impl FakeProvider {
    pub(crate) fn with_tokens(tokens: &[&str]) -> Self {
        FakeProvider {
            tokens: Arc::new(Mutex::new(tokens.iter().map(|t| t.to_string()).collect())),
            acquired: Arc::new(AtomicUsize::new(0)),
            expire_first: false,
        }
    }

    /// Mark the first handed-out session as already expired.
    pub(crate) fn expire_first(mut self) -> Self {
        self.expire_first = true;
        self
    }

    pub(crate) fn acquire_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn acquire(&self) -> Result<Session> {
        let index = self.acquired.fetch_add(1, Ordering::SeqCst);
        let jwt = self
            .tokens
            .lock()
            .expect("provider lock")
            .pop_front()
            .ok_or_else(|| ClientError::CredentialNotFound("fake provider exhausted".into()))?;
        let expires_at = if self.expire_first && index == 0 {
            Some(chrono::Utc::now().timestamp() - 60)
        } else {
            None
        };
        Ok(Session::Token(TokenSession {
            jwt,
            user_id: "test-user".into(),
            expires_at,
        }))
    }
}

/// Serves canned responses and rejects configured JWTs as unauthorized.
#[derive(Clone, Default)]
pub(crate) struct FakeExecutor {
    rejected: Arc<Mutex<HashSet<String>>>,
    list: Arc<Mutex<Option<Value>>>,
    details: Arc<Mutex<HashMap<String, Value>>>,
    contents: Arc<Mutex<HashMap<String, Value>>>,
    calls: Arc<AtomicUsize>,
}

impl FakeExecutor {
    pub(crate) fn new() -> Self {
        FakeExecutor::default()
    }

    pub(crate) fn reject_jwt(self, jwt: &str) -> Self {
        self.rejected.lock().expect("lock").insert(jwt.to_string());
        self
    }

    pub(crate) fn on_list(self, response: Value) -> Self {
        *self.list.lock().expect("lock") = Some(response);
        self
    }

    pub(crate) fn on_detail(self, file_id: &str, response: Value) -> Self {
        self.details
            .lock()
            .expect("lock")
            .insert(file_id.to_string(), response);
        self
    }

    pub(crate) fn on_content(self, url: &str, response: Value) -> Self {
        self.contents
            .lock()
            .expect("lock")
            .insert(url.to_string(), response);
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApiExecutor for FakeExecutor {
    async fn execute(&self, session: &Session, request: &ApiRequest) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Session::Token(token) = session {
            if self.rejected.lock().expect("lock").contains(&token.jwt) {
                return Err(ClientError::Unauthorized("fake rejection".into()));
            }
        }

        match request {
            ApiRequest::Api { endpoint, .. } if endpoint == "file/simple/web" => self
                .list
                .lock()
                .expect("lock")
                .clone()
                .ok_or_else(|| ClientError::RemoteError {
                    status: 500,
                    message: "no list response scripted".into(),
                }),
            ApiRequest::Api { endpoint, .. } => {
                let Some(file_id) = endpoint.strip_prefix("file/detail/") else {
                    return Err(ClientError::RemoteError {
                        status: 404,
                        message: format!("unscripted endpoint {endpoint}"),
                    });
                };
                self.details
                    .lock()
                    .expect("lock")
                    .get(file_id)
                    .cloned()
                    .ok_or_else(|| ClientError::NotFound(file_id.to_string()))
            }
            ApiRequest::Content { url } => self
                .contents
                .lock()
                .expect("lock")
                .get(url)
                .cloned()
                .ok_or_else(|| ClientError::RemoteError {
                    status: 404,
                    message: format!("unscripted content url {url}"),
                }),
        }
    }
}

/// Wire-shaped file record for list responses.
pub(crate) fn file_record(id: &str, start_time: i64) -> Value {
    json!({
        "id": id,
        "filename": format!("{id}.wav"),
        "start_time": start_time,
        "duration": 60_000,
        "is_trans": true,
        "is_summary": false,
    })
}
