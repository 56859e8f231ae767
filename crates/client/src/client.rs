//! The authenticated caller: one logical Plaud API operation per invocation,
//! with a lazily acquired session and a single re-acquire-and-retry on
//! authorization failure.

use std::sync::Arc;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{from_reqwest, ClientError, Result};
use crate::session::{DesktopAcquirer, Session, SessionProvider};
use crate::types::{FileRecord, Summary, Transcript, TranscriptSegment};

const MS_PER_DAY: i64 = 86_400_000;
/// Single-file lookups scan the listing; the consumer API has no
/// per-file metadata endpoint.
const LOOKUP_LIMIT: u64 = 1000;

/// One logical remote operation, in executor-neutral form.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiRequest {
    /// Authenticated call against the consumer API.
    Api {
        endpoint: String,
        query: Vec<(&'static str, String)>,
    },
    /// Unauthenticated fetch of a signed content URL (body may be gzip'd).
    Content { url: String },
}

impl ApiRequest {
    fn api(endpoint: &str, query: Vec<(&'static str, String)>) -> Self {
        ApiRequest::Api {
            endpoint: endpoint.to_string(),
            query,
        }
    }
}

/// Executes one [`ApiRequest`] with a live session. Production talks HTTP or
/// the debug bridge; tests substitute canned responses.
#[async_trait]
pub trait ApiExecutor: Send + Sync {
    async fn execute(&self, session: &Session, request: &ApiRequest) -> Result<Value>;
}

/// Production executor: bearer-token HTTP for token sessions, `fetch` through
/// the desktop app for bridge sessions.
pub struct DesktopExecutor {
    http: reqwest::Client,
    api_base: String,
    timeout: std::time::Duration,
}

impl DesktopExecutor {
    pub fn new(config: &Config) -> Self {
        DesktopExecutor {
            http: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            timeout: config.request_timeout,
        }
    }

    fn api_url(&self, endpoint: &str, query: &[(&'static str, String)]) -> String {
        let mut url = format!("{}/{}", self.api_base, endpoint.trim_start_matches('/'));
        for (i, (key, value)) in query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            url.push(sep);
            url.push_str(key);
            url.push('=');
            url.push_str(value);
        }
        url
    }

    async fn execute_http(&self, jwt: &str, url: &str) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .header("Authorization", format!("bearer {jwt}"))
            .header("Content-Type", "application/json")
            .header(
                "User-Agent",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36",
            )
            .timeout(self.timeout)
            .send()
            .await
            .map_err(from_reqwest)?;
        let status = response.status().as_u16();
        map_status(status, move || response.text())
            .await
            .and_then(|body| parse_json_body(&body))
    }

    async fn fetch_content(&self, url: &str) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(from_reqwest)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(from_reqwest)?;
        if !(200..300).contains(&status) {
            return Err(ClientError::RemoteError {
                status,
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        decode_content(&bytes)
    }
}

#[async_trait]
impl ApiExecutor for DesktopExecutor {
    async fn execute(&self, session: &Session, request: &ApiRequest) -> Result<Value> {
        match request {
            ApiRequest::Content { url } => self.fetch_content(url).await,
            ApiRequest::Api { endpoint, query } => {
                let url = self.api_url(endpoint, query);
                match session {
                    Session::Token(token) => self.execute_http(&token.jwt, &url).await,
                    Session::Bridge(handle) => {
                        let (status, body) = handle.evaluate_fetch(&url).await?;
                        map_status(status, move || async move {
                            Ok::<_, std::convert::Infallible>(body)
                        })
                        .await
                        .and_then(|body| parse_json_body(&body))
                    }
                }
            }
        }
    }
}

/// Translate an HTTP status into the error taxonomy, reading the body lazily.
async fn map_status<F, Fut, E>(status: u16, body: F) -> Result<String>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<String, E>>,
    E: std::fmt::Display,
{
    match status {
        200..=299 => body().await.map_err(|e| ClientError::RemoteError {
            status,
            message: format!("failed to read body: {e}"),
        }),
        401 | 403 => Err(ClientError::Unauthorized(format!(
            "Plaud API rejected the session (HTTP {status})"
        ))),
        _ => {
            let message = body().await.unwrap_or_else(|e| e.to_string());
            Err(ClientError::RemoteError { status, message })
        }
    }
}

fn parse_json_body(body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|e| ClientError::RemoteError {
        status: 0,
        message: format!("unparseable response body: {e}"),
    })
}

/// Signed-URL payloads are sometimes stored gzip'd; sniff the magic bytes.
fn decode_content(bytes: &[u8]) -> Result<Value> {
    use std::io::Read;
    let decoded = if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut out = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut out)
            .map_err(|e| ClientError::RemoteError {
                status: 0,
                message: format!("gzip decode failed: {e}"),
            })?;
        out
    } else {
        bytes.to_vec()
    };
    serde_json::from_slice(&decoded).map_err(|e| ClientError::RemoteError {
        status: 0,
        message: format!("unparseable content payload: {e}"),
    })
}

/// Plaud API client. Sessions are acquired lazily, cached for the life of the
/// process, and replaced after exactly one authorization failure per call.
pub struct PlaudClient {
    provider: Arc<dyn SessionProvider>,
    executor: Arc<dyn ApiExecutor>,
    session: Mutex<Option<Session>>,
}

impl PlaudClient {
    pub fn new(config: &Config) -> Self {
        PlaudClient {
            provider: Arc::new(DesktopAcquirer::new(config.clone())),
            executor: Arc::new(DesktopExecutor::new(config)),
            session: Mutex::new(None),
        }
    }

    /// Dependency-injecting constructor; production wiring uses [`Self::new`].
    pub fn with_parts(provider: Arc<dyn SessionProvider>, executor: Arc<dyn ApiExecutor>) -> Self {
        PlaudClient {
            provider,
            executor,
            session: Mutex::new(None),
        }
    }

    /// Acquire (or reuse) a session without performing any call. Used by
    /// connection checks to distinguish acquisition from call failures.
    pub async fn ensure_session(&self) -> Result<Session> {
        let mut slot = self.session.lock().await;
        let now = chrono::Utc::now().timestamp();
        if let Some(session) = slot.as_ref() {
            if !session.is_expired(now) {
                return Ok(session.clone());
            }
            log::debug!("cached session expired, re-acquiring");
        }
        let session = self.provider.acquire().await?;
        log::info!("acquired Plaud session via {} strategy", session.strategy_name());
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Execute one logical operation, re-acquiring the session and retrying
    /// exactly once if the first attempt comes back unauthorized.
    async fn request(&self, request: &ApiRequest) -> Result<Value> {
        let session = self.ensure_session().await?;
        match self.executor.execute(&session, request).await {
            Err(ClientError::Unauthorized(reason)) => {
                log::warn!("session rejected ({reason}), re-acquiring once");
                self.session.lock().await.take();
                let fresh = self.ensure_session().await?;
                self.executor.execute(&fresh, request).await
            }
            other => other,
        }
    }

    fn list_request(skip: u64, limit: u64) -> ApiRequest {
        ApiRequest::api(
            "file/simple/web",
            vec![
                ("skip", skip.to_string()),
                ("limit", limit.to_string()),
                // 0 = trashed, 1 = untrashed, 2 = all
                ("is_trash", "2".to_string()),
                ("sort_by", "start_time".to_string()),
                ("is_desc", "true".to_string()),
            ],
        )
    }

    /// List files, newest first.
    pub async fn list_files(&self, skip: u64, limit: u64) -> Result<Vec<FileRecord>> {
        let response = self.request(&Self::list_request(skip, limit)).await?;
        let mut files: Vec<FileRecord> = response
            .get("data_file_list")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ClientError::RemoteError {
                status: 0,
                message: format!("malformed file list: {e}"),
            })?
            .unwrap_or_default();
        // The API sorts for us, but result ordering is part of the contract.
        files.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(files)
    }

    /// Total number of files in the account.
    pub async fn file_count(&self) -> Result<u64> {
        let response = self.request(&Self::list_request(0, 1)).await?;
        Ok(response
            .get("data_file_total")
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    /// Metadata for one file.
    pub async fn file(&self, file_id: &str) -> Result<FileRecord> {
        let files = self.list_files(0, LOOKUP_LIMIT).await?;
        files
            .into_iter()
            .find(|f| f.id == file_id)
            .ok_or_else(|| ClientError::NotFound(file_id.to_string()))
    }

    /// Files recorded in the last `days` days, newest first.
    pub async fn recent_files(&self, days: u32) -> Result<Vec<FileRecord>> {
        let now = chrono::Utc::now().timestamp_millis();
        let cutoff = now - i64::from(days) * MS_PER_DAY;
        let files = self.list_files(0, 100).await?;
        Ok(files
            .into_iter()
            .filter(|f| f.start_time >= cutoff && f.start_time <= now)
            .collect())
    }

    /// Detail record with signed content URLs.
    async fn file_detail(&self, file_id: &str) -> Result<Value> {
        let request = ApiRequest::api(&format!("file/detail/{file_id}"), vec![]);
        let response = self.request(&request).await?;
        Ok(response.get("data").cloned().unwrap_or(Value::Null))
    }

    /// Signed URL for one artifact type out of a detail record.
    fn content_link(detail: &Value, data_type: &str) -> Option<String> {
        detail
            .get("content_list")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find(|entry| entry.get("data_type").and_then(Value::as_str) == Some(data_type))
            .and_then(|entry| entry.get("data_link"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Full transcript for one file.
    pub async fn transcript(&self, file_id: &str) -> Result<Transcript> {
        let detail = self.file_detail(file_id).await?;
        let url = Self::content_link(&detail, "transaction")
            .ok_or_else(|| ClientError::NoTranscriptAvailable(file_id.to_string()))?;
        let payload = self.request(&ApiRequest::Content { url }).await?;

        let segments: Vec<TranscriptSegment> = match payload {
            Value::Array(_) => {
                serde_json::from_value(payload).map_err(|e| ClientError::RemoteError {
                    status: 0,
                    message: format!("malformed transcript: {e}"),
                })?
            }
            other => vec![TranscriptSegment {
                speaker: String::new(),
                content: other.to_string(),
                start_time: 0,
                end_time: 0,
            }],
        };
        Ok(Transcript {
            file_id: file_id.to_string(),
            segments,
        })
    }

    /// AI summary for one file.
    pub async fn summary(&self, file_id: &str) -> Result<Summary> {
        let detail = self.file_detail(file_id).await?;
        let url = Self::content_link(&detail, "auto_sum_note")
            .ok_or_else(|| ClientError::NoSummaryAvailable(file_id.to_string()))?;
        let payload = self.request(&ApiRequest::Content { url }).await?;

        Ok(Summary {
            file_id: file_id.to_string(),
            content: payload
                .get("ai_content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            header: payload
                .get("header")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            category: payload
                .get("category")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}
