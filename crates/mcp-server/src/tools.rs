//! MCP tools for Plaud.
//!
//! Exposes recordings, transcripts, and AI summaries to AI agents via the MCP
//! protocol, authenticated through the locally installed Plaud Desktop app.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde::{Deserialize, Serialize};
use serde_json::json;

use plaud_client::{
    search_transcripts, ClientError, Config, FileRecord, PlaudClient, TranscriptSegment,
};

/// Plaud MCP service.
#[derive(Clone)]
pub struct PlaudService {
    client: Arc<PlaudClient>,
    tool_router: ToolRouter<Self>,
}

impl PlaudService {
    pub fn new(config: &Config) -> Self {
        Self::with_client(Arc::new(PlaudClient::new(config)))
    }

    pub fn with_client(client: Arc<PlaudClient>) -> Self {
        Self {
            client,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_handler]
impl ServerHandler for PlaudService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Plaud MCP exposes your Plaud recordings to AI agents. Use 'check_connection' \
                 to verify the Plaud Desktop bridge, 'get_recent_files' or 'get_files' to list \
                 recordings, 'get_transcript'/'get_summary' for content, and \
                 'search_transcripts' to find recordings by what was said."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Tool Input/Output Schemas
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RecentFilesRequest {
    /// Number of days to look back
    #[schemars(description = "Number of days to look back (must be positive, default 7)")]
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FilesRequest {
    /// Start of the date range, inclusive
    #[schemars(description = "Start date (ISO format, e.g. '2024-01-01')")]
    pub start_date: Option<String>,

    /// End of the date range, inclusive of the whole day
    #[schemars(description = "End date (ISO format)")]
    pub end_date: Option<String>,

    /// Maximum number of results
    #[schemars(description = "Maximum number of results (default 100)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FileRequest {
    #[schemars(description = "File ID")]
    pub file_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchRequest {
    #[schemars(description = "Text to search for in transcript content and titles")]
    pub query: String,

    /// Search window
    #[schemars(description = "Number of days to search back (default 30)")]
    pub days: Option<u32>,
}

/// A file record shaped for agent consumption.
#[derive(Debug, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FileView {
    pub id: String,
    pub filename: String,
    /// ISO-8601 recording date, empty when unknown
    pub date: String,
    /// Human-readable duration, e.g. "1h 2m 3s"
    pub duration: String,
    pub has_transcript: bool,
    pub has_summary: bool,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SegmentView {
    pub speaker: String,
    pub content: String,
    pub start_time: i64,
    pub end_time: i64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct TranscriptView {
    pub file_id: String,
    /// Full transcript with `**Speaker:**` labels
    pub transcript: String,
    pub segment_count: usize,
    /// First segments, for timing reference
    pub segments: Vec<SegmentView>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SummaryView {
    pub file_id: String,
    pub content: String,
    pub header: String,
    pub category: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SearchHitView {
    pub file_id: String,
    pub title: String,
    pub date: String,
    pub duration: String,
    pub excerpt: String,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CountResult {
    pub total: u64,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ConnectionResult {
    /// "connected", "degraded", or "unavailable"
    pub status: String,
    pub message: String,
    /// Error kind when not connected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Acquisition strategy in use when a session exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_files: Option<u64>,
}

// ============================================================================
// Tool Implementations
// ============================================================================

#[tool_router]
impl PlaudService {
    /// Verify the desktop bridge end to end
    #[tool(
        description = "Check whether Plaud Desktop is available and authenticated. Reports connected, degraded (session acquired but API unreachable), or unavailable."
    )]
    pub async fn check_connection(&self) -> Result<CallToolResult, McpError> {
        let result = match self.client.ensure_session().await {
            Err(e) => ConnectionResult {
                status: "unavailable".into(),
                message: e.to_string(),
                error_kind: Some(e.kind().into()),
                strategy: None,
                total_files: None,
            },
            Ok(session) => match self.client.file_count().await {
                Ok(total) => ConnectionResult {
                    status: "connected".into(),
                    message: format!(
                        "Connected to Plaud via the {} strategy",
                        session.strategy_name()
                    ),
                    error_kind: None,
                    strategy: Some(session.strategy_name().into()),
                    total_files: Some(total),
                },
                Err(e) => ConnectionResult {
                    status: "degraded".into(),
                    message: e.to_string(),
                    error_kind: Some(e.kind().into()),
                    strategy: Some(session.strategy_name().into()),
                    total_files: None,
                },
            },
        };
        Ok(success(&result))
    }

    /// Total number of files
    #[tool(description = "Get the total number of Plaud files.")]
    pub async fn get_file_count(&self) -> Result<CallToolResult, McpError> {
        match self.client.file_count().await {
            Ok(total) => Ok(success(&CountResult { total })),
            Err(e) => Ok(failure(&e)),
        }
    }

    /// Files from the last N days
    #[tool(description = "Get Plaud files from the last N days, newest first.")]
    pub async fn get_recent_files(
        &self,
        Parameters(request): Parameters<RecentFilesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let days = request.days.unwrap_or(7);
        if days == 0 {
            return Ok(failure(&ClientError::InvalidInput(
                "days must be a positive integer".into(),
            )));
        }
        match self.client.recent_files(days).await {
            Ok(files) => Ok(success(&format_files(files))),
            Err(e) => Ok(failure(&e)),
        }
    }

    /// Files with optional date filters
    #[tool(description = "Get Plaud files with optional inclusive date range filters.")]
    pub async fn get_files(
        &self,
        Parameters(request): Parameters<FilesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let limit = request.limit.unwrap_or(100);
        let start_ms = match request.start_date.as_deref().map(parse_date_to_ms).transpose() {
            Ok(v) => v,
            Err(e) => return Ok(failure(&e)),
        };
        // Extend to the end of the day so the range is inclusive.
        let end_ms = match request.end_date.as_deref().map(parse_date_to_ms).transpose() {
            Ok(v) => v.map(|ms| ms + MS_PER_DAY),
            Err(e) => return Ok(failure(&e)),
        };
        if let (Some(start), Some(end)) = (start_ms, end_ms) {
            if start > end {
                return Ok(failure(&ClientError::InvalidInput(
                    "start_date is after end_date".into(),
                )));
            }
        }

        match self.client.list_files(0, limit as u64).await {
            Ok(files) => {
                let filtered: Vec<FileRecord> = files
                    .into_iter()
                    .filter(|f| start_ms.is_none_or(|start| f.start_time >= start))
                    .filter(|f| end_ms.is_none_or(|end| f.start_time <= end))
                    .take(limit)
                    .collect();
                Ok(success(&format_files(filtered)))
            }
            Err(e) => Ok(failure(&e)),
        }
    }

    /// Metadata for one file
    #[tool(description = "Get metadata for a specific Plaud file.")]
    pub async fn get_file(
        &self,
        Parameters(request): Parameters<FileRequest>,
    ) -> Result<CallToolResult, McpError> {
        if request.file_id.trim().is_empty() {
            return Ok(failure(&ClientError::InvalidInput(
                "file_id must not be empty".into(),
            )));
        }
        match self.client.file(&request.file_id).await {
            Ok(file) => Ok(success(&format_file(&file))),
            Err(e) => Ok(failure(&e)),
        }
    }

    /// Full transcript
    #[tool(description = "Get the full transcript for a Plaud file, with speaker labels.")]
    pub async fn get_transcript(
        &self,
        Parameters(request): Parameters<FileRequest>,
    ) -> Result<CallToolResult, McpError> {
        if request.file_id.trim().is_empty() {
            return Ok(failure(&ClientError::InvalidInput(
                "file_id must not be empty".into(),
            )));
        }
        match self.client.transcript(&request.file_id).await {
            Ok(transcript) => {
                let view = TranscriptView {
                    file_id: transcript.file_id.clone(),
                    transcript: transcript.labeled_text(),
                    segment_count: transcript.segments.len(),
                    segments: transcript
                        .segments
                        .iter()
                        .take(10)
                        .map(segment_view)
                        .collect(),
                };
                Ok(success(&view))
            }
            Err(e) => Ok(failure(&e)),
        }
    }

    /// AI summary
    #[tool(description = "Get the AI-generated summary for a Plaud file.")]
    pub async fn get_summary(
        &self,
        Parameters(request): Parameters<FileRequest>,
    ) -> Result<CallToolResult, McpError> {
        if request.file_id.trim().is_empty() {
            return Ok(failure(&ClientError::InvalidInput(
                "file_id must not be empty".into(),
            )));
        }
        match self.client.summary(&request.file_id).await {
            Ok(summary) => Ok(success(&SummaryView {
                file_id: summary.file_id,
                content: summary.content,
                header: summary.header,
                category: summary.category,
            })),
            Err(e) => Ok(failure(&e)),
        }
    }

    /// Client-side transcript search
    #[tool(
        description = "Search recent transcripts for matching content. Fetches transcripts and searches client-side, so large windows may take a few seconds."
    )]
    pub async fn search_transcripts(
        &self,
        Parameters(request): Parameters<SearchRequest>,
    ) -> Result<CallToolResult, McpError> {
        if request.query.trim().is_empty() {
            return Ok(failure(&ClientError::InvalidInput(
                "query must not be empty".into(),
            )));
        }
        let days = request.days.unwrap_or(30);
        if days == 0 {
            return Ok(failure(&ClientError::InvalidInput(
                "days must be a positive integer".into(),
            )));
        }

        let files = match self.client.recent_files(days).await {
            Ok(files) => files,
            Err(e) => return Ok(failure(&e)),
        };
        let matches = search_transcripts(&self.client, files, &request.query).await;
        let hits: Vec<SearchHitView> = matches
            .into_iter()
            .map(|m| SearchHitView {
                file_id: m.file.id.clone(),
                title: m.file.filename.clone(),
                date: format_timestamp(m.file.start_time),
                duration: format_duration(m.file.duration),
                excerpt: m.excerpt,
            })
            .collect();
        Ok(success(&hits))
    }
}

// ============================================================================
// Helper functions
// ============================================================================

const MS_PER_DAY: i64 = 86_400_000;

fn success<T: Serialize>(payload: &T) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(payload).unwrap_or_default(),
    )])
}

/// Structured failure payload with a stable kind the agent can branch on.
fn failure(err: &ClientError) -> CallToolResult {
    let payload = json!({
        "error": {
            "kind": err.kind(),
            "message": err.to_string(),
        }
    });
    CallToolResult::error(vec![Content::text(
        serde_json::to_string_pretty(&payload).unwrap_or_default(),
    )])
}

fn format_files(files: Vec<FileRecord>) -> Vec<FileView> {
    files.iter().map(format_file).collect()
}

fn format_file(file: &FileRecord) -> FileView {
    FileView {
        id: file.id.clone(),
        filename: file.filename.clone(),
        date: format_timestamp(file.start_time),
        duration: format_duration(file.duration),
        has_transcript: file.is_trans,
        has_summary: file.is_summary,
    }
}

fn segment_view(segment: &TranscriptSegment) -> SegmentView {
    SegmentView {
        speaker: segment.speaker.clone(),
        content: segment.content.clone(),
        start_time: segment.start_time,
        end_time: segment.end_time,
    }
}

/// Milliseconds since the epoch as an ISO-8601 timestamp (UTC).
fn format_timestamp(ms: i64) -> String {
    if ms == 0 {
        return String::new();
    }
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Milliseconds as "1h 2m 3s" / "2m 3s" / "3s".
fn format_duration(ms: i64) -> String {
    if ms <= 0 {
        return String::new();
    }
    let seconds = ms / 1000;
    let (minutes, secs) = (seconds / 60, seconds % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

/// Parse an ISO date or datetime into epoch milliseconds.
fn parse_date_to_ms(date: &str) -> Result<i64, ClientError> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(date) {
        return Ok(dt.timestamp_millis());
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc().timestamp_millis());
    }
    if let Ok(day) = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        if let Some(start_of_day) = day.and_hms_opt(0, 0, 0) {
            return Ok(start_of_day.and_utc().timestamp_millis());
        }
    }
    Err(ClientError::InvalidInput(format!(
        "unparseable date '{date}', expected ISO format like 2024-01-01"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use plaud_client::{ApiExecutor, ApiRequest, Session, SessionProvider, TokenSession};
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    struct StaticSession;

    #[async_trait]
    impl SessionProvider for StaticSession {
        async fn acquire(&self) -> plaud_client::Result<Session> {
            Ok(Session::Token(TokenSession {
                jwt: "jwt".into(),
                user_id: "u".into(),
                expires_at: None,
            }))
        }
    }

    /// Answers every request with one canned listing payload.
    struct CannedList(Value);

    #[async_trait]
    impl ApiExecutor for CannedList {
        async fn execute(&self, _: &Session, _: &ApiRequest) -> plaud_client::Result<Value> {
            Ok(self.0.clone())
        }
    }

    fn service_with_listing(listing: Value) -> PlaudService {
        PlaudService::with_client(Arc::new(PlaudClient::with_parts(
            Arc::new(StaticSession),
            Arc::new(CannedList(listing)),
        )))
    }

    fn listed_file(id: &str, start_time: i64) -> Value {
        json!({ "id": id, "filename": format!("{id}.wav"), "start_time": start_time })
    }

    fn payload(result: &CallToolResult) -> Value {
        let text = result
            .content
            .first()
            .and_then(|c| c.as_text())
            .expect("text content");
        serde_json::from_str(&text.text).expect("valid JSON payload")
    }

    #[tokio::test]
    async fn get_files_range_is_inclusive_of_both_bound_days() {
        // 2024-01-01T00:00:00Z in epoch ms; the range below is Jan 1 - Jan 2.
        let jan1 = 1_704_067_200_000_i64;
        let service = service_with_listing(json!({ "data_file_list": [
            listed_file("before", jan1 - 1),
            listed_file("at-start", jan1),
            listed_file("end-of-range", jan1 + MS_PER_DAY + 82_800_000),
            listed_file("after", jan1 + 2 * MS_PER_DAY + 43_200_000),
        ]}));

        let result = service
            .get_files(Parameters(FilesRequest {
                start_date: Some("2024-01-01".into()),
                end_date: Some("2024-01-02".into()),
                limit: None,
            }))
            .await
            .unwrap();

        assert_ne!(result.is_error, Some(true));
        let files: Vec<FileView> = serde_json::from_value(payload(&result)).unwrap();
        let ids: Vec<&str> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["end-of-range", "at-start"]);
    }

    #[tokio::test]
    async fn get_files_rejects_inverted_range() {
        let service = service_with_listing(json!({ "data_file_list": [] }));

        let result = service
            .get_files(Parameters(FilesRequest {
                start_date: Some("2024-02-01".into()),
                end_date: Some("2024-01-01".into()),
                limit: None,
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        assert_eq!(payload(&result)["error"]["kind"], "invalid_input");
    }

    #[test]
    fn duration_formatting_matches_scale() {
        assert_eq!(format_duration(3_000), "3s");
        assert_eq!(format_duration(123_000), "2m 3s");
        assert_eq!(format_duration(3_723_000), "1h 2m 3s");
        assert_eq!(format_duration(0), "");
    }

    #[test]
    fn timestamps_render_as_iso() {
        assert_eq!(format_timestamp(0), "");
        assert_eq!(format_timestamp(1_704_067_200_000), "2024-01-01T00:00:00");
    }

    #[test]
    fn dates_parse_in_both_forms() {
        assert_eq!(parse_date_to_ms("2024-01-01").unwrap(), 1_704_067_200_000);
        assert_eq!(
            parse_date_to_ms("2024-01-01T00:00:00Z").unwrap(),
            1_704_067_200_000
        );
        assert_eq!(
            parse_date_to_ms("not a date").unwrap_err().kind(),
            "invalid_input"
        );
    }

    #[test]
    fn file_view_round_trips_through_json() {
        let record = FileRecord {
            id: "f1".into(),
            filename: "standup.wav".into(),
            start_time: 1_704_067_200_000,
            duration: 3_723_000,
            is_trans: true,
            is_summary: false,
        };
        let view = format_file(&record);
        let encoded = serde_json::to_string_pretty(&view).unwrap();
        let decoded: FileView = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, view);
        assert_eq!(decoded.date, "2024-01-01T00:00:00");
        assert_eq!(decoded.duration, "1h 2m 3s");
    }

    #[test]
    fn transcript_view_round_trips_through_json() {
        let view = TranscriptView {
            file_id: "f1".into(),
            transcript: "**Alice:** hello".into(),
            segment_count: 1,
            segments: vec![SegmentView {
                speaker: "Alice".into(),
                content: "hello".into(),
                start_time: 0,
                end_time: 4_000,
            }],
        };
        let encoded = serde_json::to_string(&view).unwrap();
        let decoded: TranscriptView = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, view);
    }

    #[test]
    fn failure_payload_carries_stable_kind() {
        let result = failure(&ClientError::NotFound("f1".into()));
        assert_eq!(result.is_error, Some(true));
        let text = result
            .content
            .first()
            .and_then(|c| c.as_text())
            .expect("text content");
        let value: serde_json::Value = serde_json::from_str(&text.text).unwrap();
        assert_eq!(value["error"]["kind"], "not_found");
        assert!(value["error"]["message"].as_str().unwrap().contains("f1"));
    }
}
