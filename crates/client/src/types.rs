use serde::{Deserialize, Serialize};

/// One recording as listed by the Plaud consumer API.
///
/// Field names follow the wire format of `GET file/simple/web`; a record is an
/// immutable snapshot from a single fetch and is never cached between calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    #[serde(default)]
    pub filename: String,
    /// Recording start, milliseconds since the epoch.
    #[serde(default)]
    pub start_time: i64,
    /// Recording length in milliseconds.
    #[serde(default)]
    pub duration: i64,
    /// Whether a transcript has been produced.
    #[serde(default)]
    pub is_trans: bool,
    /// Whether an AI summary has been produced.
    #[serde(default)]
    pub is_summary: bool,
}

/// One speaker-labeled span of a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    #[serde(default)]
    pub speaker: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub end_time: i64,
}

/// Full transcript of one recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub file_id: String,
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    /// Plain transcript text, segment contents joined by newlines.
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .filter(|s| !s.content.is_empty())
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Markdown rendering with `**Speaker:**` labels where known.
    pub fn labeled_text(&self) -> String {
        self.segments
            .iter()
            .filter(|s| !s.content.is_empty())
            .map(|s| {
                if s.speaker.is_empty() {
                    s.content.clone()
                } else {
                    format!("**{}:** {}", s.speaker, s.content)
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// AI-generated summary of one recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub file_id: String,
    /// Markdown body (`ai_content` on the wire).
    pub content: String,
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub category: String,
}
