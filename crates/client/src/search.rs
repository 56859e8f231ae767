//! Client-side transcript search. The consumer API has no search endpoint,
//! so candidates are fetched sequentially and matched locally.

use crate::client::PlaudClient;
use crate::types::FileRecord;

/// Characters of context kept on each side of the first match.
const EXCERPT_CONTEXT: usize = 200;

/// One matching file with an excerpt centered on the first hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub file: FileRecord,
    pub excerpt: String,
}

/// Case-insensitive substring search over titles and transcript text.
///
/// Files are processed newest first so result ordering is stable across runs
/// for the same underlying data. Files whose transcript cannot be fetched are
/// skipped, not fatal: a single unreadable recording should not sink the
/// whole search.
pub async fn search_transcripts(
    client: &PlaudClient,
    files: Vec<FileRecord>,
    query: &str,
) -> Vec<SearchMatch> {
    let query_lower = query.to_lowercase();
    let mut candidates = files;
    candidates.sort_by(|a, b| b.start_time.cmp(&a.start_time));

    let mut matches = Vec::new();
    for file in candidates {
        let title_match = file.filename.to_lowercase().contains(&query_lower);

        let text = match client.transcript(&file.id).await {
            Ok(transcript) => transcript.plain_text(),
            Err(e) => {
                log::warn!("skipping file {} in search: {e}", file.id);
                continue;
            }
        };

        if title_match || text.to_lowercase().contains(&query_lower) {
            let excerpt = extract_excerpt(&text, query, EXCERPT_CONTEXT);
            matches.push(SearchMatch { file, excerpt });
        }
    }
    matches
}

/// Bounded excerpt around the first case-insensitive occurrence of `query`,
/// with ellipsis markers where the text was cut. Falls back to the head of
/// the text when only the title matched.
pub fn extract_excerpt(text: &str, query: &str, context_chars: usize) -> String {
    if text.is_empty() {
        return String::new();
    }

    let chars: Vec<char> = text.chars().collect();
    // Lowercasing can change the char count (e.g. 'İ' becomes two chars), so
    // matching happens on a lowered stream that records, for every lowered
    // char, which original char it came from.
    let mut lower_chars = Vec::with_capacity(chars.len());
    let mut origin = Vec::with_capacity(chars.len());
    for (i, c) in chars.iter().enumerate() {
        for lc in c.to_lowercase() {
            lower_chars.push(lc);
            origin.push(i);
        }
    }
    let query_chars: Vec<char> = query.to_lowercase().chars().collect();

    let span = if query_chars.is_empty() {
        None
    } else {
        lower_chars
            .windows(query_chars.len())
            .position(|window| window == query_chars.as_slice())
            .map(|pos| (origin[pos], origin[pos + query_chars.len() - 1] + 1))
    };

    let Some((match_start, match_end)) = span else {
        // Title-only match: show the opening of the transcript.
        let head_len = context_chars * 2;
        if chars.len() > head_len {
            let head: String = chars[..head_len].iter().collect();
            return format!("{head}...");
        }
        return text.to_string();
    };

    let start = match_start.saturating_sub(context_chars);
    let end = (match_end + context_chars).min(chars.len());
    let mut excerpt: String = chars[start..end].iter().collect();
    if start > 0 {
        excerpt = format!("...{excerpt}");
    }
    if end < chars.len() {
        excerpt = format!("{excerpt}...");
    }
    excerpt
}
