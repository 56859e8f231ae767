//! JWT extraction from Plaud Desktop's LevelDB local storage.
//!
//! The desktop app persists its bearer token in Electron Local Storage.
//! LevelDB interleaves record framing bytes with the value, so the token
//! cannot be read out as one contiguous string: the base64url runs have to
//! be collected and the payload rebuilt from its known claim structure.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::error::{ClientError, Result};
use crate::session::TokenSession;

static SUB_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""sub":"([a-f0-9]+)""#).expect("static regex"));
static EXP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{10})").expect("static regex"));
static IAT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""iat":(\d+)"#).expect("static regex"));

const BEARER_MARKER: &[u8] = b"bearer eyJ";
/// How far past the marker a token can plausibly extend.
const TOKEN_WINDOW: usize = 600;
/// Fallback token lifetime (~300 days) when `iat` is not recoverable.
const DEFAULT_LIFETIME_SECS: i64 = 25_920_000;

/// Scan the LevelDB directory for the desktop app's bearer token.
pub fn extract_token(storage_dir: &Path) -> Result<TokenSession> {
    if !storage_dir.exists() {
        return Err(ClientError::CredentialNotFound(format!(
            "Plaud Desktop storage not found at {}",
            storage_dir.display()
        )));
    }

    let mut ldb_files: Vec<_> = fs::read_dir(storage_dir)
        .map_err(|e| ClientError::CredentialNotFound(format!("cannot read storage dir: {e}")))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "ldb"))
        .collect();
    // Newest table files first so a refreshed token wins over a stale one.
    ldb_files.sort();
    ldb_files.reverse();

    for path in &ldb_files {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                log::debug!("skipping unreadable ldb file {}: {e}", path.display());
                continue;
            }
        };
        if let Some(session) = reconstruct_token(&data) {
            log::debug!(
                "extracted Plaud token for user {} from {}",
                session.user_id,
                path.display()
            );
            return Ok(session);
        }
    }

    Err(ClientError::CredentialNotFound(
        "no bearer token found in Plaud Desktop storage; sign in to the desktop app".to_string(),
    ))
}

/// Rebuild a three-segment JWT from one LevelDB table file's bytes.
fn reconstruct_token(data: &[u8]) -> Option<TokenSession> {
    let idx = find_subsequence(data, BEARER_MARKER)?;
    // Skip the "bearer " prefix; the chunk starts at the JWT header.
    let start = idx + 7;
    let end = data.len().min(start + TOKEN_WINDOW);
    let chunk = &data[start..end];

    let header_end = chunk.iter().position(|&b| b == b'.')?;
    let header = String::from_utf8_lossy(&chunk[..header_end]).into_owned();

    let segments = base64_runs(&chunk[header_end + 1..]);
    let parts: Vec<&String> = segments
        .iter()
        .filter(|s| s.len() > 20 && !s.starts_with("logged"))
        .collect();
    if parts.len() < 4 {
        return None;
    }

    let seg0 = decode_lossy(parts[0]);
    let sub = SUB_RE.captures(&seg0)?.get(1)?.as_str().to_string();

    let seg1 = decode_lossy(parts[1]);
    let exp: i64 = EXP_RE.captures(&seg1)?.get(1)?.as_str().parse().ok()?;
    let iat: i64 = IAT_RE
        .captures(&seg1)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(exp - DEFAULT_LIFETIME_SECS);

    // Segment 2 is record framing noise; the signature follows it.
    let signature = parts[3];

    let payload = json!({
        "sub": sub,
        "aud": "",
        "exp": exp,
        "iat": iat,
        "client_id": "desktop",
        "region": "aws:us-west-2",
    });
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload.to_string());

    Some(TokenSession {
        jwt: format!("{header}.{payload_b64}.{signature}"),
        user_id: sub,
        expires_at: Some(exp),
    })
}

/// Collect runs of base64url characters longer than five bytes.
fn base64_runs(bytes: &[u8]) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    for &b in bytes {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            current.push(b as char);
        } else {
            if current.len() > 5 {
                runs.push(std::mem::take(&mut current));
            }
            current.clear();
        }
    }
    if current.len() > 5 {
        runs.push(current);
    }
    runs
}

/// Best-effort base64url decode of a possibly truncated segment.
fn decode_lossy(segment: &str) -> String {
    // A run may be cut mid-quantum; drop the trailing partial bytes.
    let trimmed = &segment[..segment.len() - segment.len() % 4];
    match URL_SAFE_NO_PAD.decode(trimmed) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::new(),
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn b64(data: &str) -> String {
        URL_SAFE_NO_PAD.encode(data)
    }

    /// A LevelDB-style blob: the token's base64 runs separated by framing bytes.
    fn synthetic_blob(sub: &str, exp: i64, iat: i64, signature: &str) -> Vec<u8> {
        let header = b64(r#"{"alg":"HS256","typ":"JWT"}"#);
        let seg0 = b64(&format!(r#"{{"sub":"{sub}","aud":"""#));
        let seg1 = b64(&format!(r#"{{"exp":{exp},"iat":{iat}}}"#));
        let noise = "A".repeat(32);

        let mut blob = Vec::new();
        blob.extend_from_slice(b"\x00\x12leveldb-junk\x01");
        blob.extend_from_slice(b"bearer ");
        blob.extend_from_slice(header.as_bytes());
        blob.push(b'.');
        blob.extend_from_slice(seg0.as_bytes());
        blob.extend_from_slice(b"\x00\x01");
        blob.extend_from_slice(seg1.as_bytes());
        blob.extend_from_slice(b"\x02");
        blob.extend_from_slice(noise.as_bytes());
        blob.extend_from_slice(b"\x03");
        blob.extend_from_slice(signature.as_bytes());
        blob.extend_from_slice(b"\xff trailing");
        blob
    }

    #[test]
    fn reconstructs_token_from_noisy_blob() {
        let blob = synthetic_blob("deadbeef01", 1_893_456_000, 1_767_225_600, &"s".repeat(43));
        let session = reconstruct_token(&blob).expect("token should be found");

        assert_eq!(session.user_id, "deadbeef01");
        assert_eq!(session.expires_at, Some(1_893_456_000));

        let parts: Vec<&str> = session.jwt.split('.').collect();
        assert_eq!(parts.len(), 3);
        let payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let claims: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(claims["sub"], "deadbeef01");
        assert_eq!(claims["exp"], 1_893_456_000_i64);
        assert_eq!(claims["iat"], 1_767_225_600_i64);
        assert_eq!(claims["client_id"], "desktop");
    }

    #[test]
    fn blob_without_marker_yields_nothing() {
        assert!(reconstruct_token(b"no token in here at all").is_none());
    }

    #[test]
    fn missing_store_is_credential_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let err = extract_token(&missing).unwrap_err();
        assert_eq!(err.kind(), "credential_not_found");
    }

    #[test]
    fn store_without_token_is_credential_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("000001.ldb"), b"nothing useful").unwrap();
        let err = extract_token(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "credential_not_found");
    }

    #[test]
    fn extracts_from_ldb_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let blob = synthetic_blob("cafef00d42", 1_893_456_000, 1_767_225_600, &"x".repeat(43));
        std::fs::write(dir.path().join("000007.ldb"), &blob).unwrap();
        // Non-ldb files are ignored.
        std::fs::write(dir.path().join("LOG"), b"bearer eyJ garbage").unwrap();

        let session = extract_token(dir.path()).unwrap();
        assert_eq!(session.user_id, "cafef00d42");
    }
}
