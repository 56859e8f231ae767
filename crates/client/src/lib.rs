//! Plaud API client that borrows authentication from the Plaud Desktop app.
//!
//! No developer API credentials are needed: a session is acquired either by
//! extracting the JWT the desktop app persists in its LevelDB local storage,
//! or by attaching to the running app over its Node inspector and executing
//! calls inside its authenticated context.

mod bridge;
mod client;
mod config;
mod error;
mod search;
mod session;
mod token;
mod types;

#[cfg(test)]
mod testing;

pub use bridge::BridgeHandle;
pub use client::{ApiExecutor, ApiRequest, DesktopExecutor, PlaudClient};
pub use config::{AuthStrategy, Config};
pub use error::{ClientError, Result};
pub use search::{extract_excerpt, search_transcripts, SearchMatch};
pub use session::{DesktopAcquirer, Session, SessionProvider, TokenSession};
pub use types::{FileRecord, Summary, Transcript, TranscriptSegment};
