use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Every failure a caller can observe, with a stable machine-readable kind.
///
/// Tool consumers branch on [`ClientError::kind`], so variant-to-kind mapping
/// is part of the public contract and must not change between releases.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("no Plaud Desktop credential found: {0}")]
    CredentialNotFound(String),

    #[error("Plaud Desktop is not running: {0}")]
    ProcessNotRunning(String),

    #[error("could not open debug bridge to Plaud Desktop: {0}")]
    BridgeHandshakeFailed(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("Plaud API error ({status}): {message}")]
    RemoteError { status: u16, message: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("no transcript available for file {0}")]
    NoTranscriptAvailable(String),

    #[error("no summary available for file {0}")]
    NoSummaryAvailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ClientError {
    /// Stable snake_case identifier for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::CredentialNotFound(_) => "credential_not_found",
            ClientError::ProcessNotRunning(_) => "process_not_running",
            ClientError::BridgeHandshakeFailed(_) => "bridge_handshake_failed",
            ClientError::Unauthorized(_) => "unauthorized",
            ClientError::RemoteError { .. } => "remote_error",
            ClientError::Timeout(_) => "timeout",
            ClientError::NotFound(_) => "not_found",
            ClientError::NoTranscriptAvailable(_) => "no_transcript_available",
            ClientError::NoSummaryAvailable(_) => "no_summary_available",
            ClientError::InvalidInput(_) => "invalid_input",
        }
    }

    /// True for failures that mean no usable session could be obtained at all,
    /// as opposed to a session that stopped working mid-flight.
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(
            self,
            ClientError::CredentialNotFound(_)
                | ClientError::ProcessNotRunning(_)
                | ClientError::BridgeHandshakeFailed(_)
        )
    }
}

/// Map a reqwest transport failure onto the taxonomy.
pub(crate) fn from_reqwest(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout(err.to_string())
    } else {
        ClientError::RemoteError {
            status: err.status().map(|s| s.as_u16()).unwrap_or(0),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            ClientError::CredentialNotFound(String::new()).kind(),
            "credential_not_found"
        );
        assert_eq!(
            ClientError::RemoteError {
                status: 500,
                message: String::new()
            }
            .kind(),
            "remote_error"
        );
        assert_eq!(
            ClientError::NoTranscriptAvailable("f1".into()).kind(),
            "no_transcript_available"
        );
    }

    #[test]
    fn acquisition_failures_are_classified() {
        assert!(ClientError::ProcessNotRunning(String::new()).is_acquisition_failure());
        assert!(!ClientError::Unauthorized(String::new()).is_acquisition_failure());
    }
}
