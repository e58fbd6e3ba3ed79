/// Convenient result alias for update-check operations.
pub type Result<T> = std::result::Result<T, UpdateCheckError>;

/// Errors that can end a discovery run or a local operation.
#[derive(thiserror::Error, Debug)]
pub enum UpdateCheckError {
    /// Network request failed, timed out or returned a non-success status.
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    /// The server answered but the body could not be used.
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse {
        /// URL that produced the response.
        url: String,
        /// What was wrong with it.
        reason: String,
    },
    /// A URL could not be built or parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// Persisting the state snapshot failed; the previous snapshot is untouched.
    #[error("failed to write state snapshot: {0}")]
    StateWrite(#[source] std::io::Error),
    /// The state snapshot could not be encoded.
    #[error("state encoding failed: {0}")]
    StateEncode(#[from] serde_json::Error),
    /// Failed to perform an I/O operation.
    #[error("filesystem operation failed: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl UpdateCheckError {
    /// Helper for wrapping validation failures.
    pub fn validation(msg: impl Into<String>) -> Self {
        UpdateCheckError::Other(msg.into())
    }

    /// True when the run failed because the remote side could not be reached
    /// or answered with something unusable.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            UpdateCheckError::Fetch(_) | UpdateCheckError::MalformedResponse { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_failures_are_classified() {
        let err = UpdateCheckError::MalformedResponse {
            url: "http://example.invalid/update_list".into(),
            reason: "body is not valid UTF-8".into(),
        };
        assert!(err.is_fetch_failure());
        assert!(err.to_string().contains("update_list"));

        let err = UpdateCheckError::StateWrite(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        ));
        assert!(!err.is_fetch_failure());
        assert!(err.to_string().contains("state snapshot"));
    }
}
