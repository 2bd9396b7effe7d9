/// Error type for fetch attempts.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The attempt was aborted before completion.
    ///
    /// Not a failure: controllers recognize this variant and discard the
    /// attempt's result without touching their settled state.
    #[error("fetch aborted for key '{key}'")]
    Aborted { key: String },
    /// The fetcher failed.
    #[error("fetch failed for key '{key}': {message}")]
    Failed { key: String, message: String },
}

impl FetchError {
    /// Create a new failure error.
    pub fn failed(key: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Failed {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a new abort marker.
    pub fn aborted(key: impl Into<String>) -> Self {
        FetchError::Aborted { key: key.into() }
    }

    /// Whether this error is the cancellation marker.
    pub fn is_aborted(&self) -> bool {
        matches!(self, FetchError::Aborted { .. })
    }
}
