//! Error types for policy loading.

/// Errors surfaced while obtaining and parsing a policy document.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// No transfer buffer was supplied and no policy file exists.
    #[error("no existing policy")]
    NoPolicy,

    /// The policy text could not be decoded or parsed.
    ///
    /// `detail` carries a short diagnostic (source location + message)
    /// that fits on the display.
    #[error("HSM policy invalid: {detail}")]
    Parse {
        /// Short human-readable diagnostic.
        detail: String,
    },
}

impl PolicyError {
    /// Build a parse error from any displayable diagnostic.
    #[must_use]
    pub fn parse(detail: impl Into<String>) -> Self {
        Self::Parse {
            detail: detail.into(),
        }
    }
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
