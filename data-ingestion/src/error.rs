use thiserror::Error;

/// Failure below the HTTP status line
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request could not be built: {0}")]
    Request(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Request(_))
    }
}

/// Outcome of a failed fetch, after the retry loop has run
#[derive(Debug, Error)]
pub enum FetchError {
    /// Timeouts, connection errors, 5xx and 429 that outlived the retry budget
    #[error("{source_name}: transient failure after {attempts} attempts: {last_error}")]
    Transient {
        source_name: String,
        attempts: u32,
        last_error: String,
    },

    /// 4xx (other than 429), undecodable bodies, missing resources
    #[error("{source_name}: permanent failure (status {status:?}): {reason}")]
    Permanent {
        source_name: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("{source_name}: response failed shape validation")]
    InvalidShape { source_name: String },
}

impl FetchError {
    pub fn permanent(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        FetchError::Permanent {
            source_name: source_name.into(),
            status: None,
            reason: reason.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    pub fn source_name(&self) -> &str {
        match self {
            FetchError::Transient { source_name, .. }
            | FetchError::Permanent { source_name, .. }
            | FetchError::InvalidShape { source_name } => source_name,
        }
    }
}
