//! Error contracts shared by the request client, session controller and store.

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;

// =============================================================================
// API
// =============================================================================

/// Failures surfaced by the authorized request client and session controller.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The login endpoint rejected the identifier/secret pair.
    ///
    /// Carries no server detail on purpose; the login body is never surfaced.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The server answered with a non-2xx status.
    ///
    /// Displays as the raw response body so callers can show it verbatim.
    #[error("{body}")]
    RequestRejected { status: u16, body: String },

    /// No response was received (DNS, refused connection, dropped socket).
    #[error("network unavailable")]
    NetworkUnavailable(#[source] reqwest::Error),

    /// A 2xx body did not match the caller-declared shape.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// An operation that requires a credential was attempted without one.
    #[error("not authenticated")]
    Unauthenticated,

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ApiError {
    /// HTTP status of a rejected request, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the server refused the credential that was attached.
    ///
    /// The core never acts on this; views decide whether to prompt or log out.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::RequestRejected { status: 401, .. })
    }

    /// Stable machine-readable code for the error kind.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "E_INVALID_CREDENTIALS",
            Self::RequestRejected { status: 400..=499, .. } => "E_REQUEST_REJECTED_CLIENT",
            Self::RequestRejected { .. } => "E_REQUEST_REJECTED_SERVER",
            Self::NetworkUnavailable(_) => "E_NETWORK_UNAVAILABLE",
            Self::Decode(_) => "E_DECODE",
            Self::Unauthenticated => "E_UNAUTHENTICATED",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Failures reading or writing the durable session record.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session store io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session store record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}
