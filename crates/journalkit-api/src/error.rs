use thiserror::Error;

/// Top-level error type for the `journalkit-api` crate.
///
/// Covers the transport, codec and server-declared failure modes of the
/// flat protocol. `journalkit-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The server answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    // ── Codec ───────────────────────────────────────────────────────
    /// Reply body could not be decoded (inconsistent count/index keys,
    /// dangling key line, etc.). No partial reply is returned.
    #[error("Malformed reply: {message}")]
    Parse { message: String },

    /// Request parameters cannot be represented in the flat encoding.
    #[error("Cannot encode request: {message}")]
    Encoding { message: String },

    // ── Server ──────────────────────────────────────────────────────
    /// The reply parsed fine but the server declared a failure
    /// (`success != OK`). Carries the server's `errmsg` text.
    #[error("Server error: {message}")]
    Protocol { message: String },

    /// A request that needs authentication was issued before login.
    #[error("Not logged in")]
    NotLoggedIn,

    // ── Reachability ────────────────────────────────────────────────
    /// The reachability target could not be derived from the server URL.
    #[error("Reachability target unavailable: {0}")]
    Reachability(String),
}

impl Error {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub(crate) fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the server itself rejected the request.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Returns `true` if no reply was obtained at all.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. } | Self::Tls(_))
    }
}
