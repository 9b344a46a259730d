// ── Core error types ──
//
// User-facing errors from journalkit-core. Consumers never see reqwest
// errors or raw codec failures directly; the `From<journalkit_api::Error>`
// impl translates transport-layer errors into domain variants.

use thiserror::Error;

use crate::model::ItemId;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach server at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Server request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("HTTP {status} from server: {message}")]
    Http { status: u16, message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Entry {item_id} not found in journal {journal}")]
    EntryNotFound { journal: String, item_id: ItemId },

    #[error("Journal not accessible: {name}")]
    JournalNotFound { name: String },

    #[error("Malformed reply: {message}")]
    Parse { message: String },

    // ── Operation errors ─────────────────────────────────────────────
    /// The server declared the request failed (`success != OK`).
    #[error("Server rejected request: {message}")]
    Server { message: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Returns `true` if a specifically requested item does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EntryNotFound { .. } | Self::JournalNotFound { .. }
        )
    }

    /// Returns `true` if no reply was obtained from the server.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::Timeout { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<journalkit_api::Error> for CoreError {
    fn from(err: journalkit_api::Error) -> Self {
        use journalkit_api::Error as ApiError;

        match err {
            ApiError::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                }
            }
            ApiError::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            ApiError::Tls(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {reason}"),
            },
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::Http { status, body } => CoreError::Http {
                status,
                message: body,
            },
            ApiError::Parse { message } => CoreError::Parse { message },
            ApiError::Encoding { message } => CoreError::Validation { message },
            ApiError::Protocol { message } => CoreError::Server { message },
            ApiError::NotLoggedIn => CoreError::AuthenticationFailed {
                message: "not logged in".into(),
            },
            ApiError::Reachability(message) => CoreError::Config { message },
        }
    }
}
