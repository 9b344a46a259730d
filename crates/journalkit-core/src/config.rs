// ── Runtime connection configuration ──
//
// These types describe how to reach an account and how a journal index
// behaves. They carry credential data and tuning, but never touch disk;
// `journalkit-config` builds them from profiles.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use journalkit_api::{TlsMode, TransportConfig};

/// Summary length used when none is configured, in characters.
pub const DEFAULT_SUMMARY_LENGTH: u32 = 100;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed certs).
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        }
    }
}

/// Per-index behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalOptions {
    /// Maximum summary body length, in characters.
    pub summary_length: u32,
}

impl Default for JournalOptions {
    fn default() -> Self {
        Self {
            summary_length: DEFAULT_SUMMARY_LENGTH,
        }
    }
}

/// Everything needed to log in to one account.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Server base URL (e.g. `https://www.livejournal.com/`).
    pub url: Url,
    pub username: String,
    pub password: SecretString,
    pub tls: TlsVerification,
    /// Request timeout.
    pub timeout: Duration,
    /// Route requests to the fast server pool from the start.
    pub use_fast_servers: bool,
    pub journal: JournalOptions,
}

impl AccountConfig {
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: TlsMode::from(&self.tls),
            timeout: self.timeout,
        }
    }
}
