//! Shared configuration for journalkit consumers.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! translation to `journalkit_core::AccountConfig`, and persistence of
//! `journalkit_api::ServerState` between runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use journalkit_api::{Account, ProtocolServer, ServerState};
use journalkit_core::{AccountConfig, DEFAULT_SUMMARY_LENGTH, JournalOptions, TlsVerification};

const KEYRING_SERVICE: &str = "journalkit";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("no profile named '{name}'")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("failed to parse saved state: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot restore server: {0}")]
    Server(#[from] journalkit_api::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|p| (name, p))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_summary_length")]
    pub summary_length: u32,

    #[serde(default)]
    pub fast_servers: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            insecure: false,
            timeout: default_timeout(),
            summary_length: default_summary_length(),
            fast_servers: false,
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_summary_length() -> u32 {
    DEFAULT_SUMMARY_LENGTH
}

/// A named account profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Server base URL (e.g., "https://www.livejournal.com/").
    pub server: String,

    pub username: String,

    /// Password (plaintext; prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Override the fast-server default.
    pub fast_servers: Option<bool>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout, in seconds.
    pub timeout: Option<u64>,

    /// Override summary length, in characters.
    pub summary_length: Option<u32>,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "journalkit", "journalkit")
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("journalkit");
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Where the server state for `profile_name` is kept.
pub fn state_path(profile_name: &str) -> PathBuf {
    let dir = project_dirs().map_or_else(
        || dirs_fallback().join("state"),
        |dirs| dirs.data_dir().join("state"),
    );
    dir.join(format!("{profile_name}.toml"))
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the Config from `path` + environment. A missing file yields the
/// defaults.
///
/// Environment variables override the file: `JOURNALKIT_DEFAULTS__TIMEOUT=60`
/// sets `defaults.timeout`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("JOURNALKIT_").split("__"));

    let config: Config = figment.extract()?;
    debug!(path = %path.display(), profiles = config.profiles.len(), "loaded config");
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    write_toml(path, &toml::to_string_pretty(cfg)?)
}

fn write_toml(path: &Path, text: &str) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the profile's password.
///
/// Order: the profile's `password_env` variable, `JOURNALKIT_PASSWORD`,
/// the system keyring (`journalkit` / `{profile}/password`), then the
/// plaintext `password` field.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_password_with(profile, profile_name, |name| std::env::var(name).ok())
}

fn resolve_password_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Env vars
    if let Some(pw) = profile.password_env.as_deref().and_then(&env) {
        return Ok(SecretString::from(pw));
    }
    if let Some(pw) = env("JOURNALKIT_PASSWORD") {
        return Ok(SecretString::from(pw));
    }

    // 2. Keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Build an `AccountConfig` from a profile, falling back to `defaults`.
pub fn profile_to_account_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<AccountConfig, ConfigError> {
    let password = resolve_password(profile, profile_name)?;
    build_account_config(profile, defaults, password)
}

fn build_account_config(
    profile: &Profile,
    defaults: &Defaults,
    password: SecretString,
) -> Result<AccountConfig, ConfigError> {
    let url: url::Url = profile.server.parse().map_err(|_| ConfigError::Validation {
        field: "server".into(),
        reason: format!("invalid URL: {}", profile.server),
    })?;
    if profile.username.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "username".into(),
            reason: "must not be empty".into(),
        });
    }

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    Ok(AccountConfig {
        url,
        username: profile.username.clone(),
        password,
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        use_fast_servers: profile.fast_servers.unwrap_or(defaults.fast_servers),
        journal: JournalOptions {
            summary_length: profile.summary_length.unwrap_or(defaults.summary_length),
        },
    })
}

// ── Server state ────────────────────────────────────────────────────

/// Save `state` for `profile_name` at the canonical state path.
pub fn save_server_state(profile_name: &str, state: &ServerState) -> Result<(), ConfigError> {
    save_server_state_to(state, &state_path(profile_name))
}

pub fn save_server_state_to(state: &ServerState, path: &Path) -> Result<(), ConfigError> {
    write_toml(path, &toml::to_string_pretty(state)?)?;
    debug!(path = %path.display(), "saved server state");
    Ok(())
}

/// Load the saved state for `profile_name`; `None` if nothing was saved.
pub fn load_server_state(profile_name: &str) -> Result<Option<ServerState>, ConfigError> {
    load_server_state_from(&state_path(profile_name))
}

pub fn load_server_state_from(path: &Path) -> Result<Option<ServerState>, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(toml::from_str(&text)?))
}

/// Rebuild an account from saved state, skipping the login round trip
/// when the state holds a login payload.
pub fn account_from_state(state: ServerState, config: &AccountConfig) -> Result<Account, ConfigError> {
    let server = ProtocolServer::from_state(state, &config.transport())?;
    Ok(Account::new(config.username.clone(), server))
}
