use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// The authentication fragment appended to every request after login.
///
/// Holds the already-encoded `user=...&auth_method=clear&password=...`
/// pairs so that each request reuses them verbatim instead of
/// renegotiating. Replaced only by an explicit re-login.
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "StoredLoginPayload", into = "StoredLoginPayload")]
pub struct LoginPayload {
    username: String,
    fragment: SecretString,
}

impl LoginPayload {
    /// Encode a clear-text password login for `username`.
    pub fn from_credentials(username: &str, password: &SecretString) -> Self {
        let fragment = form_urlencoded::Serializer::new(String::new())
            .append_pair("user", username)
            .append_pair("auth_method", "clear")
            .append_pair("password", password.expose_secret())
            .finish();
        Self {
            username: username.to_owned(),
            fragment: SecretString::from(fragment),
        }
    }

    /// Rebuild a payload from a previously encoded fragment.
    pub fn from_encoded(username: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            fragment: SecretString::from(fragment.into()),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// The encoded fragment, ready to append to a form body.
    pub(crate) fn fragment(&self) -> &str {
        self.fragment.expose_secret()
    }
}

impl fmt::Debug for LoginPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginPayload")
            .field("username", &self.username)
            .field("fragment", &"[REDACTED]")
            .finish()
    }
}

/// Plain on-disk shape. The fragment embeds the password, so whoever
/// persists it owns protecting the file.
#[derive(Serialize, Deserialize)]
struct StoredLoginPayload {
    username: String,
    fragment: String,
}

impl From<StoredLoginPayload> for LoginPayload {
    fn from(stored: StoredLoginPayload) -> Self {
        Self::from_encoded(stored.username, stored.fragment)
    }
}

impl From<LoginPayload> for StoredLoginPayload {
    fn from(payload: LoginPayload) -> Self {
        Self {
            fragment: payload.fragment.expose_secret().to_owned(),
            username: payload.username,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_are_form_encoded() {
        let secret: SecretString = "p&ss word".to_string().into();
        let payload = LoginPayload::from_credentials("frank", &secret);
        assert_eq!(
            payload.fragment(),
            "user=frank&auth_method=clear&password=p%26ss+word"
        );
        assert_eq!(payload.username(), "frank");
    }

    #[test]
    fn debug_output_redacts_the_fragment() {
        let payload = LoginPayload::from_encoded("frank", "user=frank&password=hunter2");
        let printed = format!("{payload:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("frank"));
    }
}
