// Account: credentials + dispatch + server error classification
//
// Every journal query goes through `Account::dispatch`, which sends the
// request with the cached login payload and turns a `success != OK`
// reply into `Error::Protocol`.

use secrecy::SecretString;
use tracing::{debug, info};

use crate::auth::LoginPayload;
use crate::codec::{FlatValue, Params, ReplyMap, params};
use crate::error::Error;
use crate::server::ProtocolServer;

/// Client identifier reported at login and used as the HTTP user agent.
pub const CLIENT_VERSION: &str = concat!("Rust-journalkit/", env!("CARGO_PKG_VERSION"));

/// What the server tells us at login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginReply {
    /// The user's display name.
    pub full_name: Option<String>,
    /// Shared journals (communities) the user may post to, besides their own.
    pub shared_journals: Vec<String>,
    /// A message the server wants shown to the user.
    pub message: Option<String>,
    /// Whether the account may use the fast server pool.
    pub fast_server: bool,
}

impl LoginReply {
    fn from_reply(reply: &ReplyMap) -> Self {
        let text = |key: &str| {
            reply
                .get(key)
                .and_then(FlatValue::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        let shared_journals = reply
            .get("access")
            .and_then(FlatValue::as_list)
            .unwrap_or_default()
            .iter()
            .filter_map(FlatValue::as_str)
            .map(str::to_owned)
            .collect();

        Self {
            full_name: text("name"),
            shared_journals,
            message: text("message"),
            fast_server: text("fastserver").as_deref() == Some("1"),
        }
    }
}

/// A user account on a flat-protocol server.
pub struct Account {
    username: String,
    server: ProtocolServer,
}

impl Account {
    pub fn new(username: impl Into<String>, server: ProtocolServer) -> Self {
        Self {
            username: username.into(),
            server,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn server(&self) -> &ProtocolServer {
        &self.server
    }

    pub fn is_logged_in(&self) -> bool {
        self.server.login_payload().is_some()
    }

    /// Authenticate and cache the login payload.
    ///
    /// The cache is only replaced once the server accepts the credentials.
    /// A reply that grants fast-server access turns fast servers on.
    pub async fn login(&self, password: &SecretString) -> Result<LoginReply, Error> {
        let payload = LoginPayload::from_credentials(&self.username, password);
        let request = params([("clientversion", CLIENT_VERSION)]);

        debug!(user = %self.username, "logging in");
        let reply = self
            .server
            .send_with_login("login", &request, &payload)
            .await?;
        if let Some(err) = Self::classify(&reply) {
            return Err(err);
        }

        self.server.set_login_payload(payload);
        let login = LoginReply::from_reply(&reply);
        if login.fast_server {
            self.server.set_use_fast_servers(true);
        }
        info!(user = %self.username, fast = login.fast_server, "login successful");
        Ok(login)
    }

    /// Forget the cached login payload.
    pub fn logout(&self) {
        self.server.clear_login_payload();
        debug!(user = %self.username, "logged out");
    }

    /// Send `mode` with `params` and check the reply for a server error.
    pub async fn dispatch(&self, mode: &str, params: &Params) -> Result<ReplyMap, Error> {
        if !self.is_logged_in() {
            return Err(Error::NotLoggedIn);
        }
        let reply = self.server.send(mode, params).await?;
        match Self::classify(&reply) {
            Some(err) => Err(err),
            None => Ok(reply),
        }
    }

    /// Detect a server-declared failure in an otherwise valid reply.
    pub fn classify(reply: &ReplyMap) -> Option<Error> {
        match reply.get("success").and_then(FlatValue::as_str) {
            Some("OK") => None,
            _ => {
                let message = reply
                    .get("errmsg")
                    .and_then(FlatValue::as_str)
                    .unwrap_or("server reported failure without a message")
                    .to_owned();
                Some(Error::Protocol { message })
            }
        }
    }
}
