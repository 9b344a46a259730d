// ── Session ──
//
// Ties an authenticated `Account` to the journals it can read. A session
// either logs in fresh (`connect`) or wraps an account restored from
// saved server state (`resume`).

use std::sync::Arc;

use tracing::{debug, info};

use journalkit_api::{Account, LoginReply, ProtocolServer};

use crate::config::{AccountConfig, JournalOptions};
use crate::error::CoreError;
use crate::journal::JournalIndex;

/// An account plus the journals it may read.
pub struct Session {
    account: Arc<Account>,
    login: Option<LoginReply>,
    options: JournalOptions,
}

impl Session {
    /// Build the transport from `config` and log in.
    pub async fn connect(config: &AccountConfig) -> Result<Self, CoreError> {
        let server = ProtocolServer::new(config.url.clone(), &config.transport())?;
        if config.use_fast_servers {
            server.set_use_fast_servers(true);
        }
        let account = Account::new(config.username.clone(), server);

        let login = account
            .login(&config.password)
            .await
            .map_err(|e| match e {
                journalkit_api::Error::Protocol { message } => {
                    CoreError::AuthenticationFailed { message }
                }
                other => CoreError::from(other),
            })?;
        info!(
            user = %config.username,
            shared = login.shared_journals.len(),
            "session established"
        );

        Ok(Self {
            account: Arc::new(account),
            login: Some(login),
            options: config.journal,
        })
    }

    /// Wrap an account that already holds a login payload.
    pub fn resume(account: Arc<Account>, options: JournalOptions) -> Self {
        debug!(user = %account.username(), "resuming session");
        Self {
            account,
            login: None,
            options,
        }
    }

    pub fn account(&self) -> &Arc<Account> {
        &self.account
    }

    /// What the server reported at login; `None` for a resumed session.
    pub fn login_reply(&self) -> Option<&LoginReply> {
        self.login.as_ref()
    }

    /// The account's own journal followed by its shared journals. A
    /// resumed session only knows the former.
    pub fn journals(&self) -> Vec<String> {
        let mut names = vec![self.account.username().to_owned()];
        if let Some(login) = &self.login {
            names.extend(login.shared_journals.iter().cloned());
        }
        names
    }

    /// An index over `name`.
    ///
    /// After a fresh login, names the server did not list are rejected.
    pub fn journal(&self, name: &str) -> Result<JournalIndex, CoreError> {
        if self.login.is_some() && !self.journals().iter().any(|j| j == name) {
            return Err(CoreError::JournalNotFound { name: name.into() });
        }
        Ok(JournalIndex::new(
            Arc::clone(&self.account),
            name,
            &self.options,
        ))
    }

    /// An index over the account owner's journal.
    pub fn default_journal(&self) -> JournalIndex {
        JournalIndex::new(
            Arc::clone(&self.account),
            self.account.username(),
            &self.options,
        )
    }
}
