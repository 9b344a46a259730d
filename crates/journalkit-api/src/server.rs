// Flat protocol server
//
// Wraps `reqwest::Client` with the flat interface URL, request body
// assembly (mode + protocol version + caller params + cached login),
// fast-server routing, and reply decoding. Server-declared errors are
// left to `Account`; this module only reports transport failures.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use reqwest::header::{CONTENT_TYPE, COOKIE};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, trace};
use url::Url;

use crate::auth::LoginPayload;
use crate::codec::{self, FlatValue, Framing, Params, ReplyMap};
use crate::error::Error;
use crate::reachability::{
    ReachabilityEvent, ReachabilityFlags, ReachabilityHandle, ReachabilityMonitor,
    ReachabilityState, ReachabilityTarget,
};
use crate::transport::TransportConfig;

/// Path of the flat interface, relative to the site base URL.
pub const FLAT_INTERFACE_PATH: &str = "interface/flat";

/// Protocol revision sent as `ver` (1 = UTF-8 aware).
pub const PROTOCOL_VERSION: &str = "1";

/// Cookie that routes a request to the load-balanced fast server pool.
const FAST_SERVER_COOKIE: &str = "ljfastserver=1";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Persistable server settings: base URL, fast-server preference and the
/// cached login payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerState {
    pub url: Url,
    #[serde(default)]
    pub use_fast_servers: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_payload: Option<LoginPayload>,
}

/// A flat-protocol server endpoint.
///
/// One request is in flight at a time: `send` holds `request_lock` from
/// body assembly until the reply is decoded, so the login payload and
/// endpoint selection a request sees cannot change underneath it.
pub struct ProtocolServer {
    http: reqwest::Client,
    base_url: RwLock<Url>,
    use_fast_servers: AtomicBool,
    login_payload: RwLock<Option<LoginPayload>>,
    request_lock: Mutex<()>,
    timeout: Option<Duration>,
    reachability: ReachabilityMonitor,
}

impl ProtocolServer {
    /// Create a server from a `TransportConfig`.
    ///
    /// The `base_url` is the site root, e.g. `https://www.livejournal.com/`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let mut server = Self::with_client(http, base_url);
        server.timeout = Some(transport.timeout);
        Ok(server)
    }

    /// Create a server with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url: RwLock::new(normalize_base(base_url)),
            use_fast_servers: AtomicBool::new(false),
            login_payload: RwLock::new(None),
            request_lock: Mutex::new(()),
            timeout: None,
            reachability: ReachabilityMonitor::default(),
        }
    }

    /// Replace the reachability monitor (custom probe or interval).
    pub fn with_reachability(mut self, monitor: ReachabilityMonitor) -> Self {
        self.reachability = monitor;
        self
    }

    /// Restore a server from persisted state.
    pub fn from_state(state: ServerState, transport: &TransportConfig) -> Result<Self, Error> {
        let server = Self::new(state.url, transport)?;
        server.set_use_fast_servers(state.use_fast_servers);
        if let Some(payload) = state.login_payload {
            server.set_login_payload(payload);
        }
        Ok(server)
    }

    /// Snapshot the persistable settings.
    pub fn state(&self) -> ServerState {
        ServerState {
            url: self.url(),
            use_fast_servers: self.is_using_fast_servers(),
            login_payload: self.login_payload(),
        }
    }

    // ── Endpoint configuration ───────────────────────────────────────

    /// The site base URL.
    pub fn url(&self) -> Url {
        self.base_url.read().expect("URL lock poisoned").clone()
    }

    /// Point the server at a different site. Reachability monitoring, if
    /// running, keeps watching the old host until re-enabled.
    pub fn set_url(&self, url: Url) {
        debug!(%url, "server URL changed");
        *self.base_url.write().expect("URL lock poisoned") = normalize_base(url);
    }

    /// Full URL of the flat interface.
    pub fn endpoint(&self) -> Result<Url, Error> {
        Ok(self.url().join(FLAT_INTERFACE_PATH)?)
    }

    pub fn is_using_fast_servers(&self) -> bool {
        self.use_fast_servers.load(Ordering::Relaxed)
    }

    pub fn set_use_fast_servers(&self, enabled: bool) {
        self.use_fast_servers.store(enabled, Ordering::Relaxed);
    }

    // ── Login cache ──────────────────────────────────────────────────

    pub fn login_payload(&self) -> Option<LoginPayload> {
        self.login_payload
            .read()
            .expect("login lock poisoned")
            .clone()
    }

    pub fn set_login_payload(&self, payload: LoginPayload) {
        debug!(user = payload.username(), "caching login payload");
        *self.login_payload.write().expect("login lock poisoned") = Some(payload);
    }

    pub fn clear_login_payload(&self) {
        *self.login_payload.write().expect("login lock poisoned") = None;
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Build the form body for `mode`: mode, protocol version, caller
    /// params, then the cached login fragment.
    pub fn build_body(&self, mode: &str, params: &Params) -> Result<Bytes, Error> {
        let login = self.login_payload();
        assemble_body(mode, params, login.as_ref())
    }

    /// Send a request authenticated with the cached login payload.
    pub async fn send(&self, mode: &str, params: &Params) -> Result<ReplyMap, Error> {
        let _guard = self.request_lock.lock().await;
        let body = self.build_body(mode, params)?;
        self.post(mode, body).await
    }

    /// Send a request authenticated with `payload` instead of the cache.
    ///
    /// Used by login, which must not replace the cache until it succeeds.
    pub async fn send_with_login(
        &self,
        mode: &str,
        params: &Params,
        payload: &LoginPayload,
    ) -> Result<ReplyMap, Error> {
        let _guard = self.request_lock.lock().await;
        let body = assemble_body(mode, params, Some(payload))?;
        self.post(mode, body).await
    }

    async fn post(&self, mode: &str, body: Bytes) -> Result<ReplyMap, Error> {
        let url = self.endpoint()?;
        let fast = self.is_using_fast_servers();
        debug!(%url, mode, fast, "POST flat request");

        let mut builder = self
            .http
            .post(url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body);
        if fast {
            builder = builder.header(COOKIE, FAST_SERVER_COOKIE);
        }

        let resp = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| self.transport_error(e))?;
        let reply = codec::decode(&bytes, Framing::Lines)?;
        trace!(mode, keys = reply.len(), "decoded reply");
        Ok(reply)
    }

    fn transport_error(&self, err: reqwest::Error) -> Error {
        match self.timeout {
            Some(timeout) if err.is_timeout() => Error::Timeout {
                timeout_secs: timeout.as_secs(),
            },
            _ => Error::Transport(err),
        }
    }

    // ── Reachability ─────────────────────────────────────────────────

    /// Probe the server host once. Works whether or not monitoring is on.
    pub async fn reachability(&self) -> Result<ReachabilityFlags, Error> {
        let target = ReachabilityTarget::from_url(&self.url())?;
        self.reachability.check(&target).await
    }

    /// Last known reachability state.
    pub fn reachability_state(&self) -> ReachabilityState {
        self.reachability.state()
    }

    pub fn watch_reachability(&self) -> watch::Receiver<ReachabilityState> {
        self.reachability.watch_state()
    }

    pub fn subscribe_reachability(&self) -> broadcast::Receiver<ReachabilityEvent> {
        self.reachability.subscribe()
    }

    /// Start posting reachability events for the current host.
    pub fn enable_reachability_monitoring(&self) -> Result<ReachabilityHandle, Error> {
        let target = ReachabilityTarget::from_url(&self.url())?;
        Ok(self.reachability.enable(target))
    }

    pub fn disable_reachability_monitoring(&self) {
        self.reachability.disable();
    }

    pub fn is_monitoring_reachability(&self) -> bool {
        self.reachability.is_monitoring()
    }
}

fn assemble_body(
    mode: &str,
    params: &Params,
    login: Option<&LoginPayload>,
) -> Result<Bytes, Error> {
    let mut request = Params::with_capacity(params.len() + 2);
    request.insert("mode".into(), FlatValue::from(mode));
    request.insert("ver".into(), FlatValue::from(PROTOCOL_VERSION));
    for (key, value) in params {
        if key == "mode" {
            continue;
        }
        request.insert(key.clone(), value.clone());
    }

    let encoded = codec::encode(&request, Framing::Form)?;
    let Some(login) = login else {
        return Ok(encoded);
    };

    let mut body = BytesMut::with_capacity(encoded.len() + login.fragment().len() + 1);
    body.extend_from_slice(&encoded);
    body.extend_from_slice(b"&");
    body.extend_from_slice(login.fragment().as_bytes());
    Ok(body.freeze())
}

/// `Url::join` drops the last path segment unless it ends with a slash.
fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
