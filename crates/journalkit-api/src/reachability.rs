//! Network reachability of the configured server.
//!
//! A [`ReachabilityProbe`] reports an opaque flag bitmask for a host;
//! [`ReachabilityState::from_flags`] turns that bitmask into a coarse state.
//! Monitoring is off until [`ReachabilityMonitor::enable`] spawns a
//! background task that re-probes on an interval and, whenever the flags
//! change, updates the shared state and broadcasts a [`ReachabilityEvent`].
//!
//! A one-shot [`ReachabilityMonitor::check`] works whether or not
//! monitoring is running.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::Error;

const EVENT_CHANNEL_CAPACITY: usize = 16;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ── Flags ────────────────────────────────────────────────────────────

/// Raw reachability bitmask. Subscribers interpret individual bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReachabilityFlags(u32);

impl ReachabilityFlags {
    /// Reachable, but only over a connection that may go away (dial-up, VPN on demand).
    pub const TRANSIENT_CONNECTION: u32 = 1 << 0;
    pub const REACHABLE: u32 = 1 << 1;
    /// Reachable once a connection is established first.
    pub const CONNECTION_REQUIRED: u32 = 1 << 2;
    pub const CONNECTION_AUTOMATIC: u32 = 1 << 3;
    pub const INTERVENTION_REQUIRED: u32 = 1 << 4;
    pub const IS_LOCAL_ADDRESS: u32 = 1 << 16;
    pub const IS_DIRECT: u32 = 1 << 17;

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }
}

impl fmt::Display for ReachabilityFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

// ── State ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ReachabilityState {
    /// Never probed, or the last probe failed.
    #[default]
    Unknown,
    Unreachable,
    Reachable,
    /// Reachable only through a connection that must be brought up first.
    ReachableIndirect,
}

impl ReachabilityState {
    /// Pure mapping from a bitmask to a state.
    pub const fn from_flags(flags: ReachabilityFlags) -> Self {
        if !flags.contains(ReachabilityFlags::REACHABLE) {
            return Self::Unreachable;
        }
        if flags.contains(ReachabilityFlags::CONNECTION_REQUIRED)
            || flags.contains(ReachabilityFlags::TRANSIENT_CONNECTION)
        {
            return Self::ReachableIndirect;
        }
        Self::Reachable
    }

    pub const fn is_reachable(self) -> bool {
        matches!(self, Self::Reachable | Self::ReachableIndirect)
    }
}

/// Posted every time monitored flags change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachabilityEvent {
    pub flags: ReachabilityFlags,
}

// ── Probe ────────────────────────────────────────────────────────────

/// Host and port a probe checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachabilityTarget {
    pub host: String,
    pub port: u16,
}

impl ReachabilityTarget {
    pub fn from_url(url: &Url) -> Result<Self, Error> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::Reachability(format!("{url} has no host")))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::Reachability(format!("{url} has no known port")))?;
        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }
}

/// Source of reachability flags for a target.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync + 'static {
    async fn probe(&self, target: &ReachabilityTarget) -> Result<ReachabilityFlags, Error>;
}

/// Resolves the host and attempts a TCP connection to each address.
///
/// Resolution or connection failure yields empty flags (unreachable), not
/// an error.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    pub connect_timeout: Duration,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

#[async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn probe(&self, target: &ReachabilityTarget) -> Result<ReachabilityFlags, Error> {
        let addrs = match tokio::net::lookup_host((target.host.as_str(), target.port)).await {
            Ok(addrs) => addrs.collect::<Vec<_>>(),
            Err(e) => {
                debug!(host = %target.host, error = %e, "host did not resolve");
                return Ok(ReachabilityFlags::default());
            }
        };

        for addr in addrs {
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(_stream)) => {
                    let mut bits = ReachabilityFlags::REACHABLE;
                    if addr.ip().is_loopback() {
                        bits |= ReachabilityFlags::IS_LOCAL_ADDRESS | ReachabilityFlags::IS_DIRECT;
                    }
                    trace!(%addr, "connect probe succeeded");
                    return Ok(ReachabilityFlags::from_bits(bits));
                }
                Ok(Err(e)) => trace!(%addr, error = %e, "connect probe failed"),
                Err(_) => trace!(%addr, "connect probe timed out"),
            }
        }
        Ok(ReachabilityFlags::default())
    }
}

// ── Monitor ──────────────────────────────────────────────────────────

/// Cancellation handle returned by [`ReachabilityMonitor::enable`].
pub struct ReachabilityHandle {
    cancel: CancellationToken,
    events: broadcast::Sender<ReachabilityEvent>,
}

impl ReachabilityHandle {
    /// A new receiver for flag-change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ReachabilityEvent> {
        self.events.subscribe()
    }

    /// Stop monitoring. Equivalent to [`ReachabilityMonitor::disable`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Shared reachability state plus an optional background monitor.
pub struct ReachabilityMonitor {
    probe: Arc<dyn ReachabilityProbe>,
    interval: Duration,
    state: Arc<watch::Sender<ReachabilityState>>,
    events: broadcast::Sender<ReachabilityEvent>,
    active: Mutex<Option<CancellationToken>>,
}

impl Default for ReachabilityMonitor {
    fn default() -> Self {
        Self::new(Arc::new(TcpProbe::default()), DEFAULT_POLL_INTERVAL)
    }
}

impl ReachabilityMonitor {
    pub fn new(probe: Arc<dyn ReachabilityProbe>, interval: Duration) -> Self {
        let (state, _) = watch::channel(ReachabilityState::Unknown);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            probe,
            interval,
            state: Arc::new(state),
            events,
            active: Mutex::new(None),
        }
    }

    /// Last known state.
    pub fn state(&self) -> ReachabilityState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ReachabilityState> {
        self.state.subscribe()
    }

    /// A new receiver for flag-change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ReachabilityEvent> {
        self.events.subscribe()
    }

    pub fn is_monitoring(&self) -> bool {
        self.active
            .lock()
            .expect("reachability lock poisoned")
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Probe once and record the resulting state.
    pub async fn check(&self, target: &ReachabilityTarget) -> Result<ReachabilityFlags, Error> {
        match self.probe.probe(target).await {
            Ok(flags) => {
                self.state.send_replace(ReachabilityState::from_flags(flags));
                Ok(flags)
            }
            Err(e) => {
                self.state.send_replace(ReachabilityState::Unknown);
                Err(e)
            }
        }
    }

    /// Start monitoring `target`. Must be called from within a tokio runtime.
    ///
    /// If monitoring is already running, the existing task keeps running and
    /// the returned handle controls it.
    pub fn enable(&self, target: ReachabilityTarget) -> ReachabilityHandle {
        let mut active = self.active.lock().expect("reachability lock poisoned");
        if let Some(token) = active.as_ref().filter(|t| !t.is_cancelled()) {
            return ReachabilityHandle {
                cancel: token.clone(),
                events: self.events.clone(),
            };
        }

        let cancel = CancellationToken::new();
        debug!(host = %target.host, port = target.port, "reachability monitoring enabled");
        tokio::spawn(monitor_loop(
            Arc::clone(&self.probe),
            target,
            self.interval,
            Arc::clone(&self.state),
            self.events.clone(),
            cancel.clone(),
        ));
        *active = Some(cancel.clone());

        ReachabilityHandle {
            cancel,
            events: self.events.clone(),
        }
    }

    /// Stop monitoring. A no-op when monitoring is off.
    pub fn disable(&self) {
        if let Some(token) = self
            .active
            .lock()
            .expect("reachability lock poisoned")
            .take()
        {
            token.cancel();
            debug!("reachability monitoring disabled");
        }
    }
}

impl Drop for ReachabilityMonitor {
    fn drop(&mut self) {
        self.disable();
    }
}

async fn monitor_loop(
    probe: Arc<dyn ReachabilityProbe>,
    target: ReachabilityTarget,
    interval: Duration,
    state: Arc<watch::Sender<ReachabilityState>>,
    events: broadcast::Sender<ReachabilityEvent>,
    cancel: CancellationToken,
) {
    let mut last: Option<ReachabilityFlags> = None;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = probe.probe(&target) => match result {
                Ok(flags) if last != Some(flags) => {
                    last = Some(flags);
                    let next = ReachabilityState::from_flags(flags);
                    state.send_replace(next);
                    debug!(%flags, state = %next, "reachability changed");
                    // No subscribers is fine; the state is still recorded.
                    let _ = events.send(ReachabilityEvent { flags });
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "reachability probe failed");
                    last = None;
                    state.send_replace(ReachabilityState::Unknown);
                }
            },
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Replays a fixed sequence of bitmasks, repeating the last one.
    struct ScriptedProbe {
        script: Vec<u32>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReachabilityProbe for ScriptedProbe {
        async fn probe(&self, _: &ReachabilityTarget) -> Result<ReachabilityFlags, Error> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let bits = self.script[call.min(self.script.len() - 1)];
            Ok(ReachabilityFlags::from_bits(bits))
        }
    }

    fn target() -> ReachabilityTarget {
        ReachabilityTarget {
            host: "journal.example".into(),
            port: 443,
        }
    }

    #[test]
    fn zero_bitmask_is_unreachable() {
        assert_eq!(
            ReachabilityState::from_flags(ReachabilityFlags::from_bits(0)),
            ReachabilityState::Unreachable
        );
    }

    #[test]
    fn reachable_bit_is_reachable() {
        let flags = ReachabilityFlags::from_bits(ReachabilityFlags::REACHABLE);
        assert_eq!(
            ReachabilityState::from_flags(flags),
            ReachabilityState::Reachable
        );
        let direct = ReachabilityFlags::from_bits(
            ReachabilityFlags::REACHABLE | ReachabilityFlags::IS_DIRECT,
        );
        assert_eq!(
            ReachabilityState::from_flags(direct),
            ReachabilityState::Reachable
        );
    }

    #[test]
    fn connection_required_is_indirect() {
        let flags = ReachabilityFlags::from_bits(
            ReachabilityFlags::REACHABLE | ReachabilityFlags::CONNECTION_REQUIRED,
        );
        assert_eq!(
            ReachabilityState::from_flags(flags),
            ReachabilityState::ReachableIndirect
        );
        let without_reachable =
            ReachabilityFlags::from_bits(ReachabilityFlags::CONNECTION_REQUIRED);
        assert_eq!(
            ReachabilityState::from_flags(without_reachable),
            ReachabilityState::Unreachable
        );
    }

    #[test]
    fn target_uses_scheme_default_port() {
        let url = Url::parse("https://www.journal.example/").unwrap();
        let target = ReachabilityTarget::from_url(&url).unwrap();
        assert_eq!(target.host, "www.journal.example");
        assert_eq!(target.port, 443);
    }

    #[tokio::test]
    async fn check_works_without_monitoring() {
        let monitor = ReachabilityMonitor::new(
            Arc::new(ScriptedProbe {
                script: vec![ReachabilityFlags::REACHABLE],
                calls: AtomicUsize::new(0),
            }),
            Duration::from_secs(60),
        );
        assert_eq!(monitor.state(), ReachabilityState::Unknown);
        assert!(!monitor.is_monitoring());

        let flags = monitor.check(&target()).await.unwrap();
        assert!(flags.contains(ReachabilityFlags::REACHABLE));
        assert_eq!(monitor.state(), ReachabilityState::Reachable);
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_emits_events_only_on_change() {
        let monitor = ReachabilityMonitor::new(
            Arc::new(ScriptedProbe {
                script: vec![
                    0,
                    0,
                    ReachabilityFlags::REACHABLE,
                    ReachabilityFlags::REACHABLE,
                ],
                calls: AtomicUsize::new(0),
            }),
            Duration::from_secs(1),
        );
        let mut events = monitor.subscribe();
        let handle = monitor.enable(target());
        assert!(monitor.is_monitoring());

        let first = events.recv().await.unwrap();
        assert_eq!(first.flags.bits(), 0);
        assert_eq!(monitor.state(), ReachabilityState::Unreachable);

        let second = events.recv().await.unwrap();
        assert_eq!(second.flags.bits(), ReachabilityFlags::REACHABLE);
        assert_eq!(monitor.state(), ReachabilityState::Reachable);

        handle.cancel();
        assert!(!monitor.is_monitoring());
    }

    #[tokio::test]
    async fn disable_cancels_the_handle() {
        let monitor = ReachabilityMonitor::new(
            Arc::new(ScriptedProbe {
                script: vec![ReachabilityFlags::REACHABLE],
                calls: AtomicUsize::new(0),
            }),
            Duration::from_secs(60),
        );
        let handle = monitor.enable(target());
        monitor.disable();
        assert!(handle.is_cancelled());
        assert!(!monitor.is_monitoring());
    }
}
