//! The long-lived relay session.
//!
//! A [`Session`] is a cheap clonable handle. It owns at most one live
//! [`Link`], the reconnect schedule, and the observer channels of the
//! [`Router`]. Every lifecycle transition happens under one async lock,
//! so `connect`, `disconnect`, link failures and the reconnect timer can
//! never interleave.
//!
//! ```text
//!  setup/connect ──► dial ──ok──► Connected ──failure──► Disconnected
//!                     │                                       │
//!                     └──fail──► Disconnected ──► Reconnecting(3 s) ──► dial
//! ```

pub mod heartbeat;
pub mod router;

use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::OrangeError;
use crate::network::address;
use crate::network::link::{Link, LinkEvents, LinkFailure, Outbound, try_enqueue};
use crate::protocol::envelope::{Device, WorkflowItem};
use crate::protocol::outbound::{self, ClientIdentity};
use crate::state::{ConnectionState, StateChange};

pub use router::{Router, StreamSignal};

// ── SessionConfig ────────────────────────────────────────────────

/// Timings and queue sizes for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub probe_timeout: Duration,
    pub provision_settle: Duration,
    pub outbound_queue: usize,
    pub binary_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(3),
            reconnect_delay: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(2),
            provision_settle: Duration::from_millis(500),
            outbound_queue: 256,
            binary_capacity: 256,
        }
    }
}

/// Where the session is pointed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub url: Url,
    pub server_name: String,
}

// ── Session ──────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    identity: ClientIdentity,
    slot: Mutex<LinkSlot>,
    state: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<StateChange>,
    info: watch::Sender<Option<SessionInfo>>,
    /// Writer of the live link, for sends that must not wait on `slot`.
    outbound: StdMutex<Option<mpsc::Sender<Outbound>>>,
    router: Router,
}

/// Everything guarded by the transition lock.
#[derive(Default)]
struct LinkSlot {
    /// Last target; `None` after a user disconnect.
    target: Option<Url>,
    link: Option<Link>,
    reconnect: Option<ReconnectTask>,
    /// Bumped on every dial and teardown.
    generation: u64,
}

struct ReconnectTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Session {
    pub fn new(identity: ClientIdentity, config: SessionConfig) -> Self {
        let router = Router::new(config.binary_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                identity,
                slot: Mutex::new(LinkSlot::default()),
                state: watch::channel(ConnectionState::Idle).0,
                transitions: broadcast::channel(64).0,
                info: watch::channel(None).0,
                outbound: StdMutex::new(None),
                router,
            }),
        }
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.inner.identity
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Point the session at a user-supplied address and connect.
    ///
    /// The address gets a `ws://` scheme if it has none and carries the
    /// identity token as its `token` query parameter. Application state is
    /// cleared first. A failed dial has already scheduled a reconnect when
    /// the error is returned.
    pub async fn setup(&self, address: &str) -> Result<(), OrangeError> {
        let url = address::normalize(address, &self.inner.identity.token)?;
        info!(%url, "session setup");
        self.inner.router.clear();
        self.connect(url).await
    }

    /// Dial `url`, replacing any live link and cancelling a pending
    /// reconnect. Registration is sent as soon as the socket opens. A new
    /// target clears application state and replaces the session info.
    pub async fn connect(&self, url: Url) -> Result<(), OrangeError> {
        let mut slot = self.inner.slot.lock().await;
        self.inner.cancel_reconnect(&mut slot);
        if let Some(link) = slot.link.take() {
            self.inner.drop_link(link).await;
        }
        if slot.target.as_ref() != Some(&url) {
            self.inner.router.clear();
            self.inner.info.send_replace(Some(SessionInfo {
                server_name: address::server_name(&url),
                url: url.clone(),
            }));
        }
        slot.target = Some(url);
        Inner::dial(&self.inner, &mut slot).await
    }

    /// User-initiated disconnect: forget the target, cancel any pending
    /// reconnect, close the link and clear application state.
    pub async fn disconnect(&self) {
        self.inner.disconnect().await;
    }

    /// [`disconnect`](Self::disconnect), then wait for the reconnect task
    /// too. Call once at process exit.
    pub async fn shutdown(&self) {
        if let Some(task) = self.inner.disconnect().await {
            let _ = task.handle.await;
        }
        info!("session shut down");
    }

    // ── Sends ────────────────────────────────────────────────────

    /// Queue a JSON envelope on the live link. Dropped with a warning when
    /// there is no link or its queue is full.
    pub fn send_json(&self, envelope: &Value) -> bool {
        match serde_json::to_string(envelope) {
            Ok(text) => self.inner.enqueue(Outbound::Text(text)),
            Err(e) => {
                warn!("envelope not serializable: {e}");
                false
            }
        }
    }

    /// Queue a binary frame on the live link.
    pub fn send_binary(&self, packet: Bytes) -> bool {
        self.inner.enqueue(Outbound::Binary(packet))
    }

    // ── Observers ────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Every transition, in order. Slow receivers lag.
    pub fn transitions(&self) -> broadcast::Receiver<StateChange> {
        self.inner.transitions.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.borrow().is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.inner.state.borrow().is_connecting()
    }

    pub fn is_soft_offline(&self) -> bool {
        self.inner.router.is_soft_offline()
    }

    pub fn info(&self) -> Option<SessionInfo> {
        self.inner.info.borrow().clone()
    }

    pub fn watch_info(&self) -> watch::Receiver<Option<SessionInfo>> {
        self.inner.info.subscribe()
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    pub fn soft_offline(&self) -> watch::Receiver<bool> {
        self.inner.router.soft_offline()
    }

    pub fn devices(&self) -> watch::Receiver<Vec<Device>> {
        self.inner.router.devices()
    }

    pub fn workflows(&self) -> watch::Receiver<Vec<WorkflowItem>> {
        self.inner.router.workflows()
    }

    pub fn password(&self) -> watch::Receiver<Option<String>> {
        self.inner.router.password()
    }

    pub fn stream_signals(&self) -> broadcast::Receiver<StreamSignal> {
        self.inner.router.stream_signals()
    }

    pub fn binary_frames(&self) -> broadcast::Receiver<Bytes> {
        self.inner.router.binary_frames()
    }

    pub fn current_viewer(&self) -> Option<String> {
        self.inner.router.current_viewer()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("sn", &self.inner.identity.sn)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

// ── Inner ────────────────────────────────────────────────────────

impl Inner {
    /// Apply a validated transition and publish it.
    fn transition(
        &self,
        apply: impl FnOnce(&mut ConnectionState) -> Result<(), OrangeError>,
    ) -> Result<(), OrangeError> {
        let from = self.state.borrow().clone();
        let mut to = from.clone();
        apply(&mut to)?;
        info!(%from, %to, "connection state");
        self.state.send_replace(to.clone());
        let _ = self.transitions.send(StateChange { from, to });
        Ok(())
    }

    fn enqueue(&self, item: Outbound) -> bool {
        let sender = match self.outbound.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match sender {
            Some(sender) => try_enqueue(&sender, item),
            None => {
                warn!("not connected, dropping outbound frame");
                false
            }
        }
    }

    fn set_outbound(&self, sender: Option<mpsc::Sender<Outbound>>) {
        match self.outbound.lock() {
            Ok(mut guard) => *guard = sender,
            Err(poisoned) => *poisoned.into_inner() = sender,
        }
    }

    /// Open a link to the slot's target. Must hold the slot lock.
    async fn dial(this: &Arc<Self>, slot: &mut LinkSlot) -> Result<(), OrangeError> {
        let Some(url) = slot.target.clone() else {
            return Err(OrangeError::NotConnected);
        };
        let register = serde_json::to_string(&outbound::register(&this.identity))?;
        let heartbeat_envelope = serde_json::to_string(&outbound::heartbeat(&this.identity))?;
        this.transition(ConnectionState::begin_connect)?;
        slot.generation += 1;
        let generation = slot.generation;

        let events: Arc<dyn LinkEvents> = Arc::new(SessionEvents(Arc::downgrade(this)));
        let timeout = this.config.connect_timeout;
        let opened = tokio::time::timeout(
            timeout,
            Link::open(&url, generation, this.config.outbound_queue, Arc::clone(&events)),
        )
        .await
        .unwrap_or(Err(OrangeError::Timeout(timeout)));

        let mut link = match opened {
            Ok(link) => link,
            Err(e) => {
                warn!(%url, "dial failed: {e}");
                this.transition(ConnectionState::lose_connection)?;
                Inner::schedule_reconnect(this, slot);
                return Err(e);
            }
        };

        this.transition(ConnectionState::complete_connect)?;
        let sender = link.sender();
        this.set_outbound(Some(sender.clone()));

        let interval = this.config.heartbeat_interval;
        let heartbeat_sender = sender.clone();
        link.attach("heartbeat", move |token| {
            heartbeat::run(token, interval, heartbeat_sender, heartbeat_envelope, generation, events)
        });

        try_enqueue(&sender, Outbound::Text(register));
        info!(%url, generation, "connected, registration sent");

        slot.link = Some(link);
        Ok(())
    }

    /// Close `link` and leave `Connected`.
    async fn drop_link(&self, link: Link) {
        self.set_outbound(None);
        link.shutdown().await;
        if let Err(e) = self.transition(ConnectionState::lose_connection) {
            debug!("teardown transition skipped: {e}");
        }
    }

    /// Cancel a pending reconnect and leave `Reconnecting`.
    fn cancel_reconnect(&self, slot: &mut LinkSlot) -> Option<ReconnectTask> {
        let task = slot.reconnect.take()?;
        task.token.cancel();
        if self.state.borrow().is_reconnecting() {
            let _ = self.transition(ConnectionState::lose_connection);
        }
        debug!("pending reconnect cancelled");
        Some(task)
    }

    async fn disconnect(&self) -> Option<ReconnectTask> {
        let mut slot = self.slot.lock().await;
        slot.target = None;
        slot.generation += 1;
        let pending = self.cancel_reconnect(&mut slot);
        if let Some(link) = slot.link.take() {
            self.drop_link(link).await;
        }
        self.router.clear();
        info!("disconnected by user");
        pending
    }

    /// At most one pending reconnect, always to the remembered target.
    fn schedule_reconnect(this: &Arc<Self>, slot: &mut LinkSlot) {
        if slot.reconnect.is_some() {
            debug!("reconnect already scheduled");
            return;
        }
        if slot.target.is_none() {
            return;
        }
        let delay = this.config.reconnect_delay;
        if let Err(e) = this.transition(|s| s.schedule_reconnect(delay)) {
            warn!("reconnect not scheduled: {e}");
            return;
        }

        let token = CancellationToken::new();
        let weak = Arc::downgrade(this);
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if let Some(inner) = weak.upgrade() {
                Inner::reconnect_now(&inner, cancelled).await;
            }
        });
        info!(?delay, "reconnect scheduled");
        slot.reconnect = Some(ReconnectTask { token, handle });
    }

    async fn reconnect_now(this: &Arc<Self>, token: CancellationToken) {
        let mut slot = this.slot.lock().await;
        if token.is_cancelled() {
            return;
        }
        // This task is the pending reconnect; clear it without cancelling.
        slot.reconnect = None;
        if slot.target.is_none() {
            return;
        }
        info!("reconnecting");
        if let Err(e) = Inner::dial(this, &mut slot).await {
            debug!("reconnect attempt failed: {e}");
        }
    }

    /// Tear down the link of `generation` and schedule a reconnect.
    /// Reports for links that were already replaced are ignored.
    async fn handle_failure(this: &Arc<Self>, generation: u64, failure: LinkFailure) {
        let mut slot = this.slot.lock().await;
        let current = slot.link.as_ref().map(Link::generation);
        if current != Some(generation) {
            debug!(generation, "stale link failure ignored: {failure}");
            return;
        }
        warn!(generation, "link lost: {failure}");
        if let Some(link) = slot.link.take() {
            this.drop_link(link).await;
        }
        Inner::schedule_reconnect(this, &mut slot);
    }
}

// ── SessionEvents ────────────────────────────────────────────────

/// Bridges link callbacks into the session without keeping it alive.
struct SessionEvents(Weak<Inner>);

impl LinkEvents for SessionEvents {
    fn on_text(&self, text: &str) {
        if let Some(inner) = self.0.upgrade() {
            inner.router.dispatch_text(text);
        }
    }

    fn on_binary(&self, data: Bytes) {
        if let Some(inner) = self.0.upgrade() {
            inner.router.dispatch_binary(data);
        }
    }

    fn on_failure(&self, generation: u64, failure: LinkFailure) {
        let Some(inner) = self.0.upgrade() else { return };
        // Runs apart from the reporting task, which teardown awaits.
        tokio::spawn(async move {
            Inner::handle_failure(&inner, generation, failure).await;
        });
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            heartbeat_interval: Duration::from_millis(50),
            reconnect_delay: Duration::from_millis(50),
            connect_timeout: Duration::from_millis(500),
            ..SessionConfig::default()
        }
    }

    /// An address nothing listens on.
    async fn dead_address() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("ws://{addr}/ws")
    }

    #[test]
    fn default_config_timings() {
        let config = SessionConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(3));
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.probe_timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn sends_without_link_are_dropped() {
        let session = Session::new(ClientIdentity::new("SN", "t"), fast_config());
        assert!(!session.send_json(&json!({"action": "get_device_list"})));
        assert!(!session.send_binary(Bytes::from_static(b"x")));
        assert_eq!(session.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn failed_dial_schedules_one_reconnect() {
        let session = Session::new(ClientIdentity::new("SN", "t"), fast_config());
        let mut transitions = session.transitions();

        assert!(session.setup(&dead_address().await).await.is_err());
        assert!(session.state().is_reconnecting());
        assert_eq!(session.info().unwrap().server_name, "127.0.0.1");

        let seen: Vec<ConnectionState> = (0..3)
            .map(|_| transitions.try_recv().unwrap().to)
            .collect();
        assert!(matches!(
            seen.as_slice(),
            [
                ConnectionState::Connecting,
                ConnectionState::Disconnected,
                ConnectionState::Reconnecting { .. }
            ]
        ));

        session.shutdown().await;
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_stops_retrying() {
        let session = Session::new(ClientIdentity::new("SN", "t"), fast_config());
        let _ = session.setup(&dead_address().await).await;
        session.disconnect().await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.info().is_some());
    }

    #[tokio::test]
    async fn connect_to_new_target_replaces_info() {
        let session = Session::new(ClientIdentity::new("SN", "t"), fast_config());
        let dead = dead_address().await;
        let _ = session.setup(&dead).await;
        assert_eq!(session.info().unwrap().server_name, "127.0.0.1");

        let other = dead.replace("127.0.0.1", "localhost").replace("/ws", "/alt");
        let other = Url::parse(&other).unwrap();
        let _ = session.connect(other.clone()).await;
        let info = session.info().unwrap();
        assert_eq!(info.url, other);
        assert_eq!(info.server_name, "localhost");

        session.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_failure_reports_reconnect_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        let server = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                    counter.fetch_add(1, Ordering::SeqCst);
                    open.push(ws);
                }
            }
        });

        let config = SessionConfig {
            heartbeat_interval: Duration::from_secs(60),
            ..fast_config()
        };
        let session = Session::new(ClientIdentity::new("SN", "t"), config);
        session.setup(&format!("ws://{addr}/ws")).await.unwrap();
        let mut transitions = session.transitions();

        // The reader and the heartbeat both give up on the same link.
        let generation = session.inner.slot.lock().await.link.as_ref().unwrap().generation();
        let events = SessionEvents(Arc::downgrade(&session.inner));
        events.on_failure(generation, LinkFailure::Read("connection reset".into()));
        events.on_failure(generation, LinkFailure::Heartbeat("ping not sent".into()));

        let mut seen = Vec::new();
        loop {
            let change = tokio::time::timeout(Duration::from_secs(5), transitions.recv())
                .await
                .expect("no reconnect")
                .unwrap();
            let connected = change.to.is_connected();
            seen.push(change.to);
            if connected {
                break;
            }
        }
        assert!(matches!(
            seen.as_slice(),
            [
                ConnectionState::Disconnected,
                ConnectionState::Reconnecting { .. },
                ConnectionState::Connecting,
                ConnectionState::Connected { .. }
            ]
        ));

        // Several reconnect delays later nothing else has happened.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(matches!(
            transitions.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
        assert_eq!(accepted.load(Ordering::SeqCst), 2);

        session.shutdown().await;
        server.abort();
    }

    #[tokio::test]
    async fn invalid_address_leaves_state_alone() {
        let session = Session::new(ClientIdentity::new("SN", "t"), fast_config());
        assert!(matches!(
            session.setup("ws://").await,
            Err(OrangeError::InvalidAddress(_))
        ));
        assert_eq!(session.state(), ConnectionState::Idle);
    }
}
