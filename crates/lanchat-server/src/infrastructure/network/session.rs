//! `ServerSession`: the listening side of the chat.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//! start_listening()
//!   ├─ find endpoint (config override or LAN discovery)
//!   ├─ bind acceptor (SO_REUSEADDR)      ──► ListeningOn(endpoint)
//!   └─ accept loop ─┐
//!                   ├─ reserve slot ── none ──► close acceptor, CapacityReached
//!                   ├─ accept()
//!                   ├─ install Connection (Open) ──► Connected { slot }
//!                   ├─ auto_recv: start that slot's receive loop
//!                   └─ pool full? ── yes ──► close acceptor, CapacityReached
//!
//! receive loop (one per slot)
//!   ├─ MessageReceived { from: slot }
//!   ├─ group chat on: relay the same bytes to every *other* open slot
//!   └─ peer EOF ──► slot closed (reusable), PeerDisconnected { slot }
//!
//! close_connection()  stop status, close every slot, close acceptor, Closed
//! finish()            close_connection() + stop and join the worker pool
//! ```
//!
//! Once the pool fills, the acceptor stays closed even after a slot frees
//! up; the next [`ServerSession::start_listening`] reopens it on the same
//! endpoint.
//!
//! # Threading
//!
//! Every public method is synchronous and may be called from any thread that
//! is not one of the session's own workers (a UI thread, `main`, a test).
//! The methods spawn their asynchronous work onto the session's
//! [`EventLoopPool`] and return immediately; results arrive through the
//! [`StatusSink`].

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, MutexGuard};
use std::time::Duration;

use lanchat_core::{
    Connection, Endpoint, EngineConfig, EventLoopPool, IoContext, ReceiveEnd, ReceivedMessage,
    SessionError, SessionStatus, SlotIndex, StatusCell, StatusEvent, StatusSink,
};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::discovery::{EndpointDiscovery, InterfaceSource, NetdevInterfaces, Platform};
use super::pool::SlotPool;
use crate::infrastructure::storage::config::AppConfig;

/// How long a synchronous caller waits for the accept loop to release the
/// listening socket after asking it to close.
const ACCEPTOR_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

const LISTEN_BACKLOG: u32 = 128;

/// First pause after a failed `accept()`; doubles per consecutive failure.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);
const ACCEPT_RETRY_MAX_DELAY: Duration = Duration::from_secs(1);

/// A run of consecutive `accept()` failures (e.g. out of file descriptors).
///
/// Only the first failure of a run is reported through the sink, and the
/// accept loop pauses between attempts instead of spinning.
#[derive(Debug, Default)]
struct AcceptFailures {
    consecutive: u32,
}

impl AcceptFailures {
    /// Records a failure; returns `true` if it starts a new run.
    fn failed(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive == 1
    }

    fn succeeded(&mut self) {
        if self.consecutive > 1 {
            info!(failures = self.consecutive, "accept recovered");
        }
        self.consecutive = 0;
    }

    /// Pause before the next attempt.
    fn delay(&self) -> Duration {
        let doublings = self.consecutive.saturating_sub(1).min(5);
        (ACCEPT_RETRY_DELAY * 2u32.pow(doublings)).min(ACCEPT_RETRY_MAX_DELAY)
    }
}

/// Runtime options of a [`ServerSession`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServerOptions {
    pub port: u16,
    pub max_clients: usize,
    pub group_chat: bool,
    pub auto_recv: bool,
    /// Bind this address instead of discovering a LAN interface.
    pub bind_address: Option<IpAddr>,
    pub engine: EngineConfig,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl ServerOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            port: config.server.port,
            max_clients: config.server.max_clients,
            group_chat: config.server.group_chat,
            auto_recv: config.server.auto_recv,
            bind_address: config.server.bind_address,
            engine: config.engine.clone(),
        }
    }
}

/// The open acceptor owned by a running accept loop.
struct Acceptor {
    open: Arc<AtomicBool>,
    close_tx: watch::Sender<bool>,
    released: std_mpsc::Receiver<()>,
}

impl Acceptor {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Asks the accept loop to drop the listener and, when `wait` is set,
    /// blocks until it has.
    fn close(self, wait: bool) {
        self.close_tx.send_replace(true);
        if wait && self.released.recv_timeout(ACCEPTOR_CLOSE_TIMEOUT).is_err() {
            warn!("accept loop did not release the listener in time");
        }
    }
}

/// State shared between the session handle and its worker tasks.
struct Shared {
    max_clients: usize,
    auto_recv: bool,
    recv_buffer_size: usize,
    sink: Arc<dyn StatusSink>,
    status: Arc<StatusCell>,
    slots: Mutex<SlotPool<Arc<Connection>>>,
    group_chat: AtomicBool,
    has_ever_listened: AtomicBool,
    endpoint: Mutex<Option<Endpoint>>,
    acceptor: Mutex<Option<Acceptor>>,
}

impl Shared {
    fn slots(&self) -> MutexGuard<'_, SlotPool<Arc<Connection>>> {
        self.slots.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn endpoint(&self) -> MutexGuard<'_, Option<Endpoint>> {
        self.endpoint.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn acceptor(&self) -> MutexGuard<'_, Option<Acceptor>> {
        self.acceptor.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Reports `err` through the sink and hands back a copy for the caller.
    fn fail(&self, err: SessionError) -> SessionError {
        let copy = err.duplicate();
        self.sink.status(StatusEvent::Failed(err));
        copy
    }

    /// Delivers one completed read and relays it when group chat is on.
    fn on_received(&self, from: Option<SlotIndex>, bytes: Vec<u8>) {
        if self.group_chat.load(Ordering::Acquire) {
            let payload: Arc<[u8]> = Arc::from(bytes.as_slice());
            let others = self.slots().open_connections();
            for (slot, conn) in others {
                if Some(slot) != from {
                    conn.send(Arc::clone(&payload));
                }
            }
        }
        self.sink.message_received(ReceivedMessage { from, bytes });
    }
}

/// The server side of a chat session.
pub struct ServerSession {
    shared: Arc<Shared>,
    pool: EventLoopPool,
    discovery: EndpointDiscovery<Box<dyn InterfaceSource>>,
    bind_address: Option<IpAddr>,
    port: u16,
}

impl ServerSession {
    /// Creates an idle session that discovers its address from the host's
    /// network adapters.
    pub fn new(options: ServerOptions, sink: Arc<dyn StatusSink>) -> Self {
        let discovery = EndpointDiscovery::with_source(
            Box::new(NetdevInterfaces) as Box<dyn InterfaceSource>,
            Platform::current(),
        );
        Self::with_discovery(options, sink, discovery)
    }

    /// Creates an idle session with a custom interface source.
    pub fn with_discovery(
        options: ServerOptions,
        sink: Arc<dyn StatusSink>,
        discovery: EndpointDiscovery<Box<dyn InterfaceSource>>,
    ) -> Self {
        let pool = EventLoopPool::new(
            options.engine.effective_worker_threads(),
            "lanchat-server-io",
            Arc::clone(&sink),
        );
        let shared = Arc::new(Shared {
            max_clients: options.max_clients,
            auto_recv: options.auto_recv,
            recv_buffer_size: options.engine.effective_recv_buffer_size(),
            sink,
            status: Arc::new(StatusCell::new()),
            slots: Mutex::new(SlotPool::new(options.max_clients)),
            group_chat: AtomicBool::new(options.group_chat),
            has_ever_listened: AtomicBool::new(false),
            endpoint: Mutex::new(None),
            acceptor: Mutex::new(None),
        });
        Self {
            shared,
            pool,
            discovery,
            bind_address: options.bind_address,
            port: options.port,
        }
    }

    /// Binds the acceptor and starts accepting clients.
    ///
    /// Returns the endpoint actually bound.  If the acceptor is already open
    /// this is a no-op returning the current endpoint.
    ///
    /// # Errors
    ///
    /// Setup errors (`NoLanInterface`, `UnsupportedPlatform`, `Bind`,
    /// `Runtime`) are reported through the sink *and* returned.  After a bind
    /// failure the endpoint is forgotten so the next call discovers it again.
    pub fn start_listening(&self) -> Result<Endpoint, SessionError> {
        let mut acceptor = self.shared.acceptor();
        if acceptor.as_ref().is_some_and(Acceptor::is_open) {
            if let Some(endpoint) = *self.shared.endpoint() {
                debug!(%endpoint, "already listening");
                return Ok(endpoint);
            }
        }
        if let Some(stale) = acceptor.take() {
            stale.close(!self.pool.is_current_worker());
        }

        let spawner = self.pool.start().map_err(|e| self.shared.fail(e))?;
        let endpoint = self.local_endpoint().map_err(|e| {
            error!("endpoint discovery failed: {e}");
            self.shared.fail(e)
        })?;

        let bound = {
            let _enter = spawner.handle().enter();
            bind_acceptor(endpoint.socket_addr())
        };
        let (bound, listener) = match bound {
            Ok((addr, listener)) => (Endpoint::from(addr), listener),
            Err(source) => {
                *self.shared.endpoint() = None;
                error!(%endpoint, "bind failed: {source}");
                return Err(self.shared.fail(SessionError::Bind {
                    addr: endpoint.socket_addr(),
                    source,
                }));
            }
        };

        *self.shared.endpoint() = Some(bound);
        self.shared.has_ever_listened.store(true, Ordering::Release);
        self.shared.status.activate();

        let (close_tx, close_rx) = watch::channel(false);
        let (released_tx, released) = std_mpsc::channel();
        let open = Arc::new(AtomicBool::new(true));
        *acceptor = Some(Acceptor {
            open: Arc::clone(&open),
            close_tx,
            released,
        });
        drop(acceptor);

        info!(endpoint = %bound, "listening");
        self.shared.sink.listening_on(bound);

        let ctx = IoContext {
            spawner: spawner.clone(),
            sink: Arc::clone(&self.shared.sink),
            status: Arc::clone(&self.shared.status),
            recv_buffer_size: self.shared.recv_buffer_size,
        };
        spawner.spawn(
            "accept",
            accept_loop(Arc::clone(&self.shared), ctx, listener, close_rx, open, released_tx),
        );
        Ok(bound)
    }

    /// The endpoint to bind: the last bound one, the configured override,
    /// or a freshly discovered LAN address.
    fn local_endpoint(&self) -> Result<Endpoint, SessionError> {
        if let Some(endpoint) = *self.shared.endpoint() {
            return Ok(endpoint);
        }
        match self.bind_address {
            Some(address) => Ok(Endpoint::new(address, self.port)),
            None => self.discovery.find_local_endpoint(self.port),
        }
    }

    /// Writes `bytes` to one slot, or to every open slot when `slot` is
    /// `None`.
    ///
    /// Each write is queued independently; a failing peer does not hold up
    /// the others.  A slot that exists but is not open is silently skipped.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidSlot`] if `slot` does not exist (also reported
    /// through the sink).
    pub fn send(&self, bytes: &[u8], slot: Option<SlotIndex>) -> Result<(), SessionError> {
        let targets = {
            let slots = self.shared.slots();
            match slot {
                Some(index) => match slots.get(index) {
                    Some(conn) => vec![Arc::clone(conn)],
                    None => {
                        drop(slots);
                        return Err(self.shared.fail(SessionError::InvalidSlot(index)));
                    }
                },
                None => slots.open_connections().into_iter().map(|(_, c)| c).collect(),
            }
        };

        let payload: Arc<[u8]> = Arc::from(bytes);
        for conn in targets {
            if !conn.send(Arc::clone(&payload)) {
                debug!(slot = ?conn.slot(), "skipping closed slot");
            }
        }
        Ok(())
    }

    /// Starts the receive loop of one slot.  Arming a slot that is already
    /// reading, or that is not open, does nothing.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidSlot`] if `slot` does not exist.
    pub fn recv(&self, slot: SlotIndex) -> Result<(), SessionError> {
        let conn = self.shared.slots().get(slot).cloned();
        let Some(conn) = conn else {
            return Err(self.shared.fail(SessionError::InvalidSlot(slot)));
        };
        if let Some(ctx) = self.io_context() {
            spawn_receive(&self.shared, &ctx, conn);
        }
        Ok(())
    }

    /// Starts the receive loop of every open slot that is not yet reading.
    pub fn start_recv(&self) {
        let Some(ctx) = self.io_context() else {
            return;
        };
        let open = self.shared.slots().open_connections();
        for (_, conn) in open {
            spawn_receive(&self.shared, &ctx, conn);
        }
    }

    fn io_context(&self) -> Option<IoContext> {
        self.pool.spawner().map(|spawner| IoContext {
            spawner,
            sink: Arc::clone(&self.shared.sink),
            status: Arc::clone(&self.shared.status),
            recv_buffer_size: self.shared.recv_buffer_size,
        })
    }

    /// Stops the session: closes every open slot and the acceptor.
    ///
    /// Per-socket shutdown failures are reported and the loop carries on
    /// with the remaining sockets.  `Closed` is emitted only if the session
    /// was active.
    pub fn close_connection(&self) {
        let previous = self.shared.status.stop();

        let all = self.shared.slots().all();
        for (slot, conn) in all {
            match conn.close() {
                Ok(true) => debug!(slot, "slot closed"),
                Ok(false) => {}
                Err(e) => {
                    warn!(slot, "{e}");
                    self.shared.sink.status(StatusEvent::Failed(e));
                }
            }
        }

        let acceptor = self.shared.acceptor().take();
        if let Some(acceptor) = acceptor {
            acceptor.close(!self.pool.is_current_worker());
        }

        if previous == SessionStatus::Active {
            info!("server closed");
            self.shared.sink.status(StatusEvent::Closed);
        }
    }

    /// Full teardown: [`close_connection`](Self::close_connection), then
    /// stop the worker pool and join its threads.  Calling it again does
    /// nothing; a later [`start_listening`](Self::start_listening) starts
    /// over.
    pub fn finish(&self) {
        self.close_connection();
        self.pool.stop();
    }

    pub fn set_group_chat(&self, enabled: bool) {
        info!(enabled, "group chat relay");
        self.shared.group_chat.store(enabled, Ordering::Release);
    }

    pub fn group_chat(&self) -> bool {
        self.shared.group_chat.load(Ordering::Acquire)
    }

    /// Number of slots whose connection is open.
    pub fn client_count(&self) -> usize {
        self.shared.slots().open_count()
    }

    /// Number of slots ever allocated (never exceeds `max_clients`).
    pub fn slot_count(&self) -> usize {
        self.shared.slots().len()
    }

    pub fn max_clients(&self) -> usize {
        self.shared.max_clients
    }

    /// `true` once any `start_listening` has succeeded.
    pub fn has_ever_listened(&self) -> bool {
        self.shared.has_ever_listened.load(Ordering::Acquire)
    }

    /// `true` while the acceptor is open.
    pub fn is_accepting(&self) -> bool {
        self.shared.acceptor().as_ref().is_some_and(Acceptor::is_open)
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.status.get()
    }

    /// The last endpoint successfully bound.
    pub fn endpoint(&self) -> Option<Endpoint> {
        *self.shared.endpoint()
    }
}

impl Drop for ServerSession {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Binds and listens; returns the address actually bound (port 0 resolved).
fn bind_acceptor(addr: SocketAddr) -> std::io::Result<(SocketAddr, TcpListener)> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(LISTEN_BACKLOG)?;
    Ok((listener.local_addr()?, listener))
}

async fn accept_loop(
    shared: Arc<Shared>,
    ctx: IoContext,
    listener: TcpListener,
    mut close_rx: watch::Receiver<bool>,
    open: Arc<AtomicBool>,
    released: std_mpsc::Sender<()>,
) {
    let mut keep_alive = ctx.spawner.keep_alive();
    let mut listener = Some(listener);
    let mut failures = AcceptFailures::default();

    while let Some(acceptor) = listener.as_ref() {
        let reserved = shared.slots().reserve();
        let Some(slot) = reserved else {
            listener = None;
            open.store(false, Ordering::Release);
            warn!("no more clients can connect");
            shared.sink.status(StatusEvent::CapacityReached);
            break;
        };

        let accepted = tokio::select! {
            r = acceptor.accept() => r,
            _ = close_rx.changed() => break,
            _ = keep_alive.released() => break,
        };

        let (stream, peer) = match accepted {
            Ok(_) if !shared.status.is_active() => break,
            Ok(pair) => {
                failures.succeeded();
                pair
            }
            Err(e) => {
                if failures.failed() && shared.status.is_active() {
                    warn!("accept failed: {e}");
                    shared.sink.status(StatusEvent::Failed(SessionError::Accept(e)));
                } else {
                    debug!("accept still failing: {e}");
                }
                tokio::select! {
                    _ = tokio::time::sleep(failures.delay()) => continue,
                    _ = close_rx.changed() => break,
                    _ = keep_alive.released() => break,
                }
            }
        };

        let conn = match Connection::establish(stream, Some(slot), &ctx) {
            Ok(conn) => conn,
            Err(e) => {
                warn!(%peer, "could not set up accepted socket: {e}");
                shared.sink.status(StatusEvent::Failed(SessionError::Accept(e)));
                continue;
            }
        };

        let full = {
            let mut slots = shared.slots();
            slots.install(slot, Arc::clone(&conn));
            !slots.has_free_capacity()
        };
        if full {
            // Refuse further connects before anyone learns the pool is full.
            listener = None;
            open.store(false, Ordering::Release);
        }

        info!(%peer, slot, "client connected");
        shared.sink.status(StatusEvent::Connected {
            peer,
            slot: Some(slot),
        });
        if shared.auto_recv {
            spawn_receive(&shared, &ctx, conn);
        }
        if full {
            info!("pool full; acceptor closed");
            shared.sink.status(StatusEvent::CapacityReached);
        }
    }

    drop(listener);
    open.store(false, Ordering::Release);
    let _ = released.send(());
    debug!("accept loop finished");
}

fn spawn_receive(shared: &Arc<Shared>, ctx: &IoContext, conn: Arc<Connection>) {
    if !conn.is_open() || conn.is_reading() {
        return;
    }
    let shared = Arc::clone(shared);
    let status = Arc::clone(&ctx.status);
    let keep_alive = ctx.spawner.keep_alive();
    ctx.spawner.spawn("receive", async move {
        let slot = conn.slot();
        let end = conn
            .receive_loop(&status, keep_alive, |bytes| shared.on_received(slot, bytes))
            .await;
        match end {
            ReceiveEnd::PeerClosed => {
                if conn.mark_peer_closed() {
                    info!(slot = ?slot, "client disconnected");
                    shared.sink.status(StatusEvent::PeerDisconnected { slot });
                }
            }
            ReceiveEnd::Failed(source) => {
                warn!(slot = ?slot, "receive failed: {source}");
                shared
                    .sink
                    .status(StatusEvent::Failed(SessionError::Read { slot, source }));
                // Only this slot is affected; it becomes reusable.
                if let Err(e) = conn.close() {
                    shared.sink.status(StatusEvent::Failed(e));
                }
            }
            ReceiveEnd::Stopped | ReceiveEnd::AlreadyReading => {}
        }
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::discovery::{InterfaceInfo, MockInterfaceSource};
    use lanchat_core::notify::mock::RecordingSink;
    use lanchat_core::SessionEvent;

    fn loopback_options() -> ServerOptions {
        ServerOptions {
            port: 0,
            bind_address: Some("127.0.0.1".parse().unwrap()),
            ..ServerOptions::default()
        }
    }

    #[test]
    fn test_accept_failures_report_only_first_of_a_run() {
        // Arrange
        let mut failures = AcceptFailures::default();

        // Act
        let reported: Vec<bool> = (0..4).map(|_| failures.failed()).collect();
        failures.succeeded();
        let after_recovery = failures.failed();

        // Assert
        assert_eq!(reported, vec![true, false, false, false]);
        assert!(after_recovery, "a new run after a success is reported again");
    }

    #[test]
    fn test_accept_retry_delay_grows_and_is_capped() {
        let mut failures = AcceptFailures::default();
        failures.failed();
        assert_eq!(failures.delay(), ACCEPT_RETRY_DELAY);
        failures.failed();
        assert_eq!(failures.delay(), ACCEPT_RETRY_DELAY * 2);
        for _ in 0..20 {
            failures.failed();
        }
        assert_eq!(failures.delay(), ACCEPT_RETRY_MAX_DELAY);
        assert!(failures.delay() > Duration::ZERO);
    }

    #[test]
    fn test_new_session_is_idle() {
        let sink = Arc::new(RecordingSink::new());
        let server = ServerSession::new(loopback_options(), sink);
        assert_eq!(server.status(), SessionStatus::NotStarted);
        assert!(!server.has_ever_listened());
        assert!(!server.is_accepting());
        assert_eq!(server.slot_count(), 0);
        assert_eq!(server.max_clients(), 5);
    }

    #[test]
    fn test_start_listening_reports_bound_port() {
        // Arrange
        let sink = Arc::new(RecordingSink::new());
        let server = ServerSession::new(loopback_options(), sink.clone());

        // Act
        let endpoint = tokio_test::assert_ok!(server.start_listening());

        // Assert
        assert_ne!(endpoint.port(), 0);
        assert_eq!(sink.listening_endpoints(), vec![endpoint]);
        assert_eq!(server.status(), SessionStatus::Active);
        assert!(server.has_ever_listened());
        assert!(server.is_accepting());
        server.finish();
    }

    #[test]
    fn test_discovery_failure_is_reported_and_returned() {
        // Arrange
        let sink = Arc::new(RecordingSink::new());
        let options = ServerOptions { bind_address: None, ..loopback_options() };
        let mut interfaces = MockInterfaceSource::new();
        interfaces.expect_interfaces().times(1).return_const(Vec::<InterfaceInfo>::new());
        let discovery = EndpointDiscovery::with_source(
            Box::new(interfaces) as Box<dyn InterfaceSource>,
            Platform::Linux,
        );
        let server = ServerSession::with_discovery(options, sink.clone(), discovery);

        // Act
        let err = tokio_test::assert_err!(server.start_listening());

        // Assert
        assert!(matches!(err, SessionError::NoLanInterface));
        assert_eq!(
            sink.count(|e| matches!(
                e,
                SessionEvent::Status(StatusEvent::Failed(SessionError::NoLanInterface))
            )),
            1
        );
        assert_eq!(server.status(), SessionStatus::NotStarted);
        assert!(!server.has_ever_listened());
    }

    #[test]
    fn test_bind_failure_forgets_endpoint() {
        // Arrange: occupy a port without SO_REUSEADDR semantics on the holder
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();
        let sink = Arc::new(RecordingSink::new());
        let server = ServerSession::new(ServerOptions { port, ..loopback_options() }, sink.clone());

        // Act
        let err = tokio_test::assert_err!(server.start_listening());

        // Assert
        assert!(matches!(err, SessionError::Bind { .. }));
        assert!(server.endpoint().is_none());
        assert!(sink.listening_endpoints().is_empty());
        server.finish();
    }

    #[test]
    fn test_send_to_unknown_slot_is_invalid() {
        let sink = Arc::new(RecordingSink::new());
        let server = ServerSession::new(loopback_options(), sink.clone());
        server.start_listening().expect("listen");
        let err = tokio_test::assert_err!(server.send(b"hi", Some(3)));
        assert!(matches!(err, SessionError::InvalidSlot(3)));
        assert!(matches!(server.recv(3), Err(SessionError::InvalidSlot(3))));
        server.finish();
    }

    #[test]
    fn test_broadcast_without_clients_is_ok() {
        let sink = Arc::new(RecordingSink::new());
        let server = ServerSession::new(loopback_options(), sink);
        server.start_listening().expect("listen");
        tokio_test::assert_ok!(server.send(b"nobody home", None));
        server.finish();
    }

    #[test]
    fn test_group_chat_toggle() {
        let sink = Arc::new(RecordingSink::new());
        let server = ServerSession::new(loopback_options(), sink);
        assert!(!server.group_chat());
        server.set_group_chat(true);
        assert!(server.group_chat());
    }

    #[test]
    fn test_close_without_listen_emits_nothing() {
        let sink = Arc::new(RecordingSink::new());
        let server = ServerSession::new(loopback_options(), sink.clone());
        server.close_connection();
        server.finish();
        assert_eq!(sink.count(|_| true), 0);
        assert_eq!(server.status(), SessionStatus::Stopped);
    }
}
