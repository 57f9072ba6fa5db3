//! `ClientSession`: one connection to a LanChat server.
//!
//! # State machine
//!
//! ```text
//!                connect()            success
//! Unconnected ─────────────► Connecting ─────────► Connected
//!      ▲                         │ failure             │ close_connection()
//!      └─────────────────────────┘                     │ or server hung up
//!                                                      ▼
//!                 connect() re-enters Connecting ◄── Closed
//! ```
//!
//! `connect` only validates its arguments and schedules the work; name
//! resolution and the TCP handshake run on the session's worker pool and
//! the outcome arrives through the [`StatusSink`].  A connect that completes
//! after the session was closed is discarded.
//!
//! Once connected, the receive loop (started automatically with
//! `auto_recv`, or by [`ClientSession::recv`]) delivers every completed read
//! as a [`ReceivedMessage`] and re-arms only while the session is active.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};

use lanchat_core::{
    Connection, EngineConfig, EventLoopPool, IoContext, ReceiveEnd, ReceivedMessage,
    SessionError, SessionStatus, StatusCell, StatusEvent, StatusSink,
};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

use crate::infrastructure::storage::config::AppConfig;

/// Where a [`ClientSession`] is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    Unconnected,
    Connecting,
    Connected,
    Closed,
}

/// Runtime options of a [`ClientSession`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Start the receive loop as soon as the connection is up.
    pub auto_recv: bool,
    pub engine: EngineConfig,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl ClientOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            auto_recv: config.client.auto_recv,
            engine: config.engine.clone(),
        }
    }
}

struct Link {
    phase: ClientPhase,
    /// Bumped by every `connect` and `close_connection`; a completion whose
    /// attempt number is stale is dropped.
    attempt: u64,
    connection: Option<Arc<Connection>>,
}

struct Shared {
    auto_recv: bool,
    recv_buffer_size: usize,
    sink: Arc<dyn StatusSink>,
    /// Only changed while `link` is held, so it never disagrees with the
    /// phase for longer than one critical section.
    status: Arc<StatusCell>,
    link: Mutex<Link>,
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn fail(&self, err: SessionError) -> SessionError {
        let copy = err.duplicate();
        self.sink.status(StatusEvent::Failed(err));
        copy
    }

    /// Ends attempt `attempt` unsuccessfully, unless it was superseded.
    fn connect_failed(&self, attempt: u64, err: SessionError) {
        {
            let mut link = self.link();
            if link.attempt != attempt {
                debug!("discarding outcome of superseded connect");
                return;
            }
            link.phase = ClientPhase::Unconnected;
        }
        error!("{err}");
        self.sink.status(StatusEvent::Failed(err));
    }
}

/// The client side of a chat session.
pub struct ClientSession {
    shared: Arc<Shared>,
    pool: EventLoopPool,
}

impl ClientSession {
    pub fn new(options: ClientOptions, sink: Arc<dyn StatusSink>) -> Self {
        let pool = EventLoopPool::new(
            options.engine.effective_worker_threads(),
            "lanchat-client-io",
            Arc::clone(&sink),
        );
        Self {
            shared: Arc::new(Shared {
                auto_recv: options.auto_recv,
                recv_buffer_size: options.engine.effective_recv_buffer_size(),
                sink,
                status: Arc::new(StatusCell::new()),
                link: Mutex::new(Link {
                    phase: ClientPhase::Unconnected,
                    attempt: 0,
                    connection: None,
                }),
            }),
            pool,
        }
    }

    /// Starts connecting to `address:port` and returns immediately.
    ///
    /// `address` may be a literal IP or a host name; names are resolved on
    /// the worker pool.  Success is reported as `Connected` and activates the
    /// session; a resolve or connect failure is reported as a setup error and
    /// leaves the status untouched.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AlreadyConnected`] while connecting or connected.
    /// - [`SessionError::Runtime`] if the worker threads cannot start.
    pub fn connect(&self, address: &str, port: u16) -> Result<(), SessionError> {
        let attempt = {
            let mut link = self.shared.link();
            if matches!(link.phase, ClientPhase::Connecting | ClientPhase::Connected) {
                drop(link);
                return Err(self.shared.fail(SessionError::AlreadyConnected));
            }
            link.phase = ClientPhase::Connecting;
            link.attempt += 1;
            link.attempt
        };

        let spawner = match self.pool.start() {
            Ok(spawner) => spawner,
            Err(e) => {
                self.shared.link().phase = ClientPhase::Unconnected;
                return Err(self.shared.fail(e));
            }
        };

        let ctx = IoContext {
            spawner: spawner.clone(),
            sink: Arc::clone(&self.shared.sink),
            status: Arc::clone(&self.shared.status),
            recv_buffer_size: self.shared.recv_buffer_size,
        };
        let host = address.trim().to_string();
        info!(%host, port, "connecting");
        spawner.spawn(
            "connect",
            connect_task(Arc::clone(&self.shared), ctx, host, port, attempt),
        );
        Ok(())
    }

    /// Queues `bytes` for the server.
    ///
    /// A write failure is reported through the sink; it is not retried and
    /// does not close the connection.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] unless the session is connected (also
    /// reported through the sink).
    pub fn send(&self, bytes: &[u8]) -> Result<(), SessionError> {
        let conn = self.open_connection();
        match conn {
            Some(conn) if conn.send(Arc::from(bytes)) => Ok(()),
            _ => Err(self.shared.fail(SessionError::NotConnected)),
        }
    }

    /// Starts the receive loop.  Does nothing if it is already running.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] unless the session is connected.
    pub fn recv(&self) -> Result<(), SessionError> {
        let conn = self.open_connection();
        let (Some(conn), Some(spawner)) = (conn, self.pool.spawner()) else {
            return Err(self.shared.fail(SessionError::NotConnected));
        };
        let ctx = IoContext {
            spawner,
            sink: Arc::clone(&self.shared.sink),
            status: Arc::clone(&self.shared.status),
            recv_buffer_size: self.shared.recv_buffer_size,
        };
        spawn_receive(&self.shared, &ctx, conn);
        Ok(())
    }

    fn open_connection(&self) -> Option<Arc<Connection>> {
        let link = self.shared.link();
        match (&link.phase, &link.connection) {
            (ClientPhase::Connected, Some(conn)) if conn.is_open() => Some(Arc::clone(conn)),
            _ => None,
        }
    }

    /// Stops the session and shuts the socket down in both directions.
    ///
    /// A shutdown failure is reported, never raised.  An in-flight connect is
    /// abandoned.  `Closed` is emitted only if the session was active.
    pub fn close_connection(&self) {
        let (previous, conn) = {
            let mut link = self.shared.link();
            let previous = self.shared.status.stop();
            link.attempt += 1;
            if link.phase != ClientPhase::Unconnected {
                link.phase = ClientPhase::Closed;
            }
            (previous, link.connection.take())
        };

        if let Some(conn) = conn {
            if let Err(e) = conn.close() {
                warn!("{e}");
                self.shared.sink.status(StatusEvent::Failed(e));
            }
        }
        if previous == SessionStatus::Active {
            info!("connection closed");
            self.shared.sink.status(StatusEvent::Closed);
        }
    }

    /// Full teardown: [`close_connection`](Self::close_connection), then
    /// stop the worker pool and join its threads.  Safe to call repeatedly.
    pub fn finish(&self) {
        self.close_connection();
        self.pool.stop();
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.status.get()
    }

    pub fn phase(&self) -> ClientPhase {
        self.shared.link().phase
    }

    /// The server address of the current connection.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.shared.link().connection.as_ref().map(|c| c.peer())
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.finish();
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, SessionError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    let resolve_error = |source| SessionError::Resolve {
        host: host.to_string(),
        source,
    };
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(resolve_error)?;
    addrs.next().ok_or_else(|| {
        resolve_error(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no addresses found",
        ))
    })
}

async fn connect_task(shared: Arc<Shared>, ctx: IoContext, host: String, port: u16, attempt: u64) {
    let mut keep_alive = ctx.spawner.keep_alive();

    let addr = match resolve(&host, port).await {
        Ok(addr) => addr,
        Err(e) => return shared.connect_failed(attempt, e),
    };

    let stream = tokio::select! {
        r = TcpStream::connect(addr) => r,
        _ = keep_alive.released() => return,
    };
    let conn = stream.and_then(|stream| Connection::establish(stream, None, &ctx));
    let conn = match conn {
        Ok(conn) => conn,
        Err(source) => {
            return shared.connect_failed(attempt, SessionError::Connect { addr, source });
        }
    };

    {
        let mut link = shared.link();
        if link.attempt != attempt {
            drop(link);
            debug!("connect completed after close; dropping connection");
            let _ = conn.close();
            return;
        }
        link.phase = ClientPhase::Connected;
        link.connection = Some(Arc::clone(&conn));
        shared.status.activate();
    }

    info!(%addr, "connected");
    shared.sink.status(StatusEvent::Connected {
        peer: addr,
        slot: None,
    });
    if shared.auto_recv {
        spawn_receive(&shared, &ctx, conn);
    }
}

fn spawn_receive(shared: &Arc<Shared>, ctx: &IoContext, conn: Arc<Connection>) {
    if !conn.is_open() || conn.is_reading() {
        return;
    }
    let shared = Arc::clone(shared);
    let status = Arc::clone(&ctx.status);
    let keep_alive = ctx.spawner.keep_alive();
    ctx.spawner.spawn("receive", async move {
        let sink = Arc::clone(&shared.sink);
        let end = conn
            .receive_loop(&status, keep_alive, |bytes| {
                sink.message_received(ReceivedMessage { from: None, bytes });
            })
            .await;
        match end {
            ReceiveEnd::PeerClosed => {
                if !conn.mark_peer_closed() {
                    return;
                }
                {
                    let mut link = shared.link();
                    if link
                        .connection
                        .as_ref()
                        .is_some_and(|current| Arc::ptr_eq(current, &conn))
                    {
                        link.phase = ClientPhase::Closed;
                        link.connection = None;
                        shared.status.stop();
                    }
                }
                info!("server closed the connection");
                shared.sink.status(StatusEvent::PeerDisconnected { slot: None });
            }
            ReceiveEnd::Failed(source) => {
                warn!("receive failed: {source}");
                shared
                    .sink
                    .status(StatusEvent::Failed(SessionError::Read { slot: None, source }));
            }
            ReceiveEnd::Stopped | ReceiveEnd::AlreadyReading => {}
        }
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────
