//! `Connection`: one TCP socket plus its lifecycle flag.
//!
//! A connection is created when a socket has been connected (client) or
//! accepted (server).  From then on:
//!
//! - **Reads** happen in [`Connection::receive_loop`], one read at a time
//!   into a buffer owned by that loop.  The next read is only issued after
//!   the previous one has been delivered, so bytes from one peer arrive in
//!   order.  The loop re-arms only while the session is active *and* the
//!   connection is open.
//! - **Writes** go through an unbounded queue drained by a dedicated writer
//!   task, so two `send` calls on the same connection hit the wire in call
//!   order even though they may be issued from different threads.
//! - **Closing** ([`Connection::close`]) flips the state to `Closed`, wakes
//!   the reader and writer, and shuts the socket down in both directions
//!   synchronously through a duplicated handle.  Tasks still holding the
//!   socket then finish at their next suspension point.

use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::domain::{ConnectionState, ConnectionStateCell, StatusCell};
use crate::engine::event_loop::{KeepAlive, Spawner};
use crate::error::{SessionError, SlotIndex};
use crate::notify::{StatusEvent, StatusSink};

/// What a session hands to each of its connections.
#[derive(Clone)]
pub struct IoContext {
    pub spawner: Spawner,
    pub sink: Arc<dyn StatusSink>,
    pub status: Arc<StatusCell>,
    pub recv_buffer_size: usize,
}

/// Why a receive loop returned.
#[derive(Debug)]
pub enum ReceiveEnd {
    /// The session stopped or the connection was closed locally.
    Stopped,
    /// The peer closed its side (zero-length read).
    PeerClosed,
    /// A read failed while the session and connection were still live.
    Failed(std::io::Error),
    /// Another receive loop already owns this connection's read half.
    AlreadyReading,
}

pub struct Connection {
    slot: Option<SlotIndex>,
    peer: SocketAddr,
    state: ConnectionStateCell,
    control: std::net::TcpStream,
    reader: Mutex<Option<OwnedReadHalf>>,
    reading: AtomicBool,
    outbound: mpsc::UnboundedSender<Arc<[u8]>>,
    closed_tx: watch::Sender<bool>,
    recv_buffer_size: usize,
}

impl Connection {
    /// Wraps a connected stream, marks it open and starts its writer task.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the socket cannot be duplicated or
    /// re-registered with the dispatcher.
    pub fn establish(
        stream: TcpStream,
        slot: Option<SlotIndex>,
        ctx: &IoContext,
    ) -> std::io::Result<Arc<Self>> {
        let _enter = ctx.spawner.handle().enter();

        let peer = stream.peer_addr()?;
        let std_stream = stream.into_std()?;
        let control = std_stream.try_clone()?;
        let stream = TcpStream::from_std(std_stream)?;
        let (read_half, write_half) = stream.into_split();

        let (outbound, queue) = mpsc::unbounded_channel();
        let (closed_tx, _) = watch::channel(false);

        let conn = Arc::new(Self {
            slot,
            peer,
            state: ConnectionStateCell::new(ConnectionState::Open),
            control,
            reader: Mutex::new(Some(read_half)),
            reading: AtomicBool::new(false),
            outbound,
            closed_tx,
            recv_buffer_size: ctx.recv_buffer_size.max(1),
        });

        ctx.spawner.spawn(
            "writer",
            Arc::clone(&conn).write_queue(write_half, queue, ctx.clone()),
        );
        debug!(peer = %peer, slot = ?slot, "connection established");
        Ok(conn)
    }

    pub fn slot(&self) -> Option<SlotIndex> {
        self.slot
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// `true` while a receive loop owns the read half.
    pub fn is_reading(&self) -> bool {
        self.reading.load(Ordering::Acquire)
    }

    /// Queues `bytes` for writing.  Returns `false` if the connection is not
    /// open (nothing is queued).
    pub fn send(&self, bytes: Arc<[u8]>) -> bool {
        if !self.is_open() {
            return false;
        }
        self.outbound.send(bytes).is_ok()
    }

    /// Closes the connection from this side.
    ///
    /// Returns `Ok(true)` if this call performed the close and `Ok(false)` if
    /// the connection was not open.  Only the socket shutdown can fail.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Shutdown`] if the OS rejects the shutdown; the
    /// connection is still marked closed in that case.
    pub fn close(&self) -> Result<bool, SessionError> {
        if !self.state.close() {
            return Ok(false);
        }
        self.closed_tx.send_replace(true);
        match self.control.shutdown(Shutdown::Both) {
            Ok(()) => Ok(true),
            // The peer already tore the connection down; nothing left to shut.
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(true),
            Err(source) => Err(SessionError::Shutdown {
                slot: self.slot,
                source,
            }),
        }
    }

    /// Marks the connection closed after the peer went away.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn mark_peer_closed(&self) -> bool {
        if !self.state.close() {
            return false;
        }
        self.closed_tx.send_replace(true);
        let _ = self.control.shutdown(Shutdown::Both);
        true
    }

    /// Runs the receive loop until the connection or session stops.
    ///
    /// Each completed read is handed to `deliver` before the next read is
    /// issued.  Only one loop may own a connection; a second call returns
    /// [`ReceiveEnd::AlreadyReading`] immediately.
    pub async fn receive_loop<F>(
        &self,
        status: &StatusCell,
        mut keep_alive: KeepAlive,
        mut deliver: F,
    ) -> ReceiveEnd
    where
        F: FnMut(Vec<u8>),
    {
        let reader = self.reader.lock().unwrap_or_else(|p| p.into_inner()).take();
        let Some(mut reader) = reader else {
            return ReceiveEnd::AlreadyReading;
        };
        self.reading.store(true, Ordering::Release);

        let mut closed = self.closed_tx.subscribe();
        let mut buffer = vec![0u8; self.recv_buffer_size];
        let end = loop {
            if !status.is_active() || !self.is_open() {
                break ReceiveEnd::Stopped;
            }

            let read = tokio::select! {
                r = reader.read(&mut buffer) => r,
                _ = closed.changed() => break ReceiveEnd::Stopped,
                _ = keep_alive.released() => break ReceiveEnd::Stopped,
            };

            match read {
                // A local shutdown also surfaces as end-of-stream.
                Ok(0) if self.is_open() => break ReceiveEnd::PeerClosed,
                Ok(0) => break ReceiveEnd::Stopped,
                Ok(n) => {
                    if !status.is_active() {
                        break ReceiveEnd::Stopped;
                    }
                    debug!(peer = %self.peer, bytes = n, "received");
                    deliver(buffer[..n].to_vec());
                }
                // A failure caused by our own close is the expected way for
                // an in-flight read to end; only report live failures.
                Err(e) if status.is_active() && self.is_open() => break ReceiveEnd::Failed(e),
                Err(_) => break ReceiveEnd::Stopped,
            }
        };
        self.reading.store(false, Ordering::Release);
        end
    }

    async fn write_queue(
        self: Arc<Self>,
        mut writer: OwnedWriteHalf,
        mut queue: mpsc::UnboundedReceiver<Arc<[u8]>>,
        ctx: IoContext,
    ) {
        let mut closed = self.closed_tx.subscribe();
        let mut keep_alive = ctx.spawner.keep_alive();
        loop {
            if !self.is_open() {
                break;
            }
            let bytes = tokio::select! {
                next = queue.recv() => match next {
                    Some(bytes) => bytes,
                    None => break,
                },
                _ = closed.changed() => break,
                _ = keep_alive.released() => break,
            };

            // No retry and no automatic close: the failure is surfaced and
            // the next queued message is attempted on its own.
            if let Err(source) = writer.write_all(&bytes).await {
                if ctx.status.is_active() && self.is_open() {
                    warn!(peer = %self.peer, "write failed: {source}");
                    ctx.sink.status(StatusEvent::Failed(SessionError::Write {
                        slot: self.slot,
                        source,
                    }));
                }
            } else {
                debug!(peer = %self.peer, bytes = bytes.len(), "sent");
            }
        }
        debug!(peer = %self.peer, "writer finished");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
