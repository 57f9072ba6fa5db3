//! `EventLoopPool`: a fixed set of worker threads driving one I/O dispatcher.
//!
//! # How it works
//!
//! The pool owns a multi-threaded Tokio runtime with exactly
//! `worker_threads` workers.  Every asynchronous operation of a session
//! (connect, accept, read, write) is a task on this runtime, so a slow
//! completion handler on one worker never stalls I/O on the other.
//!
//! ```text
//! start()  ──► Runtime { worker × N }  + keep-alive token
//!                 │
//! spawn()  ──►    ├─ task ──► completes on any worker
//!                 └─ supervisor: reports a panicking task once, then ends
//!
//! stop()   ──► release keep-alive ──► shut the runtime down ──► join workers
//! ```
//!
//! # Keep-alive token
//!
//! Long-lived loops (accept loop, receive loops, writer queues) hold a
//! [`KeepAlive`] and select on [`KeepAlive::released`], so that `stop()`
//! lets them wind down at their next suspension point before the runtime is
//! torn down.
//!
//! # Joining
//!
//! `stop()` blocks until every worker thread has exited.  Sockets owned by
//! tasks are dropped during that shutdown, so no socket outlives the
//! workers that might still touch it.
//!
//! A caller that is itself inside some other Tokio runtime cannot drop a
//! runtime in place, so the shutdown runs on a short-lived helper thread
//! that the caller joins.  The only caller that is not joined is one of
//! the pool's own workers (e.g. a sink reacting to an event by calling
//! `finish()`): it cannot wait for itself, so the pool is shut down in the
//! background instead.

use std::any::Any;
use std::cell::Cell;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::SessionError;
use crate::notify::{StatusEvent, StatusSink};

/// Receiving side of the pool's keep-alive token.
#[derive(Clone)]
pub struct KeepAlive(watch::Receiver<bool>);

impl KeepAlive {
    /// `true` while the pool has not been asked to stop.
    pub fn is_held(&self) -> bool {
        *self.0.borrow()
    }

    /// Completes once the pool releases the token (or is dropped).
    pub async fn released(&mut self) {
        while *self.0.borrow_and_update() {
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Cloneable handle for spawning supervised tasks onto a running pool.
#[derive(Clone)]
pub struct Spawner {
    handle: Handle,
    keep_alive: KeepAlive,
    sink: Arc<dyn StatusSink>,
    live_tasks: Arc<watch::Sender<usize>>,
}

impl Spawner {
    /// Spawns `task` onto the pool.
    ///
    /// A panic inside `task` is caught by a supervisor task and reported once
    /// through the sink as a worker fault; it never takes a worker down
    /// silently.
    pub fn spawn<F>(&self, name: &'static str, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.live_tasks.send_modify(|n| *n += 1);
        let inner = self.handle.spawn(task);
        let sink = Arc::clone(&self.sink);
        let live_tasks = Arc::clone(&self.live_tasks);
        self.handle.spawn(async move {
            let outcome = inner.await;
            live_tasks.send_modify(|n| *n = n.saturating_sub(1));
            match outcome {
                Ok(()) => {}
                Err(e) if e.is_panic() => {
                    let reason = panic_message(e.into_panic());
                    error!("{name} task panicked: {reason}");
                    sink.status(StatusEvent::Failed(SessionError::WorkerFault(format!(
                        "{name}: {reason}"
                    ))));
                }
                Err(_) => debug!("{name} task cancelled"),
            }
        })
    }

    /// The runtime handle, e.g. to enter its context for socket setup.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// A fresh copy of the keep-alive token.
    pub fn keep_alive(&self) -> KeepAlive {
        self.keep_alive.clone()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// How long `stop()` lets released tasks wind down before cancelling them.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    /// Id of the pool whose runtime owns this thread; 0 elsewhere.
    static CURRENT_POOL: Cell<usize> = const { Cell::new(0) };
}

struct Running {
    runtime: Runtime,
    keep_alive_tx: watch::Sender<bool>,
    spawner: Spawner,
}

/// The worker pool shared by all asynchronous operations of one session.
pub struct EventLoopPool {
    id: usize,
    worker_threads: usize,
    thread_name: String,
    sink: Arc<dyn StatusSink>,
    running: Mutex<Option<Running>>,
}

impl EventLoopPool {
    /// Creates a stopped pool; no thread exists until [`start`](Self::start).
    pub fn new(worker_threads: usize, thread_name: &str, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            worker_threads: worker_threads.max(1),
            thread_name: thread_name.to_string(),
            sink,
            running: Mutex::new(None),
        }
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    /// `true` when called from one of this pool's own threads.
    pub fn is_current_worker(&self) -> bool {
        CURRENT_POOL.with(Cell::get) == self.id
    }

    /// Starts the worker threads, or returns the spawner of the running pool.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Runtime`] if the OS refuses to create threads.
    pub fn start(&self) -> Result<Spawner, SessionError> {
        let mut running = self.lock();
        if let Some(r) = running.as_ref() {
            return Ok(r.spawner.clone());
        }

        let id = self.id;
        let runtime = Builder::new_multi_thread()
            .worker_threads(self.worker_threads)
            .thread_name(self.thread_name.clone())
            .on_thread_start(move || {
                CURRENT_POOL.with(|pool| pool.set(id));
                debug!("worker thread started");
            })
            .on_thread_stop(|| debug!("worker thread exiting"))
            .enable_all()
            .build()
            .map_err(SessionError::Runtime)?;

        let (keep_alive_tx, keep_alive_rx) = watch::channel(true);
        let spawner = Spawner {
            handle: runtime.handle().clone(),
            keep_alive: KeepAlive(keep_alive_rx),
            sink: Arc::clone(&self.sink),
            live_tasks: Arc::new(watch::channel(0).0),
        };
        info!(workers = self.worker_threads, "event loop pool started");
        *running = Some(Running {
            runtime,
            keep_alive_tx,
            spawner: spawner.clone(),
        });
        Ok(spawner)
    }

    /// The spawner of the running pool, if any.
    pub fn spawner(&self) -> Option<Spawner> {
        self.lock().as_ref().map(|r| r.spawner.clone())
    }

    /// Releases the keep-alive token, shuts the dispatcher down and joins
    /// every worker.  Does nothing if the pool is not running.
    pub fn stop(&self) {
        let Some(running) = self.lock().take() else {
            return;
        };

        let _ = running.keep_alive_tx.send(false);
        let live_tasks = Arc::clone(&running.spawner.live_tasks);
        if self.is_current_worker() {
            warn!("event loop pool stopped from one of its own workers; not joining");
            running.runtime.shutdown_background();
        } else if Handle::try_current().is_ok() {
            self.join_from_helper(running.runtime, live_tasks);
        } else {
            shut_down(running.runtime, &live_tasks);
        }
        info!("event loop pool stopped");
    }

    /// Runs [`shut_down`] on a helper thread and waits for it.
    fn join_from_helper(&self, runtime: Runtime, live_tasks: Arc<watch::Sender<usize>>) {
        let helper = std::thread::Builder::new()
            .name(format!("{}-stop", self.thread_name))
            .spawn(move || shut_down(runtime, &live_tasks));
        match helper {
            Ok(handle) => {
                if handle.join().is_err() {
                    error!("event loop pool shutdown panicked");
                }
            }
            Err(e) => error!("could not spawn pool shutdown thread: {e}"),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        // A poisoned lock only means a previous holder panicked; the
        // `Option<Running>` inside is still consistent.
        self.running.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Gives released tasks up to [`DRAIN_TIMEOUT`] to finish, then drops the
/// runtime, which cancels whatever is left and joins every worker.
///
/// Must not be called from inside a runtime.
fn shut_down(runtime: Runtime, live_tasks: &watch::Sender<usize>) {
    let mut idle = live_tasks.subscribe();
    let drained = runtime.block_on(async {
        matches!(
            tokio::time::timeout(DRAIN_TIMEOUT, idle.wait_for(|n| *n == 0)).await,
            Ok(Ok(_))
        )
    });
    if !drained {
        debug!("cancelling tasks that ignored the keep-alive");
    }
    drop(runtime);
}

impl Drop for EventLoopPool {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{MockStatusSink, SessionEvent};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn channel_sink() -> (Arc<dyn StatusSink>, std::sync::mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = std::sync::mpsc::channel();
        (Arc::new(tx), rx)
    }

    #[test]
    fn test_new_pool_is_not_running() {
        let (sink, _rx) = channel_sink();
        let pool = EventLoopPool::new(2, "test-worker", sink);
        assert!(!pool.is_running());
        assert!(pool.spawner().is_none());
    }

    #[test]
    fn test_zero_workers_is_clamped_to_one() {
        let (sink, _rx) = channel_sink();
        let pool = EventLoopPool::new(0, "test-worker", sink);
        assert_eq!(pool.worker_threads(), 1);
    }

    #[test]
    fn test_spawned_task_runs_on_pool() {
        // Arrange
        let (sink, _rx) = channel_sink();
        let pool = EventLoopPool::new(2, "test-worker", sink);
        let spawner = pool.start().expect("start");
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        // Act
        spawner.spawn("whoami", async move {
            let _ = done_tx.send(std::thread::current().name().map(str::to_owned));
        });

        // Assert
        let name = done_rx.recv_timeout(Duration::from_secs(5)).expect("task ran");
        assert_eq!(name.as_deref(), Some("test-worker"));
        pool.stop();
    }

    #[test]
    fn test_start_twice_reuses_running_pool() {
        let (sink, _rx) = channel_sink();
        let pool = EventLoopPool::new(1, "test-worker", sink);
        let first = pool.start().expect("start");
        let second = pool.start().expect("start again");
        assert!(first.keep_alive().is_held());
        assert!(second.keep_alive().is_held());
        pool.stop();
    }

    #[test]
    fn test_panicking_task_is_reported_once() {
        // Arrange
        let (sink, rx) = channel_sink();
        let pool = EventLoopPool::new(2, "test-worker", sink);
        let spawner = pool.start().expect("start");

        // Act
        spawner.spawn("faulty", async { panic!("handler exploded") });

        // Assert
        let event = rx.recv_timeout(Duration::from_secs(5)).expect("fault reported");
        match event {
            SessionEvent::Status(StatusEvent::Failed(SessionError::WorkerFault(text))) => {
                assert!(text.contains("handler exploded"), "got {text}");
            }
            other => panic!("unexpected event {other:?}"),
        }
        pool.stop();
        assert!(rx.try_recv().is_err(), "exactly one notification per fault");
    }

    #[test]
    fn test_stop_releases_keep_alive_and_joins() {
        // Arrange
        let (sink, _rx) = channel_sink();
        let pool = EventLoopPool::new(2, "test-worker", sink);
        let spawner = pool.start().expect("start");
        let exited = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let mut keep_alive = spawner.keep_alive();
            let exited = Arc::clone(&exited);
            spawner.spawn("waiter", async move {
                keep_alive.released().await;
                exited.fetch_add(1, Ordering::SeqCst);
            });
        }

        // Act
        pool.stop();

        // Assert
        assert!(!pool.is_running());
        assert!(!spawner.keep_alive().is_held());
        assert_eq!(exited.load(Ordering::SeqCst), 3);
    }

    struct SlowDrop(Arc<AtomicBool>);

    impl Drop for SlowDrop {
        fn drop(&mut self) {
            std::thread::sleep(Duration::from_millis(200));
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_stop_from_another_runtime_waits_for_task_teardown() {
        // Arrange: a task that ignores the keep-alive and drops slowly
        let (sink, _rx) = channel_sink();
        let pool = EventLoopPool::new(2, "test-worker", sink);
        let spawner = pool.start().expect("start");
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = SlowDrop(Arc::clone(&dropped));
        spawner.spawn("stubborn", async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        });
        let caller = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("caller runtime");

        // Act
        caller.block_on(async { pool.stop() });

        // Assert
        assert!(!pool.is_running());
        assert!(dropped.load(Ordering::SeqCst), "stop returned before the pool was torn down");
    }

    #[test]
    fn test_is_current_worker_only_on_own_threads() {
        // Arrange
        let (sink, _rx) = channel_sink();
        let pool = Arc::new(EventLoopPool::new(1, "test-worker", Arc::clone(&sink)));
        let other = EventLoopPool::new(1, "other-worker", sink);
        let spawner = pool.start().expect("start");
        let other_spawner = other.start().expect("start other");
        let (tx, rx) = std::sync::mpsc::channel();

        // Act
        let (own, own_tx) = (Arc::clone(&pool), tx.clone());
        spawner.spawn("own", async move {
            let _ = own_tx.send(("own", own.is_current_worker()));
        });
        let foreign = Arc::clone(&pool);
        other_spawner.spawn("foreign", async move {
            let _ = tx.send(("foreign", foreign.is_current_worker()));
        });

        // Assert
        let mut seen: Vec<_> = (0..2)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).expect("task ran"))
            .collect();
        seen.sort();
        assert_eq!(seen, vec![("foreign", false), ("own", true)]);
        assert!(!pool.is_current_worker());
        other.stop();
        pool.stop();
    }

    #[test]
    fn test_stop_twice_is_harmless() {
        let mut sink = MockStatusSink::new();
        sink.expect_status().never();
        let pool = EventLoopPool::new(2, "test-worker", Arc::new(sink));
        pool.start().expect("start");
        pool.stop();
        pool.stop();
    }

    #[test]
    fn test_pool_restarts_after_stop() {
        let (sink, _rx) = channel_sink();
        let pool = EventLoopPool::new(1, "test-worker", sink);
        pool.start().expect("start");
        pool.stop();
        assert!(pool.start().is_ok());
        assert!(pool.is_running());
    }
}
