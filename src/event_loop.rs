//! The owning event loop that async completions are delivered on.
//!
//! Work reaches the loop as boxed closures posted through a [`LoopHandle`]. [`EventLoop::run`]
//! executes them in FIFO order on the calling thread and returns once nothing is queued and no
//! [`LifetimeGuard`] is outstanding, i.e. once no background operation can still post to it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::runtime::{Builder, Runtime};
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tracing::{debug, trace};

use crate::error::SqliteServiceError;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct LoopState {
    outstanding: AtomicUsize,
    stopped: AtomicBool,
    wake: Notify,
}

/// Single-threaded loop that runs posted completions.
pub struct EventLoop {
    runtime: Runtime,
    jobs: UnboundedReceiver<Job>,
    handle: LoopHandle,
}

impl EventLoop {
    /// Build a loop backed by a current-thread tokio runtime.
    ///
    /// # Errors
    /// Returns [`SqliteServiceError::Other`] if the runtime cannot be created.
    pub fn new() -> Result<Self, SqliteServiceError> {
        let runtime = Builder::new_current_thread().build().map_err(|err| {
            SqliteServiceError::Other(format!("failed to build event loop runtime: {err}"))
        })?;
        let (sender, jobs) = mpsc::unbounded_channel();
        Ok(Self {
            runtime,
            jobs,
            handle: LoopHandle {
                jobs: sender,
                state: Arc::new(LoopState::default()),
            },
        })
    }

    /// A cloneable handle for posting work and acquiring guards from any thread.
    #[must_use]
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Run posted jobs until the loop has no work and no outstanding guards, or until
    /// [`LoopHandle::stop`] is called. Returns the number of jobs executed.
    ///
    /// A stop request only ends the current call; the next `run` starts fresh.
    pub fn run(&mut self) -> usize {
        let Self {
            runtime,
            jobs,
            handle,
        } = self;
        let state = Arc::clone(&handle.state);

        let executed = runtime.block_on(async {
            let mut executed = 0_usize;
            loop {
                if state.stopped.load(Ordering::Acquire) {
                    debug!(executed, "event loop stopped on request");
                    break;
                }
                match jobs.try_recv() {
                    Ok(job) => {
                        job();
                        executed += 1;
                        continue;
                    }
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => {}
                }
                if state.outstanding.load(Ordering::Acquire) == 0 {
                    // Guards are dropped after their job is posted, so a zero count means
                    // any last job is already visible here.
                    match jobs.try_recv() {
                        Ok(job) => {
                            job();
                            executed += 1;
                            continue;
                        }
                        Err(_) => break,
                    }
                }
                tokio::select! {
                    Some(job) = jobs.recv() => {
                        job();
                        executed += 1;
                    }
                    () = state.wake.notified() => {}
                }
            }
            executed
        });

        state.stopped.store(false, Ordering::Release);
        trace!(executed, "event loop run finished");
        executed
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Thread-safe handle to an [`EventLoop`].
#[derive(Clone)]
pub struct LoopHandle {
    jobs: UnboundedSender<Job>,
    state: Arc<LoopState>,
}

impl LoopHandle {
    /// Schedule `job` to run on the loop thread after everything posted before it.
    ///
    /// If the loop has been dropped the job is discarded.
    pub fn post<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.jobs.send(Box::new(job)).is_err() {
            debug!("event loop is gone; discarding posted job");
        }
    }

    /// Keep [`EventLoop::run`] from returning until the guard is dropped.
    #[must_use]
    pub fn guard(&self) -> LifetimeGuard {
        LifetimeGuard::acquire(self)
    }

    /// Ask the current (or next) [`EventLoop::run`] to return without waiting for guards.
    pub fn stop(&self) {
        self.state.stopped.store(true, Ordering::Release);
        self.state.wake.notify_one();
    }

    /// Number of guards currently alive.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.state.outstanding.load(Ordering::Acquire)
    }
}

impl fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopHandle")
            .field("outstanding", &self.outstanding())
            .field("stopped", &self.state.stopped.load(Ordering::Relaxed))
            .finish()
    }
}

/// Counting token that keeps its loop alive while background work is in flight.
#[must_use = "dropping the guard releases it immediately"]
pub struct LifetimeGuard {
    state: Arc<LoopState>,
}

impl LifetimeGuard {
    pub fn acquire(handle: &LoopHandle) -> Self {
        handle.state.outstanding.fetch_add(1, Ordering::AcqRel);
        Self {
            state: Arc::clone(&handle.state),
        }
    }

    /// Release the guard; equivalent to dropping it.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LifetimeGuard {
    fn drop(&mut self) {
        if self.state.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            // notify_one stores a permit, so a loop that is about to wait still sees it.
            self.state.wake.notify_one();
        }
    }
}

impl fmt::Debug for LifetimeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifetimeGuard").finish_non_exhaustive()
    }
}
