use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, SendError, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

use crate::error::SqliteServiceError;

use super::DatabaseSlot;
use super::channel::Command;
use super::dispatcher::run_sqlite_worker;

static NEXT_WORKER_ID: AtomicUsize = AtomicUsize::new(0);

/// Dedicated thread that runs one connection's blocking SQLite calls in FIFO order.
pub(crate) struct SqliteWorker {
    sender: Sender<Command>,
    stopping: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    name: String,
}

impl SqliteWorker {
    pub(crate) fn spawn(
        slot: Arc<DatabaseSlot>,
        thread_name: Option<&str>,
    ) -> Result<Self, SqliteServiceError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let stopping = Arc::new(AtomicBool::new(false));
        let name = thread_name.map_or_else(
            || {
                format!(
                    "sqlite-worker-{}",
                    NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed)
                )
            },
            str::to_owned,
        );

        let worker_stopping = Arc::clone(&stopping);
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                run_sqlite_worker(&slot, &receiver, &worker_stopping);
                trace!("SQLite worker loop finished");
            })
            .map_err(|err| {
                SqliteServiceError::ConnectionError(format!(
                    "failed to spawn SQLite worker thread: {err}"
                ))
            })?;
        debug!(worker = %name, "spawned SQLite worker");

        Ok(Self {
            sender,
            stopping,
            thread: Some(thread),
            name,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Queue `command`; hands it back if the worker is no longer receiving.
    pub(crate) fn enqueue(&self, command: Command) -> Result<(), Command> {
        self.sender
            .send(command)
            .map_err(|SendError(command)| command)
    }

    /// Let the running command finish, abort everything still queued, and join the thread.
    pub(crate) fn stop_and_join(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.stopping.store(true, Ordering::Release);
        let _ = self.sender.send(Command::Shutdown);

        if thread.thread().id() == thread::current().id() {
            warn!(worker = %self.name, "SQLite worker stopped from its own thread; skipping join");
            return;
        }
        match thread.join() {
            Ok(()) => debug!(worker = %self.name, "SQLite worker joined"),
            Err(_) => warn!(worker = %self.name, "SQLite worker thread panicked"),
        }
    }
}

impl Drop for SqliteWorker {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
