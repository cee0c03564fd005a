use std::fmt;
use std::panic;
use std::sync::mpsc;
use std::sync::{Arc, OnceLock};

use crate::error::SqliteServiceError;
use crate::event_loop::LoopHandle;
use crate::results::Row;

use super::config::ConnectionOptions;
use super::prepared::Statement;
use super::query::Record;
use super::worker::{
    Command, Completion, DatabaseSlot, RecordStream, Responder, RowEvent, RowSink, SqliteWorker,
};

/// A SQLite connection whose blocking calls run on a dedicated worker thread.
///
/// Every call, synchronous or not, is queued on the worker and executed in submission order.
/// The `async_*` variants return immediately; their completion runs later on the
/// [`crate::EventLoop`] the connection was created for, and keeps that loop's
/// [`crate::EventLoop::run`] from returning until it has been delivered.
///
/// SQLite reporting the database as busy is a fatal usage error. The worker catches the panic
/// and re-raises it where the command's result would have gone: on the calling thread for
/// synchronous calls, or from [`crate::EventLoop::run`] in place of an async completion. The
/// worker itself keeps serving later commands.
///
/// Dropping the connection lets the command in progress finish, completes every queued
/// command with [`SqliteServiceError::Aborted`], and joins the worker. Statements prepared
/// from the connection stay usable afterwards.
pub struct Connection {
    worker: SqliteWorker,
    loop_handle: LoopHandle,
    database: Arc<DatabaseSlot>,
    options: ConnectionOptions,
}

impl Connection {
    /// Create an unopened connection that delivers completions to `loop_handle`.
    ///
    /// # Errors
    /// Returns [`SqliteServiceError::ConnectionError`] if the worker thread cannot be spawned.
    pub fn new(loop_handle: &LoopHandle) -> Result<Self, SqliteServiceError> {
        Self::with_options(loop_handle, ConnectionOptions::default())
    }

    /// Create an unopened connection with explicit options.
    ///
    /// # Errors
    /// Returns [`SqliteServiceError::ConfigError`] for invalid options and
    /// [`SqliteServiceError::ConnectionError`] if the worker thread cannot be spawned.
    pub fn with_options(
        loop_handle: &LoopHandle,
        options: ConnectionOptions,
    ) -> Result<Self, SqliteServiceError> {
        options.validate()?;
        let database: Arc<DatabaseSlot> = Arc::new(OnceLock::new());
        let worker = SqliteWorker::spawn(Arc::clone(&database), options.thread_name.as_deref())?;
        Ok(Self {
            worker,
            loop_handle: loop_handle.clone(),
            database,
            options,
        })
    }

    /// Open the database at `url` (a path, `:memory:`, or a `file:` URI when enabled).
    ///
    /// # Errors
    /// [`SqliteServiceError::OpenError`] with SQLite's status code,
    /// [`SqliteServiceError::OutOfMemory`] if SQLite could not allocate a handle, or
    /// [`SqliteServiceError::AlreadyOpen`] if this connection was opened before.
    pub fn open(&self, url: &str) -> Result<(), SqliteServiceError> {
        let flags = self.options.open_flags.to_sqlite_flags();
        let url = url.to_owned();
        self.call(
            |respond_to| Command::Open {
                url,
                flags,
                respond_to,
            },
            "SQLite worker dropped while opening database",
        )?
    }

    /// Queue an open; `completion` receives `None` on success.
    pub fn async_open<F>(&self, url: impl Into<String>, completion: F)
    where
        F: FnOnce(Option<SqliteServiceError>) + Send + 'static,
    {
        self.submit(Command::Open {
            url: url.into(),
            flags: self.options.open_flags.to_sqlite_flags(),
            respond_to: self.outcome_responder(completion),
        });
    }

    /// Run every statement in `sql`, discarding any rows.
    ///
    /// # Errors
    /// [`SqliteServiceError::NotOpen`] before a successful open, otherwise
    /// [`SqliteServiceError::ExecError`] with the engine's status code.
    ///
    /// # Panics
    /// Panics on the calling thread if SQLite reports the database as busy.
    pub fn exec(&self, sql: &str) -> Result<(), SqliteServiceError> {
        let sql = sql.to_owned();
        self.call(
            |respond_to| Command::Exec { sql, respond_to },
            "SQLite worker dropped while executing batch",
        )?
    }

    /// Queue an [`exec`](Self::exec); `completion` receives `None` on success.
    pub fn async_exec<F>(&self, sql: impl Into<String>, completion: F)
    where
        F: FnOnce(Option<SqliteServiceError>) + Send + 'static,
    {
        self.submit(Command::Exec {
            sql: sql.into(),
            respond_to: self.outcome_responder(completion),
        });
    }

    /// Run the first statement in `sql`, calling `handler(None, row)` for each row and then
    /// once more with the terminal error (if any) and an empty [`Row`].
    ///
    /// The handler runs on the calling thread while the worker steps the statement.
    pub fn fetch<F>(&self, sql: &str, mut handler: F)
    where
        F: FnMut(Option<SqliteServiceError>, Row),
    {
        let (sender, receiver) = mpsc::channel();
        let command = Command::Fetch {
            sql: sql.to_owned(),
            sink: RowSink::Caller(sender),
        };
        if self.worker.enqueue(command).is_err() {
            handler(Some(worker_closed()), Row::default());
            return;
        }
        for event in receiver {
            match event {
                RowEvent::Row(row) => handler(None, row),
                RowEvent::Finished(err, row) => return handler(err, row),
                RowEvent::Panicked(payload) => panic::resume_unwind(payload),
            }
        }
        handler(
            Some(connection_error("SQLite worker dropped while fetching rows")),
            Row::default(),
        );
    }

    /// Queue a [`fetch`](Self::fetch); every handler call is posted to the owning loop in row
    /// order.
    pub fn async_fetch<F>(&self, sql: impl Into<String>, handler: F)
    where
        F: FnMut(Option<SqliteServiceError>, Row) + Send + 'static,
    {
        self.submit(Command::Fetch {
            sql: sql.into(),
            sink: RowSink::on_loop(&self.loop_handle, handler),
        });
    }

    /// Compile the first statement in `sql`.
    ///
    /// Never fails outright: on error the returned statement is in the failed state and
    /// reports the problem through [`Statement::error`] and [`Statement::last_error`].
    #[must_use]
    pub fn prepare(&self, sql: &str) -> Statement {
        let owned = sql.to_owned();
        self.call(
            |respond_to| Command::Prepare {
                sql: owned,
                respond_to,
            },
            "SQLite worker dropped while preparing statement",
        )
        .unwrap_or_else(|err| Statement::failed(sql, err))
    }

    /// Queue a [`prepare`](Self::prepare); `completion` receives the statement on the loop.
    pub fn async_prepare<F>(&self, sql: impl Into<String>, completion: F)
    where
        F: FnOnce(Statement) + Send + 'static,
    {
        self.submit(Command::Prepare {
            sql: sql.into(),
            respond_to: Responder::Loop(Completion::new(&self.loop_handle, completion)),
        });
    }

    /// Step `statement` to completion on the worker, posting `handler(None, record)` per row
    /// and a terminal `handler(err, R::default())` to the owning loop.
    ///
    /// Bind parameters before handing the statement over; it is dropped once iteration ends.
    pub fn async_fetch_into<R, F>(&self, statement: Statement, handler: F)
    where
        R: Record + Default + Send + 'static,
        F: FnMut(Option<SqliteServiceError>, R) + Send + 'static,
    {
        self.submit(Command::Stream(Box::new(RecordStream {
            statement,
            sink: RowSink::on_loop(&self.loop_handle, handler),
        })));
    }

    /// Whether a database has been opened on this connection.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.database.get().is_some()
    }

    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    #[must_use]
    pub fn loop_handle(&self) -> &LoopHandle {
        &self.loop_handle
    }

    fn outcome_responder<F>(&self, completion: F) -> Responder<Result<(), SqliteServiceError>>
    where
        F: FnOnce(Option<SqliteServiceError>) + Send + 'static,
    {
        Responder::Loop(Completion::new(
            &self.loop_handle,
            move |outcome: Result<(), SqliteServiceError>| completion(outcome.err()),
        ))
    }

    fn call<T: Send + 'static>(
        &self,
        build: impl FnOnce(Responder<T>) -> Command,
        drop_message: &'static str,
    ) -> Result<T, SqliteServiceError> {
        let (sender, receiver) = mpsc::channel();
        self.worker
            .enqueue(build(Responder::Caller(sender)))
            .map_err(|_| worker_closed())?;
        match receiver.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => Err(connection_error(drop_message)),
        }
    }

    fn submit(&self, command: Command) {
        if let Err(command) = self.worker.enqueue(command) {
            command.fail(worker_closed());
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("worker", &self.worker.name())
            .field("open", &self.is_open())
            .field("options", &self.options)
            .finish()
    }
}

fn connection_error(message: &str) -> SqliteServiceError {
    SqliteServiceError::ConnectionError(message.into())
}

fn worker_closed() -> SqliteServiceError {
    connection_error("SQLite worker closed")
}
