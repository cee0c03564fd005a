use std::any::Any;
use std::ffi::c_int;
use std::panic;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tracing::warn;

use crate::error::SqliteServiceError;
use crate::event_loop::{LifetimeGuard, LoopHandle};
use crate::results::Row;
use crate::sqlite::prepared::Statement;
use crate::sqlite::query::Record;

/// What a command panicked with on the worker.
pub(crate) type PanicPayload = Box<dyn Any + Send + 'static>;

/// A callback that runs on the owning loop, holding the loop open until it has run.
pub(crate) struct Completion<T> {
    handle: LoopHandle,
    guard: LifetimeGuard,
    callback: Box<dyn FnOnce(T) + Send>,
}

impl<T: Send + 'static> Completion<T> {
    pub(crate) fn new(handle: &LoopHandle, callback: impl FnOnce(T) + Send + 'static) -> Self {
        Self {
            guard: handle.guard(),
            handle: handle.clone(),
            callback: Box::new(callback),
        }
    }

    pub(crate) fn deliver(self, value: T) {
        let Self {
            handle,
            guard,
            callback,
        } = self;
        handle.post(move || {
            callback(value);
            drop(guard);
        });
    }

    /// Re-raise a worker panic on the owning loop in place of the callback.
    pub(crate) fn resume_panic(self, payload: PanicPayload) {
        let Self {
            handle,
            guard,
            callback,
        } = self;
        handle.post(move || {
            drop(callback);
            drop(guard);
            panic::resume_unwind(payload);
        });
    }
}

/// Where the single result of a command goes.
pub(crate) enum Responder<T> {
    /// Posted to the owning loop.
    Loop(Completion<T>),
    /// Sent back to a thread blocked in a synchronous call, which re-raises a panic.
    Caller(Sender<thread::Result<T>>),
}

impl<T: Send + 'static> Responder<T> {
    pub(crate) fn respond(self, value: T) {
        self.respond_with(Ok(value));
    }

    /// Deliver the result of running a command, or the panic it raised.
    pub(crate) fn respond_with(self, result: thread::Result<T>) {
        match (self, result) {
            (Responder::Loop(completion), Ok(value)) => completion.deliver(value),
            (Responder::Loop(completion), Err(payload)) => completion.resume_panic(payload),
            (Responder::Caller(sender), result) => {
                let _ = sender.send(result);
            }
        }
    }
}

pub(crate) type RowHandler<R> = Box<dyn FnMut(Option<SqliteServiceError>, R) + Send>;

/// What a synchronous fetch receives from the worker.
pub(crate) enum RowEvent<R> {
    Row(R),
    Finished(Option<SqliteServiceError>, R),
    Panicked(PanicPayload),
}

/// Destination for a stream of rows followed by exactly one terminal call.
pub(crate) enum RowSink<R> {
    Loop {
        handle: LoopHandle,
        guard: LifetimeGuard,
        handler: Arc<Mutex<RowHandler<R>>>,
    },
    Caller(Sender<RowEvent<R>>),
}

impl<R: Send + 'static> RowSink<R> {
    pub(crate) fn on_loop(
        handle: &LoopHandle,
        handler: impl FnMut(Option<SqliteServiceError>, R) + Send + 'static,
    ) -> Self {
        let handler: RowHandler<R> = Box::new(handler);
        RowSink::Loop {
            guard: handle.guard(),
            handle: handle.clone(),
            handler: Arc::new(Mutex::new(handler)),
        }
    }

    pub(crate) fn row(&self, row: R) {
        match self {
            RowSink::Loop {
                handle, handler, ..
            } => {
                let handler = Arc::clone(handler);
                handle.post(move || {
                    let mut handler = handler.lock().unwrap_or_else(PoisonError::into_inner);
                    handler(None, row);
                });
            }
            RowSink::Caller(sender) => {
                let _ = sender.send(RowEvent::Row(row));
            }
        }
    }

    pub(crate) fn finish(self, err: Option<SqliteServiceError>, terminal: R) {
        match self {
            RowSink::Loop {
                handle,
                guard,
                handler,
            } => {
                // The handler moves into the terminal job so its captures drop on the loop.
                handle.post(move || {
                    {
                        let mut handler = handler.lock().unwrap_or_else(PoisonError::into_inner);
                        handler(err, terminal);
                    }
                    drop(handler);
                    drop(guard);
                });
            }
            RowSink::Caller(sender) => {
                let _ = sender.send(RowEvent::Finished(err, terminal));
            }
        }
    }

    /// Re-raise a worker panic in place of the terminal call.
    pub(crate) fn resume_panic(self, payload: PanicPayload) {
        match self {
            RowSink::Loop {
                handle,
                guard,
                handler,
            } => {
                handle.post(move || {
                    drop(handler);
                    drop(guard);
                    panic::resume_unwind(payload);
                });
            }
            RowSink::Caller(sender) => {
                let _ = sender.send(RowEvent::Panicked(payload));
            }
        }
    }

    /// Finish with the outcome of an iteration, or re-raise the panic that cut it short.
    pub(crate) fn conclude(
        self,
        outcome: thread::Result<Option<SqliteServiceError>>,
        terminal: R,
    ) {
        match outcome {
            Ok(err) => self.finish(err, terminal),
            Err(payload) => self.resume_panic(payload),
        }
    }
}

/// Run `work`, capturing a panic so it can be handed to the command's owner.
pub(crate) fn guarded<T>(
    command: &'static str,
    work: impl FnOnce() -> T,
) -> thread::Result<T> {
    let result = panic::catch_unwind(panic::AssertUnwindSafe(work));
    if result.is_err() {
        warn!(command, "SQLite command panicked; re-raising on its owner");
    }
    result
}

/// A statement iteration carried out on the worker.
pub(crate) trait StreamJob: Send {
    fn run(self: Box<Self>);

    fn fail(self: Box<Self>, err: SqliteServiceError);
}

pub(crate) struct RecordStream<R> {
    pub(crate) statement: Statement,
    pub(crate) sink: RowSink<R>,
}

impl<R: Record + Default + Send + 'static> StreamJob for RecordStream<R> {
    fn run(self: Box<Self>) {
        let RecordStream {
            mut statement,
            sink,
        } = *self;
        let outcome = guarded("stream", || {
            loop {
                match statement.next_record::<R>() {
                    Ok(Some(record)) => sink.row(record),
                    Ok(None) => break None,
                    Err(err) => break Some(err),
                }
            }
        });
        sink.conclude(outcome, R::default());
    }

    fn fail(self: Box<Self>, err: SqliteServiceError) {
        self.sink.finish(Some(err), R::default());
    }
}

pub(crate) type Outcome = Result<(), SqliteServiceError>;

pub(crate) enum Command {
    Open {
        url: String,
        flags: c_int,
        respond_to: Responder<Outcome>,
    },
    Exec {
        sql: String,
        respond_to: Responder<Outcome>,
    },
    Fetch {
        sql: String,
        sink: RowSink<Row>,
    },
    Prepare {
        sql: String,
        respond_to: Responder<Statement>,
    },
    Stream(Box<dyn StreamJob>),
    Shutdown,
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Command::Open { .. } => "open",
            Command::Exec { .. } => "exec",
            Command::Fetch { .. } => "fetch",
            Command::Prepare { .. } => "prepare",
            Command::Stream(_) => "stream",
            Command::Shutdown => "shutdown",
        }
    }

    /// Complete the command with `err` without running it.
    pub(crate) fn fail(self, err: SqliteServiceError) {
        match self {
            Command::Open { respond_to, .. } | Command::Exec { respond_to, .. } => {
                respond_to.respond(Err(err));
            }
            Command::Fetch { sink, .. } => sink.finish(Some(err), Row::default()),
            Command::Prepare { sql, respond_to } => {
                respond_to.respond(Statement::failed(&sql, err));
            }
            Command::Stream(job) => job.fail(err),
            Command::Shutdown => {}
        }
    }
}
