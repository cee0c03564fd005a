mod channel;
mod dispatcher;
mod manager;

use std::sync::{Arc, OnceLock};

use super::ffi::Database;

/// Receives the native handle on the first successful open.
pub(crate) type DatabaseSlot = OnceLock<Arc<Database>>;

pub(crate) use channel::{Command, Completion, RecordStream, Responder, RowEvent, RowSink};
pub(crate) use manager::SqliteWorker;
