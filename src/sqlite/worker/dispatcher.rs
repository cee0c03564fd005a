use std::ffi::{CString, c_int};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;

use tracing::{debug, trace};

use crate::error::{ErrorCode, SqliteServiceError};
use crate::results::Row;
use crate::sqlite::ffi::{Database, EngineFailure};
use crate::sqlite::prepared::Statement;

use super::DatabaseSlot;
use super::channel::{Command, Outcome, RowSink, guarded};

pub(super) fn run_sqlite_worker(
    slot: &DatabaseSlot,
    receiver: &Receiver<Command>,
    stopping: &AtomicBool,
) {
    while let Ok(command) = receiver.recv() {
        if matches!(command, Command::Shutdown) {
            break;
        }
        if stopping.load(Ordering::Acquire) {
            trace!(command = command.name(), "aborting SQLite command during shutdown");
            command.fail(SqliteServiceError::Aborted);
            continue;
        }
        trace!(command = command.name(), "dispatching SQLite command");
        dispatch(slot, command);
    }

    let mut aborted = 0_usize;
    while let Ok(command) = receiver.try_recv() {
        command.fail(SqliteServiceError::Aborted);
        aborted += 1;
    }
    if aborted > 0 {
        debug!(aborted, "aborted queued SQLite commands at shutdown");
    }
}

fn dispatch(slot: &DatabaseSlot, command: Command) {
    match command {
        Command::Open {
            url,
            flags,
            respond_to,
        } => respond_to.respond_with(guarded("open", || open_database(slot, &url, flags))),
        Command::Exec { sql, respond_to } => {
            respond_to.respond_with(guarded("exec", || execute_batch(slot, &sql)));
        }
        Command::Fetch { sql, sink } => fetch_rows(slot, &sql, sink),
        Command::Prepare { sql, respond_to } => {
            respond_to.respond_with(guarded("prepare", || prepare_statement(slot, &sql)));
        }
        Command::Stream(job) => job.run(),
        Command::Shutdown => {}
    }
}

fn open_database(slot: &DatabaseSlot, url: &str, flags: c_int) -> Outcome {
    if slot.get().is_some() {
        return Err(SqliteServiceError::AlreadyOpen);
    }
    let path = CString::new(url).map_err(|_| {
        SqliteServiceError::InvalidInput("database URL contains an interior NUL byte".into())
    })?;
    let database = Database::open(&path, flags)?;
    slot.set(Arc::new(database))
        .map_err(|_| SqliteServiceError::AlreadyOpen)?;
    debug!(url, flags, "opened SQLite database");
    Ok(())
}

fn open_handle(slot: &DatabaseSlot) -> Result<&Arc<Database>, SqliteServiceError> {
    slot.get().ok_or(SqliteServiceError::NotOpen)
}

fn execute_batch(slot: &DatabaseSlot, sql: &str) -> Outcome {
    let database = open_handle(slot)?;
    let text = CString::new(sql)
        .map_err(|_| SqliteServiceError::InvalidInput("SQL contains an interior NUL byte".into()))?;
    database
        .exec(&text)
        .map_err(|EngineFailure { code, message }| {
            let code = ErrorCode::new(code).expect_not_busy();
            debug!(code = code.raw(), %message, "SQLite exec failed");
            SqliteServiceError::ExecError(code)
        })
}

fn fetch_rows(slot: &DatabaseSlot, sql: &str, sink: RowSink<Row>) {
    let database = match open_handle(slot) {
        Ok(database) => Arc::clone(database),
        Err(err) => return sink.finish(Some(err), Row::default()),
    };
    let outcome = guarded("fetch", || {
        let mut statement = Statement::prepare(database, sql);
        loop {
            match statement.next_row() {
                Ok(Some(row)) => sink.row(row),
                Ok(None) => break None,
                Err(err) => {
                    debug!(%err, diagnostic = statement.last_error(), "SQLite fetch failed");
                    break Some(err);
                }
            }
        }
    });
    sink.conclude(outcome, Row::default());
}

fn prepare_statement(slot: &DatabaseSlot, sql: &str) -> Statement {
    match open_handle(slot) {
        Ok(database) => Statement::prepare(Arc::clone(database), sql),
        Err(err) => Statement::failed(sql, err),
    }
}
