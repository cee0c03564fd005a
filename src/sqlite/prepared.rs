use std::collections::HashMap;
use std::ffi::{CString, c_int};
use std::fmt;
use std::sync::Arc;

use rusqlite::ffi as sqlite;

use crate::error::{ErrorCode, SqliteServiceError};
use crate::results::{Row, index_columns};

use super::ffi::{Database, EngineFailure, RawStatement};
use super::params::{Binder, Params};
use super::query::{ColumnReader, Record};

/// Where a [`Statement`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    /// Compiled and not yet stepped (or reset).
    Ready,
    /// The last step produced a row.
    RowAvailable,
    /// Iteration finished; further steps report [`Step::Done`] until [`Statement::reset`].
    Done,
    /// Compilation failed; the statement only carries the error.
    Failed,
}

/// Outcome of one [`Statement::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Row,
    Done,
}

/// A compiled SQL statement.
///
/// A statement keeps the database handle it was prepared against alive, so it may outlive the
/// [`crate::Connection`] that produced it. Preparation never fails outright: a statement that
/// did not compile is in [`StatementState::Failed`] and reports the stored error from
/// [`step`](Self::step) and [`fetch`](Self::fetch).
///
/// Stepping is blocking and happens on the calling thread; use
/// [`crate::Connection::async_fetch_into`] to iterate on the connection's worker instead.
pub struct Statement {
    // Finalized before the database handle below is released.
    handle: Option<RawStatement>,
    database: Option<Arc<Database>>,
    sql: String,
    state: StatementState,
    error: Option<SqliteServiceError>,
    diagnostic: String,
    column_names: Arc<Vec<String>>,
    column_index: Arc<HashMap<String, usize>>,
}

impl Statement {
    /// Compile the first statement in `sql` against `database`.
    pub(crate) fn prepare(database: Arc<Database>, sql: &str) -> Self {
        let text = match CString::new(sql) {
            Ok(text) => text,
            Err(_) => {
                return Self::failed(
                    sql,
                    SqliteServiceError::InvalidInput("SQL contains an interior NUL byte".into()),
                );
            }
        };

        match database.prepare(&text) {
            Ok(handle) => {
                let column_names: Vec<String> = handle
                    .as_ref()
                    .map(|handle| {
                        (0..handle.column_count())
                            .map(|index| handle.column_name(index))
                            .collect()
                    })
                    .unwrap_or_default();
                let column_index = Arc::new(index_columns(&column_names));
                Self {
                    handle,
                    database: Some(database),
                    sql: sql.to_owned(),
                    state: StatementState::Ready,
                    error: None,
                    diagnostic: String::new(),
                    column_names: Arc::new(column_names),
                    column_index,
                }
            }
            Err(EngineFailure { code, message }) => {
                let code = ErrorCode::new(code).expect_not_busy();
                Self::failed(sql, SqliteServiceError::PrepareError { code, message })
            }
        }
    }

    /// A statement in the [`StatementState::Failed`] state carrying `error`.
    pub(crate) fn failed(sql: &str, error: SqliteServiceError) -> Self {
        let diagnostic = match &error {
            SqliteServiceError::PrepareError { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            handle: None,
            database: None,
            sql: sql.to_owned(),
            state: StatementState::Failed,
            error: Some(error),
            diagnostic,
            column_names: Arc::default(),
            column_index: Arc::default(),
        }
    }

    /// Bind `params` to the statement's placeholders.
    ///
    /// Positional values fill ordinals `1, 2, 3, ...` in order; wrap a value in
    /// [`crate::named`] to target a named placeholder. Binding is a no-op on a failed statement.
    /// Bindings survive [`reset`](Self::reset).
    ///
    /// # Panics
    /// Panics if SQLite rejects a binding (unknown name, ordinal out of range, or binding while
    /// the statement is mid-iteration), which is a usage error.
    pub fn bind_params<P: Params>(&mut self, params: P) {
        if self.state == StatementState::Failed {
            return;
        }
        if let Some(handle) = &self.handle {
            let mut binder = Binder::new(handle);
            params.bind_all(&mut binder);
        }
    }

    /// Advance to the next row.
    ///
    /// Once [`Step::Done`] has been reported, later calls keep returning it without touching
    /// the engine until [`reset`](Self::reset) is called.
    ///
    /// # Errors
    /// Returns the stored error for a failed statement, or [`SqliteServiceError::StepError`]
    /// when the engine reports a failure while stepping.
    ///
    /// # Panics
    /// Panics if SQLite reports the database as busy.
    pub fn step(&mut self) -> Result<Step, SqliteServiceError> {
        match self.state {
            StatementState::Failed => {
                return Err(self
                    .error
                    .clone()
                    .unwrap_or(SqliteServiceError::NotOpen));
            }
            StatementState::Done => return Ok(Step::Done),
            StatementState::Ready | StatementState::RowAvailable => {}
        }

        let Some(handle) = &self.handle else {
            // Whitespace or comment-only SQL compiles to nothing.
            self.state = StatementState::Done;
            return Ok(Step::Done);
        };

        match handle.step() {
            sqlite::SQLITE_ROW => {
                self.state = StatementState::RowAvailable;
                Ok(Step::Row)
            }
            sqlite::SQLITE_DONE => {
                self.state = StatementState::Done;
                Ok(Step::Done)
            }
            rc => Err(self.record_step_failure(rc)),
        }
    }

    fn record_step_failure(&mut self, rc: c_int) -> SqliteServiceError {
        let code = ErrorCode::new(rc).expect_not_busy();
        self.state = StatementState::Done;
        self.diagnostic = self
            .database
            .as_ref()
            .map_or_else(|| code.message().to_owned(), |db| db.last_message());
        let err = SqliteServiceError::StepError(code);
        self.error = Some(err.clone());
        err
    }

    /// Step once and copy the row into `record`.
    ///
    /// Returns `Ok(false)` once iteration is complete; `record` is left untouched in that case.
    ///
    /// # Errors
    /// See [`step`](Self::step).
    pub fn fetch<R: Record>(&mut self, record: &mut R) -> Result<bool, SqliteServiceError> {
        match self.step()? {
            Step::Row => {
                if let Some(reader) = self.reader() {
                    record.assign_columns(&reader);
                }
                Ok(true)
            }
            Step::Done => Ok(false),
        }
    }

    /// Step once and build a fresh record from the row.
    ///
    /// # Errors
    /// See [`step`](Self::step).
    pub fn next_record<R: Record + Default>(&mut self) -> Result<Option<R>, SqliteServiceError> {
        let mut record = R::default();
        Ok(self.fetch(&mut record)?.then_some(record))
    }

    /// Step once and return the row as dynamically typed values.
    ///
    /// # Errors
    /// See [`step`](Self::step).
    pub fn next_row(&mut self) -> Result<Option<Row>, SqliteServiceError> {
        match self.step()? {
            Step::Row => {
                let values = self
                    .reader()
                    .map(|reader| reader.read_values())
                    .unwrap_or_default();
                Ok(Some(Row::with_index(
                    Arc::clone(&self.column_names),
                    Arc::clone(&self.column_index),
                    values,
                )))
            }
            Step::Done => Ok(None),
        }
    }

    /// Rewind to [`StatementState::Ready`], keeping the current bindings.
    ///
    /// A step failure recorded by the previous iteration is cleared; a failed prepare is not.
    pub fn reset(&mut self) {
        if self.state == StatementState::Failed {
            return;
        }
        if let Some(handle) = &self.handle {
            // The return code repeats the last step's error, which was already reported.
            let _ = handle.reset();
        }
        self.error = None;
        self.diagnostic.clear();
        self.state = StatementState::Ready;
    }

    fn reader(&self) -> Option<ColumnReader<'_>> {
        self.handle.as_ref().map(ColumnReader::new)
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn state(&self) -> StatementState {
        self.state
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state == StatementState::Failed
    }

    /// SQLite's diagnostic for the last failure, or `""` if nothing has failed since the last
    /// [`reset`](Self::reset).
    #[must_use]
    pub fn last_error(&self) -> &str {
        &self.diagnostic
    }

    #[must_use]
    pub fn error(&self) -> Option<&SqliteServiceError> {
        self.error.as_ref()
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("state", &self.state)
            .field("columns", &self.column_names)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
