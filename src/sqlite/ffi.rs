//! Owned wrappers around the raw SQLite database and statement handles.
//!
//! Everything that touches `rusqlite::ffi` lives here; the rest of the crate only sees
//! [`Database`] and [`RawStatement`]. Databases are opened with `SQLITE_OPEN_FULLMUTEX`, so
//! SQLite serializes access to a handle internally and both types may cross threads.

#![allow(unsafe_code)]

use std::ffi::{CStr, c_char, c_int};
use std::ptr;

use rusqlite::ffi;
use tracing::trace;

use crate::error::{ErrorCode, SqliteServiceError};

/// Failure reported by SQLite together with its diagnostic for the handle.
#[derive(Debug, Clone)]
pub(crate) struct EngineFailure {
    pub(crate) code: c_int,
    pub(crate) message: String,
}

/// Owned `sqlite3*`, closed on drop.
pub(crate) struct Database {
    db: *mut ffi::sqlite3,
}

// SAFETY: the handle is opened with SQLITE_OPEN_FULLMUTEX against the bundled (threadsafe)
// build, so SQLite serializes every call made through it.
unsafe impl Send for Database {}
// SAFETY: see above; no Rust-side state is mutated through `&Database`.
unsafe impl Sync for Database {}

impl Database {
    /// Open `path` with the given `sqlite3_open_v2` flags.
    pub(crate) fn open(path: &CStr, flags: c_int) -> Result<Self, SqliteServiceError> {
        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        // SAFETY: `path` is NUL terminated and `db` is a valid out pointer.
        let rc = unsafe {
            ffi::sqlite3_open_v2(
                path.as_ptr(),
                &raw mut db,
                flags | ffi::SQLITE_OPEN_FULLMUTEX,
                ptr::null(),
            )
        };
        if rc != ffi::SQLITE_OK {
            if !db.is_null() {
                // SAFETY: SQLite hands out a handle even when open fails; it still has to be closed.
                unsafe { ffi::sqlite3_close(db) };
            }
            return Err(SqliteServiceError::OpenError(ErrorCode::new(rc)));
        }
        if db.is_null() {
            return Err(SqliteServiceError::OutOfMemory);
        }
        Ok(Self { db })
    }

    /// Most recent diagnostic recorded on this handle.
    pub(crate) fn last_message(&self) -> String {
        // SAFETY: `self.db` is open; sqlite3_errmsg never returns a dangling pointer for it.
        unsafe { owned_string(ffi::sqlite3_errmsg(self.db)) }.unwrap_or_default()
    }

    /// Run every statement in `sql`, discarding rows.
    pub(crate) fn exec(&self, sql: &CStr) -> Result<(), EngineFailure> {
        let mut errmsg: *mut c_char = ptr::null_mut();
        // SAFETY: `self.db` is open, `sql` is NUL terminated and `errmsg` is a valid out pointer.
        let rc = unsafe {
            ffi::sqlite3_exec(self.db, sql.as_ptr(), None, ptr::null_mut(), &raw mut errmsg)
        };
        if rc == ffi::SQLITE_OK {
            return Ok(());
        }
        let message = if errmsg.is_null() {
            ErrorCode::new(rc).message().to_owned()
        } else {
            // SAFETY: SQLite allocated `errmsg` for us and expects it back via sqlite3_free.
            unsafe {
                let message = owned_string(errmsg).unwrap_or_default();
                ffi::sqlite3_free(errmsg.cast());
                message
            }
        };
        Err(EngineFailure { code: rc, message })
    }

    /// Compile the first statement in `sql`.
    ///
    /// `Ok(None)` means the text held no statement at all (whitespace or comments).
    pub(crate) fn prepare(&self, sql: &CStr) -> Result<Option<RawStatement>, EngineFailure> {
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        // SAFETY: `self.db` is open, `sql` is NUL terminated and `stmt` is a valid out pointer.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(self.db, sql.as_ptr(), -1, &raw mut stmt, ptr::null_mut())
        };
        if rc != ffi::SQLITE_OK {
            return Err(EngineFailure {
                code: rc,
                message: self.last_message(),
            });
        }
        Ok((!stmt.is_null()).then_some(RawStatement { stmt }))
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        // SAFETY: statements hold an `Arc<Database>`, so none are left unfinalized here.
        let rc = unsafe { ffi::sqlite3_close(self.db) };
        trace!(rc, "closed SQLite database handle");
    }
}

/// Owned `sqlite3_stmt*`, finalized on drop.
pub(crate) struct RawStatement {
    stmt: *mut ffi::sqlite3_stmt,
}

// SAFETY: the owning database runs in serialized mode and the statement pointer is uniquely
// owned, so moving it to another thread is sound.
unsafe impl Send for RawStatement {}

impl RawStatement {
    pub(crate) fn step(&self) -> c_int {
        // SAFETY: `self.stmt` is a live prepared statement.
        unsafe { ffi::sqlite3_step(self.stmt) }
    }

    pub(crate) fn reset(&self) -> c_int {
        // SAFETY: `self.stmt` is a live prepared statement.
        unsafe { ffi::sqlite3_reset(self.stmt) }
    }

    pub(crate) fn column_count(&self) -> c_int {
        // SAFETY: `self.stmt` is a live prepared statement.
        unsafe { ffi::sqlite3_column_count(self.stmt) }
    }

    pub(crate) fn column_name(&self, index: c_int) -> String {
        // SAFETY: out-of-range indexes yield NULL, which `owned_string` handles.
        unsafe { owned_string(ffi::sqlite3_column_name(self.stmt, index)) }
            .unwrap_or_else(|| format!("column{index}"))
    }

    pub(crate) fn column_type(&self, index: c_int) -> c_int {
        // SAFETY: `self.stmt` is a live prepared statement.
        unsafe { ffi::sqlite3_column_type(self.stmt, index) }
    }

    pub(crate) fn column_int(&self, index: c_int) -> i32 {
        // SAFETY: `self.stmt` is a live prepared statement.
        unsafe { ffi::sqlite3_column_int(self.stmt, index) }
    }

    pub(crate) fn column_int64(&self, index: c_int) -> i64 {
        // SAFETY: `self.stmt` is a live prepared statement.
        unsafe { ffi::sqlite3_column_int64(self.stmt, index) }
    }

    pub(crate) fn column_double(&self, index: c_int) -> f64 {
        // SAFETY: `self.stmt` is a live prepared statement.
        unsafe { ffi::sqlite3_column_double(self.stmt, index) }
    }

    /// Column text, or `None` when the column is NULL.
    pub(crate) fn column_text(&self, index: c_int) -> Option<String> {
        // SAFETY: the text pointer stays valid until the next step/reset/finalize, and the byte
        // count is fetched after the text conversion as SQLite requires.
        unsafe {
            let text = ffi::sqlite3_column_text(self.stmt, index);
            if text.is_null() {
                return None;
            }
            let len = usize::try_from(ffi::sqlite3_column_bytes(self.stmt, index)).unwrap_or(0);
            let bytes = std::slice::from_raw_parts(text, len);
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    pub(crate) fn column_blob(&self, index: c_int) -> Vec<u8> {
        // SAFETY: as for `column_text`; a NULL pointer means a zero length blob.
        unsafe {
            let blob = ffi::sqlite3_column_blob(self.stmt, index);
            if blob.is_null() {
                return Vec::new();
            }
            let len = usize::try_from(ffi::sqlite3_column_bytes(self.stmt, index)).unwrap_or(0);
            std::slice::from_raw_parts(blob.cast::<u8>(), len).to_vec()
        }
    }

    pub(crate) fn bind_int(&self, index: c_int, value: i32) -> c_int {
        // SAFETY: `self.stmt` is a live prepared statement.
        unsafe { ffi::sqlite3_bind_int(self.stmt, index, value) }
    }

    pub(crate) fn bind_int64(&self, index: c_int, value: i64) -> c_int {
        // SAFETY: `self.stmt` is a live prepared statement.
        unsafe { ffi::sqlite3_bind_int64(self.stmt, index, value) }
    }

    pub(crate) fn bind_null(&self, index: c_int) -> c_int {
        // SAFETY: `self.stmt` is a live prepared statement.
        unsafe { ffi::sqlite3_bind_null(self.stmt, index) }
    }

    /// Bind text; SQLite takes its own copy of the bytes.
    pub(crate) fn bind_text(&self, index: c_int, value: &str) -> c_int {
        let Ok(len) = c_int::try_from(value.len()) else {
            return ffi::SQLITE_TOOBIG;
        };
        // SAFETY: `value` outlives the call and SQLITE_TRANSIENT makes SQLite copy it.
        unsafe {
            ffi::sqlite3_bind_text(
                self.stmt,
                index,
                value.as_ptr().cast::<c_char>(),
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        }
    }

    /// Ordinal of a named parameter, `0` when the statement has no such parameter.
    pub(crate) fn parameter_index(&self, name: &CStr) -> c_int {
        // SAFETY: `self.stmt` is live and `name` is NUL terminated.
        unsafe { ffi::sqlite3_bind_parameter_index(self.stmt, name.as_ptr()) }
    }
}

impl Drop for RawStatement {
    fn drop(&mut self) {
        // SAFETY: the statement is uniquely owned and finalized exactly once.
        let rc = unsafe { ffi::sqlite3_finalize(self.stmt) };
        trace!(rc, "finalized SQLite statement");
    }
}

/// Native code-to-message lookup (`sqlite3_errstr`).
pub(crate) fn native_message(code: c_int) -> Option<&'static str> {
    // SAFETY: sqlite3_errstr returns pointers into a static table owned by the library.
    unsafe {
        let msg = ffi::sqlite3_errstr(code);
        if msg.is_null() {
            None
        } else {
            CStr::from_ptr(msg).to_str().ok()
        }
    }
}

pub(crate) fn library_version_number() -> c_int {
    // SAFETY: no preconditions.
    unsafe { ffi::sqlite3_libversion_number() }
}

/// Copy a C string owned by SQLite into a Rust `String`.
///
/// # Safety
/// `ptr` must be NULL or point at a NUL-terminated string that stays valid for the call.
unsafe fn owned_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        // SAFETY: guaranteed by the caller.
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}
