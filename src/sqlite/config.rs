use std::ffi::c_int;

use rusqlite::ffi;

use crate::error::SqliteServiceError;

/// How [`crate::Connection::open`] opens the database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    pub read_only: bool,
    pub create: bool,
    /// Interpret the path as a `file:` URI.
    pub uri: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self {
            read_only: false,
            create: true,
            uri: false,
        }
    }
}

impl OpenFlags {
    /// Flags for `sqlite3_open_v2`.
    #[must_use]
    pub fn to_sqlite_flags(self) -> c_int {
        let mut flags = if self.read_only {
            ffi::SQLITE_OPEN_READONLY
        } else {
            ffi::SQLITE_OPEN_READWRITE
        };
        if self.create && !self.read_only {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        flags
    }
}

/// Options for configuring a [`crate::Connection`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Name of the worker thread; `sqlite-worker-<n>` when unset.
    pub thread_name: Option<String>,
    pub open_flags: OpenFlags,
}

impl ConnectionOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder::new()
    }

    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_open_flags(mut self, open_flags: OpenFlags) -> Self {
        self.open_flags = open_flags;
        self
    }

    /// Check the options for combinations that cannot work.
    ///
    /// # Errors
    /// Returns [`SqliteServiceError::ConfigError`] when the thread name contains a NUL byte or
    /// when a read-only open is also asked to create the file.
    pub fn validate(&self) -> Result<(), SqliteServiceError> {
        if self
            .thread_name
            .as_deref()
            .is_some_and(|name| name.contains('\0'))
        {
            return Err(SqliteServiceError::ConfigError(
                "worker thread name must not contain NUL bytes".into(),
            ));
        }
        if self.open_flags.read_only && self.open_flags.create {
            return Err(SqliteServiceError::ConfigError(
                "a read-only connection cannot create its database".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`ConnectionOptions`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptionsBuilder {
    opts: ConnectionOptions,
}

impl ConnectionOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.opts.thread_name = Some(name.into());
        self
    }

    /// Open read-only. Also turns off `create`, which a read-only open cannot honor.
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.opts.open_flags.read_only = read_only;
        if read_only {
            self.opts.open_flags.create = false;
        }
        self
    }

    #[must_use]
    pub fn create(mut self, create: bool) -> Self {
        self.opts.open_flags.create = create;
        self
    }

    #[must_use]
    pub fn uri(mut self, uri: bool) -> Self {
        self.opts.open_flags.uri = uri;
        self
    }

    /// The options as configured, without validation.
    #[must_use]
    pub fn finish(self) -> ConnectionOptions {
        self.opts
    }

    /// Validate and return the options.
    ///
    /// # Errors
    /// See [`ConnectionOptions::validate`].
    pub fn build(self) -> Result<ConnectionOptions, SqliteServiceError> {
        let opts = self.finish();
        opts.validate()?;
        Ok(opts)
    }
}
