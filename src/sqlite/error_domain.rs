use std::sync::LazyLock;

use super::ffi;

/// First SQLite release that ships `sqlite3_errstr`.
const NATIVE_ERRSTR_VERSION: i32 = 3_007_016;

const UNKNOWN_ERROR: &str = "unknown error";

/// Canonical short messages indexed by primary result code.
static FALLBACK_MESSAGES: [Option<&str>; 27] = [
    /* SQLITE_OK          */ Some("not an error"),
    /* SQLITE_ERROR       */ Some("SQL logic error or missing database"),
    /* SQLITE_INTERNAL    */ None,
    /* SQLITE_PERM        */ Some("access permission denied"),
    /* SQLITE_ABORT       */ Some("callback requested query abort"),
    /* SQLITE_BUSY        */ Some("database is locked"),
    /* SQLITE_LOCKED      */ Some("database table is locked"),
    /* SQLITE_NOMEM       */ Some("out of memory"),
    /* SQLITE_READONLY    */ Some("attempt to write a readonly database"),
    /* SQLITE_INTERRUPT   */ Some("interrupted"),
    /* SQLITE_IOERR       */ Some("disk I/O error"),
    /* SQLITE_CORRUPT     */ Some("database disk image is malformed"),
    /* SQLITE_NOTFOUND    */ Some("unknown operation"),
    /* SQLITE_FULL        */ Some("database or disk is full"),
    /* SQLITE_CANTOPEN    */ Some("unable to open database file"),
    /* SQLITE_PROTOCOL    */ Some("locking protocol"),
    /* SQLITE_EMPTY       */ Some("table contains no data"),
    /* SQLITE_SCHEMA      */ Some("database schema has changed"),
    /* SQLITE_TOOBIG      */ Some("string or blob too big"),
    /* SQLITE_CONSTRAINT  */ Some("constraint failed"),
    /* SQLITE_MISMATCH    */ Some("datatype mismatch"),
    /* SQLITE_MISUSE      */ Some("library routine called out of sequence"),
    /* SQLITE_NOLFS       */ Some("large file support is disabled"),
    /* SQLITE_AUTH        */ Some("authorization denied"),
    /* SQLITE_FORMAT      */ Some("auxiliary database format error"),
    /* SQLITE_RANGE       */ Some("bind or column index out of range"),
    /* SQLITE_NOTADB      */ Some("file is encrypted or is not a database"),
];

static ERROR_DOMAIN: LazyLock<ErrorDomain> = LazyLock::new(ErrorDomain::detect);

/// Maps SQLite status codes to human readable messages.
///
/// There is exactly one instance per process, built on first use and never mutated
/// afterwards; see [`error_domain`].
#[derive(Debug)]
pub struct ErrorDomain {
    native_lookup: bool,
}

impl ErrorDomain {
    fn detect() -> Self {
        Self {
            native_lookup: ffi::library_version_number() >= NATIVE_ERRSTR_VERSION,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        "sqlite3"
    }

    /// Whether messages come from the linked library rather than the built-in table.
    #[must_use]
    pub fn uses_native_lookup(&self) -> bool {
        self.native_lookup
    }

    #[must_use]
    pub fn message(&self, code: i32) -> &'static str {
        if self.native_lookup {
            ffi::native_message(code).unwrap_or_else(|| fallback_message(code))
        } else {
            fallback_message(code)
        }
    }
}

/// The process-wide error domain.
#[must_use]
pub fn error_domain() -> &'static ErrorDomain {
    &ERROR_DOMAIN
}

/// Table lookup used when the library cannot translate codes itself.
#[must_use]
pub fn fallback_message(code: i32) -> &'static str {
    usize::try_from(code & 0xff)
        .ok()
        .and_then(|index| FALLBACK_MESSAGES.get(index).copied().flatten())
        .unwrap_or(UNKNOWN_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_table_uses_low_byte() {
        assert_eq!(fallback_message(0), "not an error");
        assert_eq!(fallback_message(5), "database is locked");
        // SQLITE_BUSY_SNAPSHOT = SQLITE_BUSY | (2 << 8)
        assert_eq!(fallback_message(517), "database is locked");
        assert_eq!(fallback_message(14), "unable to open database file");
    }

    #[test]
    fn fallback_table_reports_unknown_codes() {
        assert_eq!(fallback_message(2), UNKNOWN_ERROR);
        assert_eq!(fallback_message(27), UNKNOWN_ERROR);
        assert_eq!(fallback_message(100), UNKNOWN_ERROR);
    }

    #[test]
    fn bundled_library_translates_codes_natively() {
        let domain = error_domain();
        assert_eq!(domain.name(), "sqlite3");
        assert!(domain.uses_native_lookup());
        assert_eq!(domain.message(5), "database is locked");
        assert!(std::ptr::eq(domain, error_domain()));
    }
}
