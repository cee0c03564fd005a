use serde::Serialize;

/// A single column value as SQLite stores it.
///
/// Used by the dynamic row API ([`crate::Connection::fetch`]); typed records go through
/// [`crate::FromColumn`] instead.
/// ```rust
/// use sqlite_service::RowValue;
///
/// let value = RowValue::Int(42);
/// assert_eq!(value.as_int(), Some(42));
/// assert!(RowValue::Null.is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RowValue {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Binary data
    Blob(Vec<u8>),
    /// NULL value
    Null,
}

impl RowValue {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let RowValue::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RowValue::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            RowValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValue::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

/// How a typed field travels to and from a SQLite column.
///
/// Integer impls hand their kind to [`crate::Binder::bind_integer`] and
/// [`crate::ColumnReader::read_integer`], which pick the engine op from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// Integers narrower than 64 bits: `sqlite3_bind_int` / `sqlite3_column_int`.
    NarrowInteger,
    /// 64-bit integers: `sqlite3_bind_int64` / `sqlite3_column_int64`.
    WideInteger,
    /// Text: `sqlite3_bind_text` / `sqlite3_column_text`, NULL reads as the default value.
    Text,
}
