//! Column extraction: copying the current row of a statement into typed records.

use std::ffi::c_int;

use rusqlite::ffi as sqlite;

use super::ffi::RawStatement;
use crate::types::{ColumnKind, RowValue};

/// Read access to the row a statement is currently positioned on.
pub struct ColumnReader<'stmt> {
    handle: &'stmt RawStatement,
}

impl<'stmt> ColumnReader<'stmt> {
    pub(crate) fn new(handle: &'stmt RawStatement) -> Self {
        Self { handle }
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        usize::try_from(self.handle.column_count()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_null(&self, index: usize) -> bool {
        self.handle.column_type(ordinal(index)) == sqlite::SQLITE_NULL
    }

    /// 32-bit integer read; NULL reads as `0`.
    #[must_use]
    pub fn read_int(&self, index: usize) -> i32 {
        self.handle.column_int(ordinal(index))
    }

    /// 64-bit integer read; NULL reads as `0`.
    #[must_use]
    pub fn read_int64(&self, index: usize) -> i64 {
        self.handle.column_int64(ordinal(index))
    }

    /// Integer read with the op `kind` calls for; NULL reads as `0`.
    ///
    /// The text kind parses the column's text and reads unparsable text as `0`.
    #[must_use]
    pub fn read_integer(&self, kind: ColumnKind, index: usize) -> i64 {
        match kind {
            ColumnKind::NarrowInteger => i64::from(self.read_int(index)),
            ColumnKind::WideInteger => self.read_int64(index),
            ColumnKind::Text => self
                .read_text(index)
                .and_then(|text| text.trim().parse().ok())
                .unwrap_or(0),
        }
    }

    /// Text read; `None` when the column is NULL.
    #[must_use]
    pub fn read_text(&self, index: usize) -> Option<String> {
        self.handle.column_text(ordinal(index))
    }

    /// Read a column according to its storage class.
    #[must_use]
    pub fn read_value(&self, index: usize) -> RowValue {
        let column = ordinal(index);
        match self.handle.column_type(column) {
            sqlite::SQLITE_INTEGER => RowValue::Int(self.handle.column_int64(column)),
            sqlite::SQLITE_FLOAT => RowValue::Float(self.handle.column_double(column)),
            sqlite::SQLITE_TEXT => self
                .handle
                .column_text(column)
                .map_or(RowValue::Null, RowValue::Text),
            sqlite::SQLITE_BLOB => RowValue::Blob(self.handle.column_blob(column)),
            _ => RowValue::Null,
        }
    }

    pub(crate) fn read_values(&self) -> Vec<RowValue> {
        (0..self.column_count())
            .map(|index| self.read_value(index))
            .collect()
    }
}

// Indexes past c_int::MAX are out of range for SQLite anyway and read as NULL.
fn ordinal(index: usize) -> c_int {
    c_int::try_from(index).unwrap_or(c_int::MAX)
}

/// A field type that can be filled from one result column.
pub trait FromColumn: Sized {
    const KIND: ColumnKind;

    fn from_column(reader: &ColumnReader<'_>, index: usize) -> Self;
}

macro_rules! integer_column {
    ($kind:ident: $($ty:ty),* $(,)?) => {
        $(
            impl FromColumn for $ty {
                const KIND: ColumnKind = ColumnKind::$kind;

                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::unnecessary_cast
                )]
                fn from_column(reader: &ColumnReader<'_>, index: usize) -> Self {
                    reader.read_integer(Self::KIND, index) as $ty
                }
            }
        )*
    };
}

integer_column!(NarrowInteger: i8, i16, i32, u8, u16);
// `u32` does not fit the signed 32-bit op. `u64` and `usize` reinterpret the stored `i64`
// bits, so values bound above `i64::MAX` read back unchanged.
integer_column!(WideInteger: i64, isize, u32, u64, usize);

impl FromColumn for bool {
    const KIND: ColumnKind = ColumnKind::NarrowInteger;

    fn from_column(reader: &ColumnReader<'_>, index: usize) -> Self {
        reader.read_integer(Self::KIND, index) != 0
    }
}

impl FromColumn for String {
    const KIND: ColumnKind = ColumnKind::Text;

    fn from_column(reader: &ColumnReader<'_>, index: usize) -> Self {
        reader.read_text(index).unwrap_or_default()
    }
}

impl<T: FromColumn> FromColumn for Option<T> {
    const KIND: ColumnKind = T::KIND;

    fn from_column(reader: &ColumnReader<'_>, index: usize) -> Self {
        if reader.is_null(index) {
            None
        } else {
            Some(T::from_column(reader, index))
        }
    }
}

/// A typed row: its fields are assigned from the result columns in declared order.
///
/// Implemented for tuples of up to twelve [`FromColumn`] fields. Structs can implement it
/// by reading each field with [`FromColumn::from_column`]:
/// ```rust
/// use sqlite_service::{ColumnReader, FromColumn, Record};
///
/// #[derive(Default)]
/// struct Entry {
///     key: String,
///     hits: i64,
/// }
///
/// impl Record for Entry {
///     fn assign_columns(&mut self, reader: &ColumnReader<'_>) {
///         self.key = String::from_column(reader, 0);
///         self.hits = i64::from_column(reader, 1);
///     }
/// }
/// ```
pub trait Record {
    fn assign_columns(&mut self, reader: &ColumnReader<'_>);
}

macro_rules! tuple_record {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: FromColumn),+> Record for ($($name,)+) {
            fn assign_columns(&mut self, reader: &ColumnReader<'_>) {
                $( self.$idx = $name::from_column(reader, $idx); )+
            }
        }
    };
}

tuple_record!(A: 0);
tuple_record!(A: 0, B: 1);
tuple_record!(A: 0, B: 1, C: 2);
tuple_record!(A: 0, B: 1, C: 2, D: 3);
tuple_record!(A: 0, B: 1, C: 2, D: 3, E: 4);
tuple_record!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
tuple_record!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
tuple_record!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);
tuple_record!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8);
tuple_record!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8, J: 9);
tuple_record!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8, J: 9, K: 10);
tuple_record!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8, J: 9, K: 10, L: 11);
