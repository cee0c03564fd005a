use std::ffi::{CString, c_int};

use rusqlite::ffi as sqlite;

use super::ffi::RawStatement;
use crate::types::ColumnKind;

/// Writes parameter values into a prepared statement.
///
/// Positional values take ordinals `1, 2, 3, ...` in the order they are bound; named values
/// resolve their own ordinal and do not advance the positional counter.
pub struct Binder<'stmt> {
    handle: &'stmt RawStatement,
    next: c_int,
}

impl<'stmt> Binder<'stmt> {
    pub(crate) fn new(handle: &'stmt RawStatement) -> Self {
        Self { handle, next: 1 }
    }

    fn next_ordinal(&mut self) -> c_int {
        let ordinal = self.next;
        self.next += 1;
        ordinal
    }

    /// Ordinal of a named placeholder such as `:name`.
    ///
    /// # Panics
    /// Panics if the statement has no parameter with that name.
    fn named_ordinal(&self, name: &str) -> c_int {
        let ordinal = CString::new(name)
            .map(|name| self.handle.parameter_index(&name))
            .unwrap_or(0);
        assert!(ordinal > 0, "SQLite misuse: no parameter named `{name}`");
        ordinal
    }

    pub fn bind_int(&self, ordinal: c_int, value: i32) {
        check(self.handle.bind_int(ordinal, value), ordinal);
    }

    pub fn bind_int64(&self, ordinal: c_int, value: i64) {
        check(self.handle.bind_int64(ordinal, value), ordinal);
    }

    pub fn bind_text(&self, ordinal: c_int, value: &str) {
        check(self.handle.bind_text(ordinal, value), ordinal);
    }

    pub fn bind_null(&self, ordinal: c_int) {
        check(self.handle.bind_null(ordinal), ordinal);
    }

    /// Bind an integer with the op its kind calls for: `sqlite3_bind_int` for narrow values,
    /// `sqlite3_bind_int64` for wide ones, and its decimal text for the text kind.
    ///
    /// # Panics
    /// Panics if a narrow value does not fit in 32 bits.
    pub fn bind_integer(&self, kind: ColumnKind, ordinal: c_int, value: i64) {
        match kind {
            ColumnKind::NarrowInteger => {
                let narrow = i32::try_from(value).unwrap_or_else(|_| {
                    panic!("SQLite misuse: {value} does not fit a narrow integer parameter")
                });
                self.bind_int(ordinal, narrow);
            }
            ColumnKind::WideInteger => self.bind_int64(ordinal, value),
            ColumnKind::Text => self.bind_text(ordinal, &value.to_string()),
        }
    }
}

fn check(rc: c_int, ordinal: c_int) {
    assert!(
        rc == sqlite::SQLITE_OK,
        "SQLite misuse: binding parameter {ordinal} returned code {rc}"
    );
}

/// A value that can be bound to one statement parameter.
pub trait ToParam {
    fn kind(&self) -> ColumnKind;

    fn bind_to(&self, binder: &Binder<'_>, ordinal: c_int);
}

macro_rules! integer_param {
    ($kind:ident: $($ty:ty),* $(,)?) => {
        $(
            impl ToParam for $ty {
                fn kind(&self) -> ColumnKind {
                    ColumnKind::$kind
                }

                #[allow(
                    clippy::cast_lossless,
                    clippy::cast_possible_truncation,
                    clippy::cast_possible_wrap,
                    clippy::unnecessary_cast
                )]
                fn bind_to(&self, binder: &Binder<'_>, ordinal: c_int) {
                    binder.bind_integer(self.kind(), ordinal, *self as i64);
                }
            }
        )*
    };
}

integer_param!(NarrowInteger: i8, i16, i32, u8, u16);
// `u32` exceeds the signed 32-bit op, so it takes the 64-bit one like every 8-byte type.
// `u64` and `usize` values above `i64::MAX` are stored as their two's complement `i64`.
integer_param!(WideInteger: i64, isize, u32, u64, usize);

impl ToParam for bool {
    fn kind(&self) -> ColumnKind {
        ColumnKind::NarrowInteger
    }

    fn bind_to(&self, binder: &Binder<'_>, ordinal: c_int) {
        binder.bind_integer(self.kind(), ordinal, i64::from(*self));
    }
}

impl ToParam for str {
    fn kind(&self) -> ColumnKind {
        ColumnKind::Text
    }

    fn bind_to(&self, binder: &Binder<'_>, ordinal: c_int) {
        binder.bind_text(ordinal, self);
    }
}

impl ToParam for String {
    fn kind(&self) -> ColumnKind {
        ColumnKind::Text
    }

    fn bind_to(&self, binder: &Binder<'_>, ordinal: c_int) {
        binder.bind_text(ordinal, self);
    }
}

impl<T: ToParam + ?Sized> ToParam for &T {
    fn kind(&self) -> ColumnKind {
        (**self).kind()
    }

    fn bind_to(&self, binder: &Binder<'_>, ordinal: c_int) {
        (**self).bind_to(binder, ordinal);
    }
}

impl<T: ToParam> ToParam for Option<T> {
    fn kind(&self) -> ColumnKind {
        match self {
            Some(value) => value.kind(),
            None => ColumnKind::Text,
        }
    }

    fn bind_to(&self, binder: &Binder<'_>, ordinal: c_int) {
        match self {
            Some(value) => value.bind_to(binder, ordinal),
            None => binder.bind_null(ordinal),
        }
    }
}

/// One element of a parameter list: positional or named.
pub trait BindArg {
    fn bind_arg(&self, binder: &mut Binder<'_>);
}

impl<T: ToParam + ?Sized> BindArg for T {
    fn bind_arg(&self, binder: &mut Binder<'_>) {
        let ordinal = binder.next_ordinal();
        self.bind_to(binder, ordinal);
    }
}

/// A value bound to a named placeholder; see [`named`].
#[derive(Debug, Clone, Copy)]
pub struct Named<'n, T> {
    name: &'n str,
    value: T,
}

/// Bind `value` to the placeholder called `name` (including its prefix, e.g. `":id"`).
///
/// ```rust,no_run
/// # fn demo(statement: &mut sqlite_service::Statement) {
/// use sqlite_service::named;
///
/// statement.bind_params((named(":id", 7_i64), named(":label", "seven")));
/// # }
/// ```
#[must_use]
pub fn named<T: ToParam>(name: &str, value: T) -> Named<'_, T> {
    Named { name, value }
}

impl<T: ToParam> BindArg for Named<'_, T> {
    fn bind_arg(&self, binder: &mut Binder<'_>) {
        let ordinal = binder.named_ordinal(self.name);
        self.value.bind_to(binder, ordinal);
    }
}

/// A complete parameter list for one statement execution.
pub trait Params {
    fn bind_all(&self, binder: &mut Binder<'_>);
}

impl Params for () {
    fn bind_all(&self, _binder: &mut Binder<'_>) {}
}

macro_rules! tuple_params {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: BindArg),+> Params for ($($name,)+) {
            fn bind_all(&self, binder: &mut Binder<'_>) {
                $( self.$idx.bind_arg(binder); )+
            }
        }
    };
}

tuple_params!(A: 0);
tuple_params!(A: 0, B: 1);
tuple_params!(A: 0, B: 1, C: 2);
tuple_params!(A: 0, B: 1, C: 2, D: 3);
tuple_params!(A: 0, B: 1, C: 2, D: 3, E: 4);
tuple_params!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
tuple_params!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
tuple_params!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);
tuple_params!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8);
tuple_params!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8, J: 9);
tuple_params!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8, J: 9, K: 10);
tuple_params!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8, J: 9, K: 10, L: 11);

impl<T: ToParam> Params for Vec<T> {
    fn bind_all(&self, binder: &mut Binder<'_>) {
        for value in self {
            value.bind_arg(binder);
        }
    }
}

impl<T: ToParam> Params for &[T] {
    fn bind_all(&self, binder: &mut Binder<'_>) {
        for value in *self {
            value.bind_arg(binder);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_kinds_follow_width() {
        assert_eq!(7_i32.kind(), ColumnKind::NarrowInteger);
        assert_eq!(true.kind(), ColumnKind::NarrowInteger);
        assert_eq!(7_u32.kind(), ColumnKind::WideInteger);
        assert_eq!(7_i64.kind(), ColumnKind::WideInteger);
        assert_eq!("x".kind(), ColumnKind::Text);
        assert_eq!(String::from("x").kind(), ColumnKind::Text);
        assert_eq!(Some(7_i64).kind(), ColumnKind::WideInteger);
        assert_eq!(7_u64.kind(), ColumnKind::WideInteger);
        assert_eq!(7_usize.kind(), ColumnKind::WideInteger);
    }
}
