//! Run blocking SQLite calls on a per-connection worker thread and deliver the results to a
//! single-threaded [`EventLoop`].
//!
//! ```rust,no_run
//! use sqlite_service::{Connection, EventLoop, RowValue};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut event_loop = EventLoop::new()?;
//! let conn = Connection::new(&event_loop.handle())?;
//! conn.open(":memory:")?;
//!
//! conn.async_fetch("SELECT 1 UNION SELECT 2", |err, row| {
//!     if let Some(err) = err {
//!         eprintln!("fetch failed: {err}");
//!     } else if let Some(RowValue::Int(n)) = row.get_by_index(0) {
//!         println!("row {n}");
//!     }
//! });
//! event_loop.run();
//!
//! let mut statement = conn.prepare("SELECT ? + 1, 'hello ' || ?");
//! statement.bind_params((41, "world"));
//! let mut record = (0_i32, String::new());
//! while statement.fetch(&mut record)? {
//!     assert_eq!(record, (42, "hello world".to_string()));
//! }
//! # Ok(())
//! # }
//! ```

mod error;
pub mod event_loop;
mod results;
pub mod sqlite;
mod types;

pub use error::{ErrorCode, SqliteServiceError};
pub use event_loop::{EventLoop, LifetimeGuard, LoopHandle};
pub use results::Row;
pub use sqlite::{
    BindArg, Binder, ColumnReader, Connection, ConnectionOptions, ConnectionOptionsBuilder,
    ErrorDomain, FromColumn, Named, OpenFlags, Params, Record, Statement, StatementState, Step,
    ToParam, error_domain, fallback_message, named,
};
pub use types::{ColumnKind, RowValue};
