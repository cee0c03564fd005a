// SQLite module - runs the engine behind a per-connection worker thread
//
// - ffi: owned database/statement handles over `rusqlite::ffi`
// - error_domain: status code to message lookup
// - config: connection options and open flags
// - params / query: typed parameter binding and column extraction
// - prepared: the `Statement` state machine
// - worker: command channel, dispatcher and thread management
// - connection: the public `Connection` API

pub mod config;
pub mod connection;
pub mod error_domain;
pub(crate) mod ffi;
pub mod params;
pub mod prepared;
pub mod query;
pub(crate) mod worker;

pub use config::{ConnectionOptions, ConnectionOptionsBuilder, OpenFlags};
pub use connection::Connection;
pub use error_domain::{ErrorDomain, error_domain, fallback_message};
pub use params::{BindArg, Binder, Named, Params, ToParam, named};
pub use prepared::{Statement, StatementState, Step};
pub use query::{ColumnReader, FromColumn, Record};
