use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use sqlite_service::{Connection, EventLoop, Row, RowValue, SqliteServiceError};

type Deliveries = Arc<Mutex<Vec<(Option<SqliteServiceError>, Row, ThreadId)>>>;

fn recorder() -> (Deliveries, impl FnMut(Option<SqliteServiceError>, Row) + Send + 'static) {
    let deliveries: Deliveries = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&deliveries);
    let handler = move |err: Option<SqliteServiceError>, row: Row| {
        sink.lock()
            .unwrap()
            .push((err, row, thread::current().id()));
    };
    (deliveries, handler)
}

fn first_int(row: &Row) -> Option<i64> {
    row.get_by_index(0).and_then(RowValue::as_int)
}

#[test]
fn async_fetch_delivers_rows_then_terminal_on_loop_thread() -> Result<(), SqliteServiceError> {
    let mut event_loop = EventLoop::new()?;
    let conn = Connection::new(&event_loop.handle())?;
    conn.open(":memory:")?;

    let (deliveries, handler) = recorder();
    conn.async_fetch("SELECT 1 UNION SELECT 2 UNION SELECT 3", handler);
    assert_eq!(event_loop.run(), 4);

    let deliveries = deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 4);
    let values: Vec<_> = deliveries[..3]
        .iter()
        .map(|(err, row, _)| {
            assert!(err.is_none());
            first_int(row)
        })
        .collect();
    assert_eq!(values, vec![Some(1), Some(2), Some(3)]);

    let (terminal_err, terminal_row, _) = &deliveries[3];
    assert!(terminal_err.is_none());
    assert!(terminal_row.is_empty());

    let test_thread = thread::current().id();
    assert!(deliveries.iter().all(|(_, _, id)| *id == test_thread));
    Ok(())
}

#[test]
fn sync_fetch_calls_handler_on_caller_thread() -> Result<(), SqliteServiceError> {
    let event_loop = EventLoop::new()?;
    let conn = Connection::new(&event_loop.handle())?;
    conn.open(":memory:")?;
    conn.exec(
        "CREATE TABLE people (id INTEGER, name TEXT, score REAL, avatar BLOB);
         INSERT INTO people VALUES (1, 'ann', 1.5, x'0102'), (2, 'bob', NULL, NULL);",
    )?;

    let mut rows = Vec::new();
    let mut terminal = None;
    conn.fetch("SELECT id, name, score, avatar FROM people ORDER BY id", |err, row| {
        if row.is_empty() {
            terminal = Some(err);
        } else {
            assert!(err.is_none());
            rows.push(row);
        }
    });

    assert_eq!(terminal, Some(None));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].column_names(), ["id", "name", "score", "avatar"]);
    assert_eq!(rows[0].get("name"), Some(&RowValue::Text("ann".into())));
    assert_eq!(rows[0].get("score"), Some(&RowValue::Float(1.5)));
    assert_eq!(rows[0].get("avatar"), Some(&RowValue::Blob(vec![1, 2])));
    assert_eq!(rows[1].get("id"), Some(&RowValue::Int(2)));
    assert!(rows[1].get("score").is_some_and(RowValue::is_null));
    Ok(())
}

#[test]
fn fetch_with_invalid_sql_reports_prepare_error_once() -> Result<(), SqliteServiceError> {
    let mut event_loop = EventLoop::new()?;
    let conn = Connection::new(&event_loop.handle())?;
    conn.open(":memory:")?;

    let (deliveries, handler) = recorder();
    conn.async_fetch("SELEC nothing", handler);
    assert_eq!(event_loop.run(), 1);

    let deliveries = deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 1);
    let (err, row, _) = &deliveries[0];
    match err {
        Some(SqliteServiceError::PrepareError { message, .. }) => {
            assert!(message.contains("syntax error"), "unexpected diagnostic: {message}");
        }
        other => panic!("expected a prepare error, got {other:?}"),
    }
    assert!(row.is_empty());
    Ok(())
}

#[test]
fn fetch_before_open_terminates_with_not_open() -> Result<(), SqliteServiceError> {
    let mut event_loop = EventLoop::new()?;
    let conn = Connection::new(&event_loop.handle())?;

    let (deliveries, handler) = recorder();
    conn.async_fetch("SELECT 1", handler);
    event_loop.run();

    let deliveries = deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].0, Some(SqliteServiceError::NotOpen));
    Ok(())
}

#[test]
fn fetch_of_statement_without_rows_only_terminates() -> Result<(), SqliteServiceError> {
    let mut event_loop = EventLoop::new()?;
    let conn = Connection::new(&event_loop.handle())?;
    conn.open(":memory:")?;

    let (deliveries, handler) = recorder();
    conn.async_fetch("CREATE TABLE t (x INTEGER)", handler);
    assert_eq!(event_loop.run(), 1);
    assert!(deliveries.lock().unwrap()[0].0.is_none());

    let mut count = 0;
    conn.fetch("SELECT x FROM t", |err, row| {
        assert!(err.is_none());
        assert!(row.is_empty());
        count += 1;
    });
    assert_eq!(count, 1);
    Ok(())
}
