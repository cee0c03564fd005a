use std::sync::{Arc, Mutex};

use sqlite_service::{
    ColumnReader, Connection, EventLoop, FromColumn, Record, SqliteServiceError, Statement,
    StatementState, named,
};

fn open_memory(event_loop: &EventLoop) -> Result<Connection, SqliteServiceError> {
    let conn = Connection::new(&event_loop.handle())?;
    conn.open(":memory:")?;
    Ok(conn)
}

#[test]
fn bound_parameters_flow_into_typed_record() -> Result<(), SqliteServiceError> {
    let event_loop = EventLoop::new()?;
    let conn = open_memory(&event_loop)?;

    let mut statement = conn.prepare("SELECT ? + 1, 'hello ' || ?");
    assert_eq!(statement.state(), StatementState::Ready);
    statement.bind_params((41, "world"));

    let mut record = (0_i32, String::new());
    assert!(statement.fetch(&mut record)?);
    assert_eq!(record, (42, "hello world".to_string()));
    assert_eq!(statement.state(), StatementState::RowAvailable);

    assert!(!statement.fetch(&mut record)?);
    assert_eq!(statement.state(), StatementState::Done);
    // No automatic restart after completion.
    assert!(!statement.fetch(&mut record)?);
    assert_eq!(record, (42, "hello world".to_string()));
    assert_eq!(statement.last_error(), "");
    assert!(statement.error().is_none());
    Ok(())
}

#[test]
fn null_text_reads_as_default() -> Result<(), SqliteServiceError> {
    let event_loop = EventLoop::new()?;
    let conn = open_memory(&event_loop)?;

    let mut statement = conn.prepare("SELECT 1, 2, 3, 'hello world', NULL");
    let mut record = (0_i32, 0_i32, 0_i32, String::new(), String::from("stale"));
    assert!(statement.fetch(&mut record)?);
    assert_eq!(
        record,
        (1, 2, 3, "hello world".to_string(), String::new())
    );
    assert_eq!(statement.column_count(), 5);

    statement.reset();
    let optional: Option<(i64, i64, i64, Option<String>, Option<String>)> =
        statement.next_record()?;
    assert_eq!(
        optional,
        Some((1, 2, 3, Some("hello world".to_string()), None))
    );
    Ok(())
}

#[test]
fn failed_prepare_carries_engine_diagnostic() -> Result<(), SqliteServiceError> {
    let event_loop = EventLoop::new()?;
    let conn = open_memory(&event_loop)?;

    let mut statement = conn.prepare("I dont know what I am doing");
    assert_eq!(statement.state(), StatementState::Failed);
    assert!(statement.is_failed());
    assert_eq!(statement.last_error(), "near \"I\": syntax error");

    let stored = statement.error().cloned().expect("failed statement keeps its error");
    assert!(matches!(stored, SqliteServiceError::PrepareError { .. }));
    assert_eq!(stored.to_string(), statement.last_error());

    // Binding is ignored and stepping reports the stored error.
    statement.bind_params((1,));
    let mut record = (0_i32,);
    assert_eq!(statement.fetch(&mut record).unwrap_err(), stored);
    assert_eq!(statement.step().unwrap_err(), stored);
    Ok(())
}

#[test]
fn prepare_before_open_yields_failed_statement() -> Result<(), SqliteServiceError> {
    let event_loop = EventLoop::new()?;
    let conn = Connection::new(&event_loop.handle())?;

    let statement = conn.prepare("SELECT 1");
    assert!(statement.is_failed());
    assert_eq!(statement.error(), Some(&SqliteServiceError::NotOpen));
    assert_eq!(statement.sql(), "SELECT 1");
    Ok(())
}

#[test]
fn named_parameters_resolve_their_ordinals() -> Result<(), SqliteServiceError> {
    let event_loop = EventLoop::new()?;
    let conn = open_memory(&event_loop)?;

    let mut statement = conn.prepare("SELECT :factor * 2, :label");
    statement.bind_params((named(":label", "twice"), named(":factor", 21_i64)));
    let record: Option<(i64, String)> = statement.next_record()?;
    assert_eq!(record, Some((42, "twice".to_string())));
    Ok(())
}

#[test]
#[should_panic(expected = "SQLite misuse")]
fn unknown_named_parameter_panics() {
    let event_loop = EventLoop::new().unwrap();
    let conn = open_memory(&event_loop).unwrap();
    let mut statement = conn.prepare("SELECT :known");
    statement.bind_params((named(":unknown", 1),));
}

#[test]
fn wide_integers_round_trip() -> Result<(), SqliteServiceError> {
    let event_loop = EventLoop::new()?;
    let conn = open_memory(&event_loop)?;

    let mut statement = conn.prepare("SELECT ?, ?, ?");
    statement.bind_params((u32::MAX, i64::MIN, -7_i16));
    let record: Option<(u32, i64, i16)> = statement.next_record()?;
    assert_eq!(record, Some((u32::MAX, i64::MIN, -7)));

    statement.reset();
    let as_signed: Option<(i64,)> = statement.next_record()?;
    assert_eq!(as_signed, Some((4_294_967_295,)));
    Ok(())
}

#[test]
fn eight_byte_unsigned_integers_keep_their_bits() -> Result<(), SqliteServiceError> {
    let event_loop = EventLoop::new()?;
    let conn = open_memory(&event_loop)?;

    let mut statement = conn.prepare("SELECT ?, ?, ?");
    statement.bind_params((u64::MAX, usize::MAX, 7_u64));
    let record: Option<(u64, usize, u64)> = statement.next_record()?;
    assert_eq!(record, Some((u64::MAX, usize::MAX, 7)));

    // Stored as the two's complement i64.
    statement.reset();
    let (stored, _, small) = statement
        .next_record::<(i64, i64, i64)>()?
        .expect("one row");
    assert_eq!((stored, small), (-1, 7));
    Ok(())
}

#[test]
fn optional_and_bool_parameters() -> Result<(), SqliteServiceError> {
    let event_loop = EventLoop::new()?;
    let conn = open_memory(&event_loop)?;

    let mut statement = conn.prepare("SELECT ? IS NULL, ?, ?");
    statement.bind_params((None::<i32>, Some("present"), true));
    let record: Option<(bool, Option<String>, bool)> = statement.next_record()?;
    assert_eq!(record, Some((true, Some("present".to_string()), true)));
    Ok(())
}

#[test]
fn reset_keeps_bindings_and_restarts_iteration() -> Result<(), SqliteServiceError> {
    let event_loop = EventLoop::new()?;
    let conn = open_memory(&event_loop)?;
    conn.exec(
        "CREATE TABLE nums (n INTEGER);
         INSERT INTO nums VALUES (1), (2), (3), (4);",
    )?;

    let mut statement = conn.prepare("SELECT n FROM nums WHERE n > ? ORDER BY n");
    statement.bind_params(vec![2_i32]);

    let mut first = Vec::new();
    while let Some((n,)) = statement.next_record::<(i32,)>()? {
        first.push(n);
    }
    statement.reset();
    let mut second = Vec::new();
    while let Some((n,)) = statement.next_record::<(i32,)>()? {
        second.push(n);
    }
    assert_eq!(first, vec![3, 4]);
    assert_eq!(first, second);

    statement.reset();
    statement.bind_params(&[0_i32][..]);
    let row = statement.next_row()?.expect("first row");
    assert_eq!(row.get("n").and_then(|v| v.as_int()), Some(1));
    Ok(())
}

#[test]
fn step_failure_is_reported_once() -> Result<(), SqliteServiceError> {
    let event_loop = EventLoop::new()?;
    let conn = open_memory(&event_loop)?;

    let mut statement = conn.prepare("SELECT abs(-9223372036854775808)");
    assert!(!statement.is_failed());
    let err = statement.next_record::<(i64,)>().unwrap_err();
    assert!(matches!(err, SqliteServiceError::StepError(_)));
    assert!(statement.last_error().contains("integer overflow"));
    assert_eq!(statement.next_record::<(i64,)>()?, None);
    Ok(())
}

#[test]
fn reset_clears_a_step_failure() -> Result<(), SqliteServiceError> {
    let event_loop = EventLoop::new()?;
    let conn = open_memory(&event_loop)?;

    let mut statement = conn.prepare("SELECT abs(?)");
    statement.bind_params((i64::MIN,));
    let err = statement.next_record::<(i64,)>().unwrap_err();
    assert!(matches!(err, SqliteServiceError::StepError(_)));
    assert_eq!(statement.error(), Some(&err));
    assert!(statement.last_error().contains("integer overflow"));

    statement.reset();
    assert_eq!(statement.state(), StatementState::Ready);
    assert!(statement.error().is_none());
    assert_eq!(statement.last_error(), "");

    statement.bind_params((-5_i64,));
    assert_eq!(statement.next_record::<(i64,)>()?, Some((5,)));
    assert!(statement.error().is_none());
    assert_eq!(statement.last_error(), "");
    Ok(())
}

#[test]
fn reset_keeps_a_failed_prepare_failed() -> Result<(), SqliteServiceError> {
    let event_loop = EventLoop::new()?;
    let conn = open_memory(&event_loop)?;

    let mut statement = conn.prepare("SELECT FROM WHERE");
    statement.reset();
    assert!(statement.is_failed());
    assert!(matches!(
        statement.error(),
        Some(SqliteServiceError::PrepareError { .. })
    ));
    assert!(!statement.last_error().is_empty());
    Ok(())
}

#[derive(Debug, Default, PartialEq)]
struct Entry {
    id: i64,
    name: String,
}

impl Record for Entry {
    fn assign_columns(&mut self, reader: &ColumnReader<'_>) {
        self.id = i64::from_column(reader, 0);
        self.name = String::from_column(reader, 1);
    }
}

#[test]
fn struct_records_assign_by_column() -> Result<(), SqliteServiceError> {
    let event_loop = EventLoop::new()?;
    let conn = open_memory(&event_loop)?;
    conn.exec("CREATE TABLE entries (id INTEGER, name TEXT); INSERT INTO entries VALUES (9, 'nine');")?;

    let mut statement = conn.prepare("SELECT id, name FROM entries");
    assert_eq!(statement.column_names(), ["id", "name"]);
    let entry: Option<Entry> = statement.next_record()?;
    assert_eq!(
        entry,
        Some(Entry {
            id: 9,
            name: "nine".into()
        })
    );
    Ok(())
}

#[test]
fn async_prepare_then_stream_records() -> Result<(), SqliteServiceError> {
    let mut event_loop = EventLoop::new()?;
    let conn = open_memory(&event_loop)?;
    conn.exec(
        "CREATE TABLE entries (id INTEGER, name TEXT);
         INSERT INTO entries VALUES (1, 'one'), (2, 'two'), (3, 'three');",
    )?;

    let prepared: Arc<Mutex<Option<Statement>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&prepared);
    conn.async_prepare("SELECT id, name FROM entries WHERE id >= ? ORDER BY id", move |stmt| {
        *slot.lock().unwrap() = Some(stmt);
    });
    assert_eq!(event_loop.run(), 1);

    let mut statement = prepared.lock().unwrap().take().expect("statement delivered");
    statement.bind_params((2,));

    let records = Arc::new(Mutex::new(Vec::new()));
    let terminal = Arc::new(Mutex::new(None));
    let (records_sink, terminal_sink) = (Arc::clone(&records), Arc::clone(&terminal));
    conn.async_fetch_into(statement, move |err, entry: Entry| {
        if err.is_some() || entry == Entry::default() {
            *terminal_sink.lock().unwrap() = Some(err);
        } else {
            records_sink.lock().unwrap().push(entry);
        }
    });
    assert_eq!(event_loop.run(), 3);

    let records = records.lock().unwrap();
    assert_eq!(
        records.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
        vec!["two", "three"]
    );
    assert_eq!(*terminal.lock().unwrap(), Some(None));
    Ok(())
}

#[test]
fn async_fetch_into_failed_statement_only_terminates() -> Result<(), SqliteServiceError> {
    let mut event_loop = EventLoop::new()?;
    let conn = open_memory(&event_loop)?;

    let statement = conn.prepare("SELECT FROM WHERE");
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    conn.async_fetch_into(statement, move |err, record: (i32,)| {
        sink.lock().unwrap().push((err, record));
    });
    assert_eq!(event_loop.run(), 1);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(matches!(
        calls[0].0,
        Some(SqliteServiceError::PrepareError { .. })
    ));
    assert_eq!(calls[0].1, (0,));
    Ok(())
}
