use std::fmt::Write as _;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, ValueEnum};
use sqlite_service::{
    Connection, ConnectionOptions, EventLoop, Row, RowValue, SqliteServiceError,
};
use tracing::{Level, debug, error};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run SQL statements through a worker-backed SQLite connection"
)]
struct Args {
    /// Database path, `:memory:`, or a `file:` URI.
    #[arg(long, short, default_value = ":memory:")]
    database: String,
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
    #[arg(long)]
    read_only: bool,
    #[arg(long)]
    uri: bool,
    #[arg(short, long)]
    verbose: bool,
    /// Statements to run in order; only the first statement of each argument is executed.
    #[arg(required = true)]
    statements: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::WARN
        })
        .init();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(%err, "sqlite-service failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<bool, SqliteServiceError> {
    let mut event_loop = EventLoop::new()?;
    let options = ConnectionOptions::builder()
        .thread_name("sqlite-service-worker")
        .read_only(args.read_only)
        .uri(args.uri)
        .build()?;
    let conn = Connection::with_options(&event_loop.handle(), options)?;
    let succeeded = Arc::new(AtomicBool::new(true));

    let open_status = Arc::clone(&succeeded);
    let database = args.database.clone();
    conn.async_open(args.database.clone(), move |err| {
        if let Some(err) = err {
            eprintln!("cannot open {database}: {err}");
            open_status.store(false, Ordering::Relaxed);
        }
    });

    for sql in &args.statements {
        let status = Arc::clone(&succeeded);
        let format = args.format;
        let label = sql.clone();
        conn.async_fetch(sql.clone(), move |err, row| {
            if let Some(err) = err {
                eprintln!("{label}: {err}");
                status.store(false, Ordering::Relaxed);
            } else if !row.is_empty() {
                print_row(format, &row);
            }
        });
    }

    let executed = event_loop.run();
    debug!(executed, "event loop drained");
    Ok(succeeded.load(Ordering::Relaxed))
}

fn print_row(format: OutputFormat, row: &Row) {
    match format {
        OutputFormat::Text => {
            let line = row
                .values()
                .iter()
                .map(render_value)
                .collect::<Vec<_>>()
                .join("|");
            println!("{line}");
        }
        OutputFormat::Json => match serde_json::to_string(row) {
            Ok(json) => println!("{json}"),
            Err(err) => eprintln!("cannot encode row as JSON: {err}"),
        },
    }
}

fn render_value(value: &RowValue) -> String {
    match value {
        RowValue::Int(n) => n.to_string(),
        RowValue::Float(f) => f.to_string(),
        RowValue::Text(s) => s.clone(),
        RowValue::Blob(bytes) => {
            let mut hex = String::with_capacity(bytes.len() * 2 + 3);
            hex.push_str("x'");
            for byte in bytes {
                let _ = write!(hex, "{byte:02x}");
            }
            hex.push('\'');
            hex
        }
        RowValue::Null => String::new(),
    }
}
