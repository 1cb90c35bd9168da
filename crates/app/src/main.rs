use std::fmt;
use std::io::Read;

use progress_core::model::{LearnerId, Statement};
use serde_json::{Value, json};
use services::{
    AppServices, Clock, IngestService, ProgressOutcome, ServicesConfig, StatementQuery,
};
use storage::repository::StatementRecord;
use tracing_subscriber::EnvFilter;

const DEFAULT_DB_URL: &str = "sqlite://progress.sqlite3";

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingLearner,
    UnknownArg(String),
    InvalidLimit { raw: String },
    InvalidLearner { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingLearner => write!(f, "progress requires a learner id"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidLimit { raw } => write!(f, "invalid --limit value: {raw}"),
            ArgsError::InvalidLearner { raw } => write!(f, "invalid learner id: {raw:?}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

/// Some items of an ingest batch were not stored. Their acks carry the reason.
#[derive(Debug)]
struct BatchError {
    failed: usize,
    total: usize,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} statements were not stored", self.failed, self.total)
    }
}

impl std::error::Error for BatchError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_learner(raw: String) -> Result<LearnerId, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidLearner { raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app ingest     [--db <sqlite_url>] [--file <path>]   # JSON object or array; stdin when no --file");
    eprintln!("  app progress   <learner_id> [--db <sqlite_url>]");
    eprintln!("  app statements [--db <sqlite_url>] [--learner <id>] [--limit <1..=500>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db {DEFAULT_DB_URL}");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PROGRESS_DB_URL, PROGRESS_WRITE_TIMEOUT_MS, RUST_LOG");
}

#[derive(Debug)]
enum Command {
    Ingest { file: Option<String> },
    Progress { learner_id: LearnerId },
    Statements(StatementQuery),
}

struct Args {
    db_url: String,
    command: Command,
}

impl Args {
    fn parse(mut argv: impl Iterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let Some(sub) = argv.next() else {
            return Ok(None);
        };

        let mut db_url = std::env::var("PROGRESS_DB_URL")
            .ok()
            .map_or_else(|| DEFAULT_DB_URL.into(), normalize_sqlite_url);
        let mut file = None;
        let mut learner = None;
        let mut limit = None;
        let mut positional = Vec::new();

        while let Some(arg) = argv.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut argv, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--file" => file = Some(require_value(&mut argv, "--file")?),
                "--learner" => {
                    learner = Some(parse_learner(require_value(&mut argv, "--learner")?)?);
                }
                "--limit" => {
                    let value = require_value(&mut argv, "--limit")?;
                    let parsed: u32 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidLimit { raw: value.clone() })?;
                    limit = Some(parsed);
                }
                "--help" | "-h" => return Ok(None),
                other if other.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let command = match sub.as_str() {
            "ingest" => Command::Ingest { file },
            "progress" => {
                let raw = positional.pop().ok_or(ArgsError::MissingLearner)?;
                Command::Progress {
                    learner_id: parse_learner(raw)?,
                }
            }
            "statements" => Command::Statements(StatementQuery {
                learner_id: learner,
                limit,
            }),
            "--help" | "-h" => return Ok(None),
            _ => return Err(ArgsError::UnknownArg(sub)),
        };

        Ok(Some(Self { db_url, command }))
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// Accepts either one statement object or an array of them.
fn read_statements(file: Option<&str>) -> Result<Vec<Value>, Box<dyn std::error::Error>> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let value: Value = serde_json::from_str(&raw)?;
    Ok(match value {
        Value::Array(items) => items,
        single => vec![single],
    })
}

fn outcome_json(outcome: &ProgressOutcome) -> Value {
    match outcome {
        ProgressOutcome::Updated(record) => json!({ "updated": record }),
        ProgressOutcome::Skipped(reason) => json!({ "skipped": reason }),
        ProgressOutcome::Failed(err) => json!({ "failed": err.to_string() }),
    }
}

/// Ingest every item, one ack per item in input order. A bad item gets an
/// `error` ack and does not stop the rest of the batch.
async fn ingest_batch(ingest: &IngestService, items: Vec<Value>) -> (Vec<Value>, usize) {
    let mut acks = Vec::with_capacity(items.len());
    let mut failed = 0;
    for (index, raw) in items.into_iter().enumerate() {
        let stored = match Statement::from_value(raw) {
            Ok(statement) => ingest.ingest(statement).await.map_err(|e| e.to_string()),
            Err(err) => Err(err.to_string()),
        };
        match stored {
            Ok(receipt) => acks.push(json!({
                "index": index,
                "id": receipt.statement_id,
                "progress": outcome_json(&receipt.progress),
            })),
            Err(error) => {
                tracing::warn!(index, %error, "statement rejected");
                failed += 1;
                acks.push(json!({ "index": index, "error": error }));
            }
        }
    }
    (acks, failed)
}

fn statement_json(record: &StatementRecord) -> Value {
    json!({
        "id": record.id,
        "learner_id": record.learner_id,
        "course_id": record.course_id,
        "received_at": record.received_at,
        "statement": record.statement,
    })
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let parsed = Args::parse(std::env::args().skip(1)).inspect_err(|_| print_usage())?;
    let Some(args) = parsed else {
        print_usage();
        return Ok(());
    };

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&args.db_url)?;
    let services =
        AppServices::new_sqlite(&args.db_url, Clock::system(), ServicesConfig::from_env()).await?;

    match args.command {
        Command::Ingest { file } => {
            let items = read_statements(file.as_deref())?;
            let (acks, failed) = ingest_batch(&services.ingest(), items).await;
            tracing::info!(count = acks.len() - failed, failed, "statements ingested");
            println!("{}", serde_json::to_string_pretty(&acks)?);
            if failed > 0 {
                return Err(BatchError {
                    failed,
                    total: acks.len(),
                }
                .into());
            }
        }
        Command::Progress { learner_id } => {
            let view = services.progress().progress_for(&learner_id).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Statements(query) => {
            let records = services.statements().list(&query).await?;
            let out: Vec<Value> = records.iter().map(statement_json).collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
