//! Purpose: `hookmux` CLI for locating and inspecting published diff records.
//! Role: Binary crate root; parses args, reads record directories, emits JSON on stdout.
//! Invariants: `list` emits one JSON object per record, ordered by sequence number.
//! Invariants: Errors are emitted as JSON on stderr; exit code comes from `to_exit_code`.
//! Invariants: Never writes to a record directory.
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;

use hookmux::core::diff::{self, DecodedRecord};
use hookmux::core::error::{Error, ErrorKind, to_exit_code};

#[derive(Parser, Debug)]
#[command(
    name = "hookmux",
    version,
    about = "Inspect class transformation records published by the hookmux agent"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Print the public and staging record directories for a JVM process")]
    Path {
        #[arg(long, help = "JVM process id (default: this process)")]
        pid: Option<u32>,
        #[arg(long, help = "Base directory (default: system temp dir)", value_hint = ValueHint::DirPath)]
        base: Option<PathBuf>,
    },
    #[command(about = "List records in a directory as JSON lines")]
    List {
        #[arg(value_hint = ValueHint::DirPath)]
        dir: PathBuf,
    },
    #[command(about = "Write one payload of a record to stdout")]
    Show {
        #[arg(value_hint = ValueHint::DirPath)]
        dir: PathBuf,
        seq: u64,
        #[arg(long, value_enum, default_value = "transformed")]
        side: Side,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Side {
    Original,
    Transformed,
}

#[derive(Serialize)]
struct RecordSummary<'a> {
    seq: Option<u64>,
    plugin: &'a str,
    subject: &'a str,
    old_len: usize,
    new_len: usize,
    changed: bool,
    old_sha256: String,
    new_sha256: String,
}

impl<'a> RecordSummary<'a> {
    fn of(record: &'a DecodedRecord) -> Self {
        Self {
            seq: record.seq,
            plugin: &record.plugin,
            subject: &record.subject,
            old_len: record.original.len(),
            new_len: record.transformed.len(),
            changed: record.changed(),
            old_sha256: sha256_hex(&record.original),
            new_sha256: sha256_hex(&record.transformed),
        }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let code = if err.kind() == ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand {
                    2
                } else {
                    0
                };
                return Ok(code);
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage).with_message(clap_error_summary(&err)));
            }
        },
    };

    match cli.command {
        Command::Path { pid, base } => {
            let pid = pid.unwrap_or_else(std::process::id);
            let base = base.unwrap_or_else(std::env::temp_dir);
            let (public, staging) = diff::dir_names(&base, pid);
            emit_json(&json!({
                "pid": pid,
                "public": public.display().to_string(),
                "staging": staging.display().to_string(),
            }))?;
        }
        Command::List { dir } => {
            let records = diff::read_dir(&dir)?;
            tracing::debug!(count = records.len(), dir = %dir.display(), "read records");
            for record in &records {
                emit_json(&RecordSummary::of(record))?;
            }
        }
        Command::Show { dir, seq, side } => {
            let path = dir.join(seq.to_string());
            let bytes = fs::read(&path).map_err(|err| {
                let kind = if err.kind() == io::ErrorKind::NotFound {
                    ErrorKind::NotFound
                } else {
                    ErrorKind::Io
                };
                Error::new(kind)
                    .with_message("failed to read record")
                    .with_path(&path)
                    .with_seq(seq)
                    .with_source(err)
            })?;
            let record = diff::decode(&bytes).map_err(|err| err.with_path(&path).with_seq(seq))?;
            let payload = match side {
                Side::Original => &record.original,
                Side::Transformed => &record.transformed,
            };
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(payload)
                .and_then(|()| stdout.flush())
                .map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write payload")
                        .with_source(err)
                })?;
        }
    }
    Ok(0)
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn emit_json(value: &impl Serialize) -> Result<(), Error> {
    let line = serde_json::to_string(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("json encode failed")
            .with_source(err)
    })?;
    println!("{line}");
    Ok(())
}

fn clap_error_summary(err: &clap::Error) -> String {
    err.to_string()
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("error: ").to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn error_json(err: &Error) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    body.insert("kind".into(), json!(format!("{:?}", err.kind())));
    body.insert(
        "message".into(),
        json!(err.message().unwrap_or("unexpected error")),
    );
    if let Some(path) = err.path() {
        body.insert("path".into(), json!(path.display().to_string()));
    }
    if let Some(seq) = err.seq() {
        body.insert("seq".into(), json!(seq));
    }
    if let Some(source) = std::error::Error::source(err) {
        body.insert("cause".into(), json!(source.to_string()));
    }
    json!({ "error": body })
}

fn emit_error(err: &Error) {
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}
