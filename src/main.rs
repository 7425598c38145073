use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use ledgerline::api::{ApiState, serve};
use ledgerline::config::{
    ConfigError, DEFAULT_CONFIG_FILE, PipelineConfig, default_config_yaml, load_config,
};
use ledgerline::loader::load_batch;
use ledgerline::query::{QueryError, QueryParams, run_query};
use ledgerline::source::{FileSource, LocalDirSource};
use ledgerline::store::{StoreError, TransactionStore};
use ledgerline::tracker::{IngestionTracker, TrackerError};
use serde_json::{Value, json};
use tracing::Level;

#[derive(Debug)]
struct CliError {
    code: &'static str,
    message: String,
}

impl CliError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn io(code: &'static str, err: io::Error) -> Self {
        Self::new(code, err.to_string())
    }
}

impl From<StoreError> for CliError {
    fn from(value: StoreError) -> Self {
        Self::new("store_error", value.to_string())
    }
}

impl From<TrackerError> for CliError {
    fn from(value: TrackerError) -> Self {
        Self::new("tracker_error", value.to_string())
    }
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::new("config_error", value.to_string())
    }
}

impl From<QueryError> for CliError {
    fn from(value: QueryError) -> Self {
        let code = if value.is_client_error() {
            "invalid_argument"
        } else {
            "query_error"
        };
        Self::new(code, value.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::new("json_error", value.to_string())
    }
}

#[derive(Parser, Debug)]
#[command(name = "ledgerline")]
#[command(about = "File-drop transaction ingestion and query pipeline")]
struct Cli {
    /// Pipeline config file; defaults apply when it does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the data directory, store schema, and a default config file.
    Init,
    /// Scan the drop directory and load new transaction files into the store.
    Ingest(IngestArgs),
    /// Run a paginated query against the store and print the page as JSON.
    Query(QueryArgs),
    /// Serve the HTTP query API.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Override the configured drop directory.
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Reprocess files already marked consumed.
    #[arg(long)]
    full: bool,
}

#[derive(Args, Debug)]
struct QueryArgs {
    #[arg(long)]
    start_date: Option<String>,
    #[arg(long)]
    end_date: Option<String>,
    #[arg(long)]
    cursor: Option<String>,
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:8000")]
    addr: SocketAddr,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let payload = json!({
                "error": {
                    "code": err.code,
                    "message": err.message,
                }
            });
            eprintln!("{payload}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    let config = load_config(&cli.config)?;
    match cli.command {
        Command::Init => cmd_init(&cli.config, &config),
        Command::Ingest(args) => cmd_ingest(&config, args),
        Command::Query(args) => cmd_query(&config, args),
        Command::Serve(args) => cmd_serve(&config, args),
    }
}

fn init_tracing(level: &str) {
    let level = level.parse().unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

fn cmd_init(config_path: &Path, config: &PipelineConfig) -> Result<(), CliError> {
    fs::create_dir_all(&config.drop_dir).map_err(|err| CliError::io("mkdir_error", err))?;
    for state_path in [&config.db_path, &config.tracker_path] {
        if let Some(parent) = state_path.parent() {
            fs::create_dir_all(parent).map_err(|err| CliError::io("mkdir_error", err))?;
        }
    }
    let _ = TransactionStore::open(&config.db_path)?;
    if !config_path.exists() {
        fs::write(config_path, default_config_yaml())
            .map_err(|err| CliError::io("write_error", err))?;
    }

    print_json(&json!({
        "status": "ok",
        "config": config_path,
        "drop_dir": config.drop_dir,
        "db_path": config.db_path,
        "tracker_path": config.tracker_path,
    }))
}

fn cmd_ingest(config: &PipelineConfig, args: IngestArgs) -> Result<(), CliError> {
    let drop_dir = args.dir.as_ref().unwrap_or(&config.drop_dir);
    let source = LocalDirSource::new(drop_dir, &config.extensions, &config.exclude)
        .map_err(|err| CliError::new("exclude_glob_error", err.to_string()))?;
    let file_ids = source
        .list()
        .map_err(|err| CliError::io("list_error", err))?;
    let mut tracker = IngestionTracker::load(&config.tracker_path)?;

    let outcome = load_batch(&source, &mut tracker, &file_ids, !args.full);

    let store = TransactionStore::open(&config.db_path)?;
    let records_stored = store.insert_new(&outcome.records)?;
    let store_total = store.count()?;

    let mut summary = serde_json::to_value(&outcome)?;
    if let Value::Object(map) = &mut summary {
        map.insert("status".to_string(), json!("ok"));
        map.insert("records_staged".to_string(), json!(outcome.records.len()));
        map.insert("records_stored".to_string(), json!(records_stored));
        map.insert("store_total".to_string(), json!(store_total));
    }
    print_json(&summary)
}

fn cmd_query(config: &PipelineConfig, args: QueryArgs) -> Result<(), CliError> {
    let store = TransactionStore::open(&config.db_path)?;
    let params = QueryParams {
        start_date: args.start_date,
        end_date: args.end_date,
        cursor: args.cursor,
        limit: args.limit,
    };
    let page = run_query(&store, &params)?;
    print_json(&serde_json::to_value(&page)?)
}

fn cmd_serve(config: &PipelineConfig, args: ServeArgs) -> Result<(), CliError> {
    // Ensure the schema exists before accepting queries.
    let _ = TransactionStore::open(&config.db_path)?;
    let state = ApiState {
        db_path: config.db_path.clone(),
    };
    serve(args.addr, state).map_err(|err| CliError::io("serve_error", err))
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string(value)?;
    println!("{rendered}");
    Ok(())
}
