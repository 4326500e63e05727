mod registry;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{ArgAction, Args, Parser, Subcommand};
use querysafe_core::{
    CATALOG_VERSION, Dialect, Error as CoreError, RedactedConnection, SchemaCatalog,
    redact_connection_string, validate_catalog,
};
use querysafe_engine::{ConfigError, EngineConfig, ValidationVerdict, Validator};
use querysafe_introspect::{IntrospectOptions, PostgresExecutor, introspect};
use registry::{
    RunContext, RunOptions, init_run_logging, start_run, write_catalog, write_json_atomic,
    write_verdict,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use uuid::Uuid;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "querysafe.toml";

/// Exit status for a rejected statement.
const REJECTED_EXIT: u8 = 2;

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unsupported engine: {0}")]
    UnsupportedEngine(String),
}

#[derive(Parser, Debug)]
#[command(name = "querysafe", version, about = "Validate generated SQL before it runs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Snapshot a live database into a catalog file.
    Introspect(IntrospectArgs),
    /// Validate a generated statement against a catalog and a live dry run.
    Check(CheckArgs),
    /// Print the JSON Schema of the catalog file format.
    CatalogSchema(CatalogSchemaArgs),
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Database connection string (flag form).
    #[arg(long, value_name = "CONNECTION_STRING", conflicts_with = "conn_pos")]
    conn: Option<String>,
    /// Database connection string (positional form).
    #[arg(value_name = "CONNECTION_STRING", required_unless_present = "conn")]
    conn_pos: Option<String>,
}

impl ConnectionArgs {
    fn into_conn(self) -> Result<String, CliError> {
        match (self.conn, self.conn_pos) {
            (Some(value), None) | (None, Some(value)) => Ok(value),
            (Some(_), Some(_)) => Err(CliError::InvalidConfig(
                "use either --conn or positional connection string".to_string(),
            )),
            (None, None) => Err(CliError::InvalidConfig(
                "connection string is required".to_string(),
            )),
        }
    }
}

#[derive(Args, Debug)]
struct ScopeArgs {
    /// Schema name(s) to include.
    #[arg(long, value_name = "SCHEMA")]
    schema: Vec<String>,
    /// Include system schemas such as pg_catalog.
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    include_system_schemas: bool,
    /// Include views.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    include_views: bool,
    /// Include materialized views.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    include_materialized_views: bool,
    /// Include foreign tables.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    include_foreign_tables: bool,
}

impl ScopeArgs {
    fn options(&self) -> IntrospectOptions {
        IntrospectOptions {
            include_system_schemas: self.include_system_schemas,
            include_views: self.include_views,
            include_materialized_views: self.include_materialized_views,
            include_foreign_tables: self.include_foreign_tables,
            schemas: if self.schema.is_empty() {
                None
            } else {
                Some(self.schema.clone())
            },
        }
    }
}

#[derive(Args, Debug)]
struct IntrospectArgs {
    #[command(flatten)]
    connection: ConnectionArgs,
    #[command(flatten)]
    scope: ScopeArgs,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
    /// Optional output path for catalog.json.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CheckArgs {
    #[command(flatten)]
    connection: ConnectionArgs,
    #[command(flatten)]
    scope: ScopeArgs,
    /// Catalog file to validate against; the database is introspected when absent.
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// File holding the generated text, or `-` for stdin.
    #[arg(long, default_value = "-")]
    input: String,
    /// Natural-language question the statement answers.
    #[arg(long)]
    question: Option<String>,
    /// Engine config in TOML.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
}

#[derive(Args, Debug)]
struct CatalogSchemaArgs {
    /// Write the schema here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Introspect(args) => run_introspect(args).await,
        Command::Check(args) => run_check(args).await,
        Command::CatalogSchema(args) => run_catalog_schema(args),
    }
}

async fn run_introspect(args: IntrospectArgs) -> Result<ExitCode, CliError> {
    let IntrospectArgs {
        connection,
        scope,
        run_dir,
        out,
    } = args;

    let conn = connection.into_conn()?;
    let redacted = redact_connection_string(&conn);
    let engine = detect_engine(&conn, &redacted)?;
    let options = scope.options();

    let run_id = Uuid::new_v4().to_string();
    let run_ctx = RunContext {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now(),
        command: "introspect",
        engine: engine.to_string(),
        catalog_version: CATALOG_VERSION.to_string(),
        run_dir,
        options: run_options(&options),
        catalog_source: None,
        engine_config: None,
        connection: redacted.clone(),
    };

    let run_paths = start_run(&run_ctx)?;
    init_run_logging(&run_paths.logs_path)?;

    tracing::info!(event = "run_started", run_id = %run_id, command = "introspect", engine = %engine);
    let timer = Instant::now();

    let pool = connect(&conn, &redacted).await?;
    tracing::info!(event = "introspection_started");
    let catalog = introspect(&pool, &options).await?;
    tracing::info!(event = "introspection_finished", tables = catalog.len());

    write_catalog(&run_paths, &catalog, out.as_deref())?;
    tracing::info!(event = "catalog_written", path = %run_paths.catalog_path.display());

    let duration_ms = timer.elapsed().as_millis();
    tracing::info!(event = "run_finished", status = "success", duration_ms = duration_ms);

    Ok(ExitCode::SUCCESS)
}

async fn run_check(args: CheckArgs) -> Result<ExitCode, CliError> {
    let CheckArgs {
        connection,
        scope,
        catalog,
        input,
        question,
        config,
        run_dir,
    } = args;

    let conn = connection.into_conn()?;
    let redacted = redact_connection_string(&conn);
    let engine = detect_engine(&conn, &redacted)?;
    let options = scope.options();
    let engine_config = load_engine_config(config.as_deref())?;
    let raw = read_input(&input)?;

    let run_id = Uuid::new_v4().to_string();
    let run_ctx = RunContext {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now(),
        command: "check",
        engine: engine.to_string(),
        catalog_version: CATALOG_VERSION.to_string(),
        run_dir,
        options: run_options(&options),
        catalog_source: catalog.clone(),
        engine_config: Some(engine_config.clone()),
        connection: redacted.clone(),
    };

    let run_paths = start_run(&run_ctx)?;
    init_run_logging(&run_paths.logs_path)?;

    tracing::info!(event = "run_started", run_id = %run_id, command = "check", engine = %engine);
    let timer = Instant::now();

    let pool = connect(&conn, &redacted).await?;
    let snapshot = match catalog.as_deref() {
        Some(path) => {
            let snapshot = load_catalog(path)?;
            tracing::info!(event = "catalog_loaded", path = %path.display(), tables = snapshot.len());
            snapshot
        }
        None => {
            tracing::info!(event = "introspection_started");
            let snapshot = introspect(&pool, &options).await?;
            tracing::info!(event = "introspection_finished", tables = snapshot.len());
            snapshot
        }
    };
    write_catalog(&run_paths, &snapshot, None)?;

    let executor = PostgresExecutor::new(pool).with_statement_timeout(engine_config.dry_run_timeout());
    let validator = Validator::new(engine_config, Arc::new(executor));
    let verdict = validator
        .validate(&snapshot, &raw, question.as_deref())
        .await;

    write_verdict(&run_paths, &verdict)?;
    tracing::info!(event = "verdict_written", path = %run_paths.verdict_path.display());

    println!("{}", serde_json::to_string_pretty(&verdict)?);

    let duration_ms = timer.elapsed().as_millis();
    tracing::info!(
        event = "run_finished",
        status = "success",
        approved = verdict.is_approved(),
        duration_ms = duration_ms
    );

    Ok(exit_code(&verdict))
}

fn run_catalog_schema(args: CatalogSchemaArgs) -> Result<ExitCode, CliError> {
    let schema = schemars::schema_for!(SchemaCatalog);
    match args.out {
        Some(path) => write_json_atomic(&path, &schema)?,
        None => println!("{}", serde_json::to_string_pretty(&schema)?),
    }
    Ok(ExitCode::SUCCESS)
}

fn detect_engine(conn: &str, redacted: &RedactedConnection) -> Result<&'static str, CliError> {
    match Dialect::from_connection_string(conn) {
        Some(Dialect::Postgres) => Ok("postgres"),
        Some(other) => Err(CliError::UnsupportedEngine(other.to_string())),
        None => Err(CliError::UnsupportedEngine(redacted.to_string())),
    }
}

async fn connect(conn: &str, redacted: &RedactedConnection) -> Result<PgPool, CliError> {
    tracing::info!(event = "connecting", connection = %redacted);
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(conn)
        .await?;
    Ok(pool)
}

fn run_options(options: &IntrospectOptions) -> RunOptions {
    RunOptions {
        include_system_schemas: options.include_system_schemas,
        include_views: options.include_views,
        include_materialized_views: options.include_materialized_views,
        include_foreign_tables: options.include_foreign_tables,
        schemas: options.schemas.clone(),
    }
}

/// Explicit `--config` wins; otherwise `querysafe.toml` in the working
/// directory; otherwise defaults.
fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig, CliError> {
    if let Some(path) = path {
        return Ok(EngineConfig::load(path)?);
    }
    let fallback = Path::new(DEFAULT_CONFIG_FILE);
    if fallback.is_file() {
        return Ok(EngineConfig::load(fallback)?);
    }
    Ok(EngineConfig::default())
}

fn load_catalog(path: &Path) -> Result<SchemaCatalog, CliError> {
    let content = std::fs::read_to_string(path)?;
    let catalog: SchemaCatalog = serde_json::from_str(&content)?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

fn read_input(input: &str) -> Result<String, CliError> {
    if input == "-" {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        return Ok(raw);
    }
    Ok(std::fs::read_to_string(input)?)
}

fn exit_code(verdict: &ValidationVerdict) -> ExitCode {
    if verdict.is_approved() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(REJECTED_EXIT)
    }
}
