use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::Serialize;

use querysafe_core::{RedactedConnection, SchemaCatalog};
use querysafe_engine::{EngineConfig, ValidationVerdict};

use super::RegistryResult;
use super::atomic::write_json_atomic;

/// Serializable introspection options recorded with a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOptions {
    pub include_system_schemas: bool,
    pub include_views: bool,
    pub include_materialized_views: bool,
    pub include_foreign_tables: bool,
    pub schemas: Option<Vec<String>>,
}

/// Metadata captured at run start.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub command: &'static str,
    pub engine: String,
    pub catalog_version: String,
    pub run_dir: PathBuf,
    pub options: RunOptions,
    /// Catalog file used instead of live introspection.
    pub catalog_source: Option<PathBuf>,
    pub engine_config: Option<EngineConfig>,
    pub connection: RedactedConnection,
}

/// JSON config written to each run directory.
#[derive(Debug, Serialize)]
struct RunConfig<'a> {
    run_id: &'a str,
    started_at: String,
    command: &'a str,
    engine: &'a str,
    catalog_version: &'a str,
    options: &'a RunOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    catalog_source: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    engine_config: Option<&'a EngineConfig>,
    connection: &'a RedactedConnection,
    git: GitInfo,
}

/// Git metadata for reproducibility.
#[derive(Debug, Serialize)]
struct GitInfo {
    commit: Option<String>,
    dirty: Option<bool>,
}

/// Paths for run artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub catalog_path: PathBuf,
    pub verdict_path: PathBuf,
    pub logs_path: PathBuf,
}

impl RunPaths {
    fn under(root: PathBuf) -> Self {
        Self {
            catalog_path: root.join("catalog.json"),
            verdict_path: root.join("verdict.json"),
            logs_path: root.join("logs.ndjson"),
            root,
        }
    }
}

/// Create `<run_dir>/<timestamp>__run_<id>/` with its `config.json` and an
/// empty log file.
pub fn start_run(ctx: &RunContext) -> RegistryResult<RunPaths> {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let paths = RunPaths::under(
        ctx.run_dir
            .join(format!("{timestamp}__run_{}", ctx.run_id)),
    );

    create_dir_all(&paths.root)?;

    let config = RunConfig {
        run_id: &ctx.run_id,
        started_at: ctx.started_at.to_rfc3339(),
        command: ctx.command,
        engine: &ctx.engine,
        catalog_version: &ctx.catalog_version,
        options: &ctx.options,
        catalog_source: ctx.catalog_source.as_deref(),
        engine_config: ctx.engine_config.as_ref(),
        connection: &ctx.connection,
        git: collect_git_info(),
    };
    write_json_atomic(&paths.root.join("config.json"), &config)?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.logs_path)?;

    Ok(paths)
}

/// Persist the catalog into the run directory and, optionally, to `out_path`.
pub fn write_catalog(
    paths: &RunPaths,
    catalog: &SchemaCatalog,
    out_path: Option<&Path>,
) -> RegistryResult<()> {
    write_json_atomic(&paths.catalog_path, catalog)?;
    if let Some(out_path) = out_path {
        write_json_atomic(out_path, catalog)?;
    }
    Ok(())
}

pub fn write_verdict(paths: &RunPaths, verdict: &ValidationVerdict) -> RegistryResult<()> {
    write_json_atomic(&paths.verdict_path, verdict)
}

fn collect_git_info() -> GitInfo {
    let commit = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|value| !value.is_empty());

    let dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| !output.stdout.is_empty());

    GitInfo { commit, dirty }
}
