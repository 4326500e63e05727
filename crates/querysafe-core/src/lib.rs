//! Core contracts and helpers for Querysafe.
//!
//! This crate defines the schema catalog snapshot, catalog validation, the
//! database executor seam used for dry runs, and utilities shared across
//! adapters, the validation engine and the CLI.

pub mod catalog;
pub mod error;
pub mod executor;
pub mod graph;
pub mod redaction;
pub mod validation;

pub use catalog::{ColumnDescriptor, ForeignKey, SchemaCatalog, TableDescriptor, TableKind};
pub use error::{Error, Result};
pub use executor::{Dialect, EngineDiagnostic, QueryExecutor};
pub use graph::{join_paths, JoinPath, JoinStep};
pub use redaction::{redact_connection_string, RedactedConnection};
pub use validation::validate_catalog;

/// Current contract version for catalog snapshot files.
pub const CATALOG_VERSION: &str = "0.1";
