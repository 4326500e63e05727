//! Validation engine for model-generated SQL.
//!
//! Raw model output flows through four stages before it is trusted:
//! extraction of exactly one statement, read-only policy checks, schema
//! resolution against a [`querysafe_core::SchemaCatalog`] snapshot, and a
//! dry run through a [`querysafe_core::QueryExecutor`]. The [`Validator`]
//! sequences them and returns a [`ValidationVerdict`].

pub mod config;
pub mod dry_run;
pub mod errors;
pub mod extract;
pub mod matcher;
pub mod orchestrator;
pub mod policy;
pub mod references;
pub mod scan;
pub mod verdict;

pub use config::{ConfigError, EngineConfig};
pub use dry_run::{categorize, dry_run, dry_run_with_timeout, explain_sql};
pub use errors::{EngineError, EngineErrorCategory, ExtractionError, PolicyError, SchemaError};
pub use extract::{ExtractedStatement, extract, extract_with};
pub use matcher::{TableMatch, TableMatches, match_tables};
pub use orchestrator::Validator;
pub use policy::{PolicyRuleset, validate_policy, validate_policy_with};
pub use references::{TableReference, table_references};
pub use scan::ScanOptions;
pub use verdict::{Approval, ErrorKind, Rejection, Stage, StageError, ValidationVerdict};
