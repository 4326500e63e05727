use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// SQL dialect spoken by a [`QueryExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Prefix that turns a statement into its non-executing plan form.
    pub fn explain_prefix(self) -> &'static str {
        match self {
            Dialect::Postgres | Dialect::MySql => "EXPLAIN",
            Dialect::Sqlite => "EXPLAIN QUERY PLAN",
        }
    }

    /// Detect the dialect from a connection URL scheme.
    pub fn from_connection_string(conn: &str) -> Option<Self> {
        let scheme = conn.split_once(':').map(|(scheme, _)| scheme)?;
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "mysql" | "mariadb" => Some(Dialect::MySql),
            "sqlite" => Some(Dialect::Sqlite),
            _ => None,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

/// Failure reported by the database while planning a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineDiagnostic {
    /// Five-character SQLSTATE when the driver exposes one.
    pub sqlstate: Option<String>,
    pub message: String,
}

impl EngineDiagnostic {
    pub fn new(sqlstate: Option<String>, message: impl Into<String>) -> Self {
        Self {
            sqlstate,
            message: message.into(),
        }
    }

    /// Diagnostic without a SQLSTATE (driver, pool or transport failures).
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

impl fmt::Display for EngineDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sqlstate {
            Some(code) => write!(f, "[{code}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// The only database capability the validation engine needs.
///
/// Implementations submit an already-wrapped explain statement and must
/// neither return rows nor apply writes.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Dialect used to build the explain form.
    fn dialect(&self) -> Dialect;

    /// Parse and plan `explain_sql` without executing the wrapped statement.
    async fn explain(&self, explain_sql: &str) -> Result<(), EngineDiagnostic>;
}
