//! Ask the database to plan, but not execute, an approved statement.

use std::time::Duration;

use querysafe_core::{Dialect, EngineDiagnostic, QueryExecutor};

use crate::errors::{EngineError, EngineErrorCategory};
use crate::extract::ExtractedStatement;

/// Upper bound on a single planning round trip.
pub const DEFAULT_DRY_RUN_TIMEOUT: Duration = Duration::from_secs(5);

const SYNTAX_SQLSTATES: &[&str] = &["42601", "42000"];
const UNKNOWN_IDENTIFIER_SQLSTATES: &[&str] =
    &["42P01", "42703", "42883", "42704", "3F000", "42S02", "42S22"];

const SYNTAX_FRAGMENTS: &[&str] = &["syntax error", "parse error", "incomplete input"];
const UNKNOWN_IDENTIFIER_FRAGMENTS: &[&str] = &[
    "does not exist",
    "doesn't exist",
    "no such table",
    "no such column",
    "unknown column",
    "unknown table",
];

/// Explain form of `statement` for the given dialect.
pub fn explain_sql(dialect: Dialect, statement: &str) -> String {
    format!("{} {statement}", dialect.explain_prefix())
}

/// Dry run with [`DEFAULT_DRY_RUN_TIMEOUT`].
pub async fn dry_run(
    statement: &ExtractedStatement,
    executor: &dyn QueryExecutor,
) -> Result<(), EngineError> {
    dry_run_with_timeout(statement, executor, DEFAULT_DRY_RUN_TIMEOUT).await
}

/// Submit the explain form once; never retried.
pub async fn dry_run_with_timeout(
    statement: &ExtractedStatement,
    executor: &dyn QueryExecutor,
    timeout: Duration,
) -> Result<(), EngineError> {
    let sql = explain_sql(executor.dialect(), &statement.text);

    match tokio::time::timeout(timeout, executor.explain(&sql)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(diagnostic)) => {
            let category = categorize(&diagnostic);
            Err(EngineError::new(category, diagnostic))
        }
        Err(_) => {
            tracing::warn!(event = "dry_run_timeout", timeout_ms = timeout.as_millis() as u64);
            Err(EngineError::timeout())
        }
    }
}

/// Classify a database diagnostic, SQLSTATE first, message text second.
pub fn categorize(diagnostic: &EngineDiagnostic) -> EngineErrorCategory {
    if let Some(code) = diagnostic.sqlstate.as_deref() {
        if SYNTAX_SQLSTATES.contains(&code) {
            return EngineErrorCategory::Syntax;
        }
        if UNKNOWN_IDENTIFIER_SQLSTATES.contains(&code) {
            return EngineErrorCategory::UnknownIdentifier;
        }
    }

    let message = diagnostic.message.to_lowercase();
    if SYNTAX_FRAGMENTS.iter().any(|needle| message.contains(needle)) {
        EngineErrorCategory::Syntax
    } else if UNKNOWN_IDENTIFIER_FRAGMENTS
        .iter()
        .any(|needle| message.contains(needle))
    {
        EngineErrorCategory::UnknownIdentifier
    } else {
        EngineErrorCategory::Other
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct Scripted {
        dialect: Dialect,
        reply: Result<(), EngineDiagnostic>,
        delay: Option<Duration>,
        seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(reply: Result<(), EngineDiagnostic>) -> Self {
            Self {
                dialect: Dialect::Postgres,
                reply,
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl QueryExecutor for Scripted {
        fn dialect(&self) -> Dialect {
            self.dialect
        }

        async fn explain(&self, explain_sql: &str) -> Result<(), EngineDiagnostic> {
            self.seen.lock().unwrap().push(explain_sql.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply.clone()
        }
    }

    fn statement(text: &str) -> ExtractedStatement {
        ExtractedStatement {
            text: text.to_string(),
            span: 0..text.len(),
        }
    }

    #[tokio::test]
    async fn wraps_statement_in_dialect_explain() {
        let mut executor = Scripted::new(Ok(()));
        executor.dialect = Dialect::Sqlite;

        dry_run(&statement("SELECT 1"), &executor).await.expect("dry run");
        assert_eq!(
            executor.seen.lock().unwrap().as_slice(),
            ["EXPLAIN QUERY PLAN SELECT 1".to_string()]
        );
    }

    #[tokio::test]
    async fn unknown_relation_is_categorized_once() {
        let executor = Scripted::new(Err(EngineDiagnostic::new(
            Some("42P01".to_string()),
            "relation \"custmers\" does not exist",
        )));

        let err = dry_run(&statement("SELECT * FROM custmers"), &executor)
            .await
            .unwrap_err();
        assert_eq!(err.category, EngineErrorCategory::UnknownIdentifier);
        assert_eq!(err.message, "relation \"custmers\" does not exist");
        assert_eq!(executor.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn slow_engine_times_out() {
        let mut executor = Scripted::new(Ok(()));
        executor.delay = Some(Duration::from_secs(60));

        let err = dry_run_with_timeout(&statement("SELECT 1"), &executor, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::timeout());
    }

    #[test]
    fn categorize_by_sqlstate_then_message() {
        let syntax = EngineDiagnostic::new(Some("42601".to_string()), "whatever");
        assert_eq!(categorize(&syntax), EngineErrorCategory::Syntax);

        let sqlite = EngineDiagnostic::message("no such table: custmers");
        assert_eq!(categorize(&sqlite), EngineErrorCategory::UnknownIdentifier);

        let mysql = EngineDiagnostic::message("You have an error in your SQL syntax; Syntax error near");
        assert_eq!(categorize(&mysql), EngineErrorCategory::Syntax);

        let other = EngineDiagnostic::new(Some("53300".to_string()), "too many connections");
        assert_eq!(categorize(&other), EngineErrorCategory::Other);
    }
}
