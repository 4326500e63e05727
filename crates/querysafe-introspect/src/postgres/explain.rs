use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use querysafe_core::{Dialect, EngineDiagnostic, QueryExecutor};

/// Dry-run executor backed by a Postgres pool.
///
/// Each explain runs in its own read-only transaction with a local
/// statement timeout, and the transaction is always rolled back.
#[derive(Debug, Clone)]
pub struct PostgresExecutor {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PostgresExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn explain(&self, explain_sql: &str) -> Result<(), EngineDiagnostic> {
        let mut tx = self.pool.begin().await.map_err(diagnostic)?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(diagnostic)?;
        let timeout = format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout.as_millis()
        );
        sqlx::query(&timeout)
            .execute(&mut *tx)
            .await
            .map_err(diagnostic)?;

        // Extended protocol: a second statement would be refused by the server.
        let outcome = sqlx::query(explain_sql).execute(&mut *tx).await;

        if let Err(err) = tx.rollback().await {
            tracing::warn!(event = "dry_run_rollback_failed", error = %err);
        }

        outcome.map(|_| ()).map_err(diagnostic)
    }
}

fn diagnostic(err: sqlx::Error) -> EngineDiagnostic {
    match err {
        sqlx::Error::Database(db) => EngineDiagnostic::new(
            db.code().map(|code| code.into_owned()),
            db.message().to_string(),
        ),
        other => EngineDiagnostic::message(other.to_string()),
    }
}
