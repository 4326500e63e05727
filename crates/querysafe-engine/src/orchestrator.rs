//! Stage sequencing from raw model output to a verdict.

use std::sync::Arc;

use querysafe_core::{QueryExecutor, SchemaCatalog, join_paths};

use crate::config::EngineConfig;
use crate::dry_run::dry_run_with_timeout;
use crate::errors::SchemaError;
use crate::extract::{ExtractedStatement, extract_with};
use crate::matcher::{TableMatches, match_tables};
use crate::policy::validate_policy_with;
use crate::references::table_references;
use crate::verdict::{Approval, Rejection, Stage, StageError, ValidationVerdict};

/// Runs extraction, policy, schema resolution and the dry run in order.
///
/// Holds no per-call state; one instance can serve concurrent validations.
pub struct Validator {
    config: EngineConfig,
    executor: Arc<dyn QueryExecutor>,
}

/// Pipeline position; each stage either advances or finishes with a verdict.
enum Step {
    Start,
    Extracted(ExtractedStatement),
    PolicyChecked(ExtractedStatement),
    SchemaChecked(ExtractedStatement, Resolution),
    Done(ValidationVerdict),
}

struct Resolution {
    tables: Vec<usize>,
    matches: TableMatches,
}

impl Validator {
    pub fn new(config: EngineConfig, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { config, executor }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate `raw` model output against `catalog`.
    ///
    /// Stops at the first failing stage. The database is contacted only for
    /// statements that passed every earlier stage.
    pub async fn validate(
        &self,
        catalog: &SchemaCatalog,
        raw: &str,
        question: Option<&str>,
    ) -> ValidationVerdict {
        let mut step = Step::Start;

        loop {
            step = match step {
                Step::Start => match extract_with(raw, self.config.scan) {
                    Ok(statement) => {
                        tracing::debug!(
                            event = "stage_passed",
                            stage = %Stage::Extraction,
                            span_start = statement.span.start,
                            span_end = statement.span.end
                        );
                        Step::Extracted(statement)
                    }
                    Err(err) => reject(Stage::Extraction, &err),
                },
                Step::Extracted(statement) => {
                    match validate_policy_with(&statement.text, &self.config.policy, self.config.scan)
                    {
                        Ok(()) => {
                            tracing::debug!(event = "stage_passed", stage = %Stage::Policy);
                            Step::PolicyChecked(statement)
                        }
                        Err(err) => reject(Stage::Policy, &err),
                    }
                }
                Step::PolicyChecked(statement) => {
                    match self.resolve_schema(catalog, &statement, question) {
                        Ok(resolution) => {
                            tracing::debug!(
                                event = "stage_passed",
                                stage = %Stage::Schema,
                                tables = resolution.tables.len(),
                                question_matches = resolution.matches.len()
                            );
                            Step::SchemaChecked(statement, resolution)
                        }
                        Err(err) => reject(Stage::Schema, &err),
                    }
                }
                Step::SchemaChecked(statement, resolution) => {
                    let timeout = self.config.dry_run_timeout();
                    match dry_run_with_timeout(&statement, self.executor.as_ref(), timeout).await {
                        Ok(()) => approve(catalog, statement, resolution),
                        Err(err) => reject(Stage::DryRun, &err),
                    }
                }
                Step::Done(verdict) => return verdict,
            };
        }
    }

    /// Tie the statement to catalog tables.
    ///
    /// Tables the statement names take precedence. Without any, the question
    /// is consulted: one best match above the confidence floor is used, a tie
    /// is ambiguous, and no confident match leaves the statement unresolved.
    fn resolve_schema(
        &self,
        catalog: &SchemaCatalog,
        statement: &ExtractedStatement,
        question: Option<&str>,
    ) -> Result<Resolution, SchemaError> {
        let mut tables: Vec<usize> = Vec::new();
        let mut unknown: Vec<String> = Vec::new();

        for reference in table_references(&statement.text, self.config.scan) {
            match catalog.position(&reference.name) {
                Some(idx) if !tables.contains(&idx) => tables.push(idx),
                Some(_) => {}
                None => unknown.push(reference.name),
            }
        }

        if !unknown.is_empty() {
            if self.config.strict_tables {
                return Err(SchemaError::UnknownTable { tables: unknown });
            }
            tracing::debug!(event = "unknown_tables_deferred", tables = ?unknown);
        }

        let matches = question
            .map(|question| match_tables(question, catalog))
            .unwrap_or_default();

        if tables.is_empty() {
            match matches.best_above(self.config.min_confidence) {
                [] => {}
                [single] => tables.push(single.catalog_index),
                tied => {
                    return Err(SchemaError::Ambiguous {
                        candidates: tied.iter().map(|m| m.qualified_name()).collect(),
                        fragment: tied[0].fragment.clone(),
                    });
                }
            }
        }

        Ok(Resolution { tables, matches })
    }
}

fn reject<E: StageError>(stage: Stage, err: &E) -> Step {
    let rejection = Rejection::from_error(stage, err);
    tracing::info!(
        event = "validation_rejected",
        stage = %stage,
        kind = %rejection.kind,
        message = %rejection.message
    );
    Step::Done(ValidationVerdict::Rejected(rejection))
}

fn approve(catalog: &SchemaCatalog, statement: ExtractedStatement, resolution: Resolution) -> Step {
    let qualified: Vec<String> = resolution
        .tables
        .iter()
        .map(|&idx| catalog.tables[idx].qualified_name())
        .collect();
    let join_hints = if qualified.len() > 1 {
        join_paths(catalog, &qualified)
    } else {
        Vec::new()
    };

    let approval = Approval {
        statement: statement.text,
        matched_tables: resolution
            .tables
            .iter()
            .map(|&idx| display_name(catalog, idx))
            .collect(),
        table_matches: resolution.matches.into_vec(),
        join_hints,
    };
    tracing::info!(
        event = "validation_approved",
        tables = approval.matched_tables.len(),
        join_hints = approval.join_hints.len()
    );
    Step::Done(ValidationVerdict::Approved(approval))
}

/// Bare table name unless another schema holds a table of the same name.
fn display_name(catalog: &SchemaCatalog, idx: usize) -> String {
    let table = &catalog.tables[idx];
    let shared = catalog
        .tables
        .iter()
        .filter(|other| other.name.eq_ignore_ascii_case(&table.name))
        .count()
        > 1;
    if shared {
        table.qualified_name()
    } else {
        table.name.clone()
    }
}
