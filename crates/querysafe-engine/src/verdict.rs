use std::fmt;

use querysafe_core::JoinPath;
use serde::Serialize;

use crate::matcher::TableMatch;

/// Pipeline stage that produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Policy,
    Schema,
    DryRun,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extraction => "extraction",
            Stage::Policy => "policy",
            Stage::Schema => "schema",
            Stage::DryRun => "dry_run",
        };
        f.write_str(name)
    }
}

/// Stable identifier for every way a statement can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoStatementFound,
    MultipleStatementsFound,
    NotReadOnly,
    ForbiddenOperation,
    UnbalancedQuote,
    UnbalancedParentheses,
    SchemaAmbiguous,
    UnknownTableReferenced,
    Syntax,
    UnknownIdentifier,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NoStatementFound => "no_statement_found",
            ErrorKind::MultipleStatementsFound => "multiple_statements_found",
            ErrorKind::NotReadOnly => "not_read_only",
            ErrorKind::ForbiddenOperation => "forbidden_operation",
            ErrorKind::UnbalancedQuote => "unbalanced_quote",
            ErrorKind::UnbalancedParentheses => "unbalanced_parentheses",
            ErrorKind::SchemaAmbiguous => "schema_ambiguous",
            ErrorKind::UnknownTableReferenced => "unknown_table_referenced",
            ErrorKind::Syntax => "syntax",
            ErrorKind::UnknownIdentifier => "unknown_identifier",
            ErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Errors that can be turned into a [`Rejection`].
pub trait StageError: std::error::Error {
    fn kind(&self) -> ErrorKind;

    /// Offending fragment of the input, when one can be pointed at.
    fn fragment(&self) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
}

impl Rejection {
    pub fn from_error<E: StageError>(stage: Stage, error: &E) -> Self {
        Self {
            stage,
            kind: error.kind(),
            message: error.to_string(),
            fragment: error.fragment(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Approval {
    /// Cleaned statement, identical to what was dry-run.
    pub statement: String,
    /// Catalog tables the statement was resolved against.
    pub matched_tables: Vec<String>,
    /// Question-to-table matches, best first.
    pub table_matches: Vec<TableMatch>,
    /// Foreign-key join paths between the matched tables.
    pub join_hints: Vec<JoinPath>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ValidationVerdict {
    Approved(Approval),
    Rejected(Rejection),
}

impl ValidationVerdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, ValidationVerdict::Approved(_))
    }

    pub fn approval(&self) -> Option<&Approval> {
        match self {
            ValidationVerdict::Approved(approval) => Some(approval),
            ValidationVerdict::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            ValidationVerdict::Approved(_) => None,
            ValidationVerdict::Rejected(rejection) => Some(rejection),
        }
    }
}
