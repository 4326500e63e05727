use std::fmt;

use querysafe_core::EngineDiagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::verdict::{ErrorKind, StageError};

/// Errors raised while isolating a statement from model output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("no SQL statement found in model output")]
    NoStatementFound,
    #[error("more than one SQL statement found")]
    MultipleStatementsFound { fragment: String },
}

impl StageError for ExtractionError {
    fn kind(&self) -> ErrorKind {
        match self {
            ExtractionError::NoStatementFound => ErrorKind::NoStatementFound,
            ExtractionError::MultipleStatementsFound { .. } => ErrorKind::MultipleStatementsFound,
        }
    }

    fn fragment(&self) -> Option<String> {
        match self {
            ExtractionError::NoStatementFound => None,
            ExtractionError::MultipleStatementsFound { fragment } => Some(fragment.clone()),
        }
    }
}

/// Read-only policy violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("statement must begin with an allowed read-only keyword, found `{leader}`")]
    NotReadOnly { leader: String },
    #[error("forbidden keyword `{keyword}`")]
    ForbiddenOperation { keyword: String, fragment: String },
    #[error("unterminated quoted literal at byte {offset}")]
    UnbalancedQuote { offset: usize, fragment: String },
    #[error("unbalanced parentheses at byte {offset}")]
    UnbalancedParentheses { offset: usize, fragment: String },
    #[error("statement terminator followed by another statement")]
    MultipleStatements { fragment: String },
}

impl StageError for PolicyError {
    fn kind(&self) -> ErrorKind {
        match self {
            PolicyError::NotReadOnly { .. } => ErrorKind::NotReadOnly,
            PolicyError::ForbiddenOperation { .. } => ErrorKind::ForbiddenOperation,
            PolicyError::UnbalancedQuote { .. } => ErrorKind::UnbalancedQuote,
            PolicyError::UnbalancedParentheses { .. } => ErrorKind::UnbalancedParentheses,
            PolicyError::MultipleStatements { .. } => ErrorKind::MultipleStatementsFound,
        }
    }

    fn fragment(&self) -> Option<String> {
        match self {
            PolicyError::NotReadOnly { leader } => Some(leader.clone()),
            PolicyError::ForbiddenOperation { fragment, .. }
            | PolicyError::UnbalancedQuote { fragment, .. }
            | PolicyError::UnbalancedParentheses { fragment, .. }
            | PolicyError::MultipleStatements { fragment } => Some(fragment.clone()),
        }
    }
}

/// Failures resolving a statement against the schema catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("question matches several tables equally well: {}", candidates.join(", "))]
    Ambiguous {
        candidates: Vec<String>,
        fragment: String,
    },
    #[error("statement references tables missing from the catalog: {}", tables.join(", "))]
    UnknownTable { tables: Vec<String> },
}

impl StageError for SchemaError {
    fn kind(&self) -> ErrorKind {
        match self {
            SchemaError::Ambiguous { .. } => ErrorKind::SchemaAmbiguous,
            SchemaError::UnknownTable { .. } => ErrorKind::UnknownTableReferenced,
        }
    }

    fn fragment(&self) -> Option<String> {
        match self {
            SchemaError::Ambiguous { fragment, .. } => Some(fragment.clone()),
            SchemaError::UnknownTable { tables } => tables.first().cloned(),
        }
    }
}

/// Coarse classification of a database planning failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorCategory {
    Syntax,
    UnknownIdentifier,
    Other,
}

impl fmt::Display for EngineErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineErrorCategory::Syntax => "syntax error",
            EngineErrorCategory::UnknownIdentifier => "unknown identifier",
            EngineErrorCategory::Other => "engine error",
        };
        f.write_str(name)
    }
}

/// Dry-run failure carrying the database's own message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{category}: {message}")]
pub struct EngineError {
    pub category: EngineErrorCategory,
    pub message: String,
    pub sqlstate: Option<String>,
}

impl EngineError {
    pub fn new(category: EngineErrorCategory, diagnostic: EngineDiagnostic) -> Self {
        Self {
            category,
            message: diagnostic.message,
            sqlstate: diagnostic.sqlstate,
        }
    }

    pub fn timeout() -> Self {
        Self {
            category: EngineErrorCategory::Other,
            message: "timeout".to_string(),
            sqlstate: None,
        }
    }
}

impl StageError for EngineError {
    fn kind(&self) -> ErrorKind {
        match self.category {
            EngineErrorCategory::Syntax => ErrorKind::Syntax,
            EngineErrorCategory::UnknownIdentifier => ErrorKind::UnknownIdentifier,
            EngineErrorCategory::Other => ErrorKind::Other,
        }
    }

    fn fragment(&self) -> Option<String> {
        self.sqlstate.clone()
    }
}
