//! Read-only policy checks over an extracted statement.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::PolicyError;
use crate::extract::ExtractedStatement;
use crate::scan::{self, ScanOptions, TokenKind};

const DEFAULT_ALLOWED_LEADERS: &[&str] = &["SELECT", "WITH"];

const DEFAULT_FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "TRUNCATE", "GRANT", "REVOKE", "REPLACE",
    "CREATE", "MERGE", "EXEC", "EXECUTE", "CALL", "COPY", "INTO", "LOCK",
];

/// Keyword sets the validator enforces.
///
/// Keywords are stored uppercase and compared without regard to case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyRuleset {
    pub allowed_leaders: BTreeSet<String>,
    pub forbidden_keywords: BTreeSet<String>,
}

impl Default for PolicyRuleset {
    fn default() -> Self {
        Self::new(
            DEFAULT_ALLOWED_LEADERS.iter().copied(),
            DEFAULT_FORBIDDEN_KEYWORDS.iter().copied(),
        )
    }
}

impl PolicyRuleset {
    pub fn new<A, F>(allowed_leaders: A, forbidden_keywords: F) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: AsRef<str>,
    {
        Self {
            allowed_leaders: uppercase_set(allowed_leaders),
            forbidden_keywords: uppercase_set(forbidden_keywords),
        }
    }

    /// Uppercase every keyword, e.g. after loading from a config file.
    pub fn normalized(self) -> Self {
        Self::new(self.allowed_leaders, self.forbidden_keywords)
    }

    pub fn is_allowed_leader(&self, word: &str) -> bool {
        self.allowed_leaders.contains(&word.to_ascii_uppercase())
    }

    pub fn is_forbidden(&self, word: &str) -> bool {
        self.forbidden_keywords.contains(&word.to_ascii_uppercase())
    }
}

fn uppercase_set<I>(words: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    words
        .into_iter()
        .map(|word| word.as_ref().trim().to_ascii_uppercase())
        .filter(|word| !word.is_empty())
        .collect()
}

/// Validate with default quoting conventions.
pub fn validate_policy(
    statement: &ExtractedStatement,
    rules: &PolicyRuleset,
) -> Result<(), PolicyError> {
    validate_policy_with(&statement.text, rules, ScanOptions::default())
}

/// Check that `text` is one read-only statement.
///
/// Keywords, terminators and parentheses only count in code; literal and
/// quoted-identifier contents are ignored. Comment bodies are still searched
/// for forbidden keywords because some engines execute hinted comments.
pub fn validate_policy_with(
    text: &str,
    rules: &PolicyRuleset,
    options: ScanOptions,
) -> Result<(), PolicyError> {
    let mut leader_seen = false;
    let mut depth = 0i64;
    let mut terminator: Option<usize> = None;

    for token in scan::tokenize(text, options) {
        if let Some(offset) = terminator {
            if !token.is_trivia() {
                return Err(PolicyError::MultipleStatements {
                    fragment: scan::excerpt(text, offset, 40),
                });
            }
        }

        match token.kind {
            TokenKind::Whitespace => {}
            TokenKind::Comment { .. } => {
                if let Some(keyword) = scan::words(token.text).find(|word| rules.is_forbidden(word))
                {
                    return Err(PolicyError::ForbiddenOperation {
                        keyword: keyword.to_ascii_uppercase(),
                        fragment: token.text.to_string(),
                    });
                }
            }
            TokenKind::Literal { terminated } | TokenKind::QuotedIdent { terminated } => {
                if !terminated {
                    return Err(PolicyError::UnbalancedQuote {
                        offset: token.offset,
                        fragment: scan::excerpt(text, token.offset, 40),
                    });
                }
                if !leader_seen {
                    return Err(not_read_only(token.text));
                }
            }
            TokenKind::Word => {
                if !leader_seen {
                    if !rules.is_allowed_leader(token.text) {
                        return Err(not_read_only(token.text));
                    }
                    leader_seen = true;
                }
                if rules.is_forbidden(token.text) {
                    return Err(PolicyError::ForbiddenOperation {
                        keyword: token.text.to_ascii_uppercase(),
                        fragment: token.text.to_string(),
                    });
                }
            }
            TokenKind::Punct => {
                if token.is_punct('(') {
                    depth += 1;
                } else if token.is_punct(')') {
                    depth -= 1;
                    if depth < 0 {
                        return Err(PolicyError::UnbalancedParentheses {
                            offset: token.offset,
                            fragment: scan::excerpt(text, token.offset, 40),
                        });
                    }
                } else if token.is_punct(';') {
                    terminator = Some(token.offset);
                } else if !leader_seen {
                    return Err(not_read_only(token.text));
                }
            }
        }
    }

    if !leader_seen {
        return Err(not_read_only(""));
    }
    if depth != 0 {
        return Err(PolicyError::UnbalancedParentheses {
            offset: text.len(),
            fragment: format!("{depth} unclosed parenthesis(es)"),
        });
    }

    Ok(())
}

fn not_read_only(leader: &str) -> PolicyError {
    PolicyError::NotReadOnly {
        leader: leader.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(text: &str) -> Result<(), PolicyError> {
        validate_policy_with(text, &PolicyRuleset::default(), ScanOptions::default())
    }

    #[test]
    fn accepts_plain_select_and_cte() {
        assert_eq!(check("SELECT * FROM customers"), Ok(()));
        assert_eq!(check("with x as (select 1) select * from x"), Ok(()));
        assert_eq!(check("(SELECT 1) UNION (SELECT 2)"), Ok(()));
    }

    #[test]
    fn rejects_non_read_only_leader() {
        assert_eq!(
            check("UPDATE customers SET active = 0"),
            Err(PolicyError::NotReadOnly {
                leader: "UPDATE".to_string()
            })
        );
        assert!(matches!(check(""), Err(PolicyError::NotReadOnly { .. })));
        assert!(matches!(check("'SELECT'"), Err(PolicyError::NotReadOnly { .. })));
    }

    #[test]
    fn forbidden_keyword_in_code_is_rejected() {
        let err = check("WITH gone AS (DELETE FROM t RETURNING *) SELECT * FROM gone").unwrap_err();
        assert_eq!(
            err,
            PolicyError::ForbiddenOperation {
                keyword: "DELETE".to_string(),
                fragment: "DELETE".to_string()
            }
        );
        assert!(matches!(
            check("select * into backup from t"),
            Err(PolicyError::ForbiddenOperation { .. })
        ));
    }

    #[test]
    fn keywords_inside_literals_and_identifiers_are_ignored() {
        assert_eq!(check("SELECT 'DROP TABLE x' AS note"), Ok(()));
        assert_eq!(check("SELECT \"delete\" FROM audit"), Ok(()));
        assert_eq!(check("SELECT updated_at, dropped FROM t"), Ok(()));
    }

    #[test]
    fn keywords_inside_comments_are_rejected() {
        let err = check("SELECT 1 /*! DROP TABLE t */").unwrap_err();
        assert!(matches!(err, PolicyError::ForbiddenOperation { ref keyword, .. } if keyword == "DROP"));
        assert!(check("SELECT 1 -- latest rows").is_ok());
    }

    #[test]
    fn unterminated_literal_is_unbalanced_quote() {
        let err = check("SELECT * FROM customers WHERE name = 'Smith").unwrap_err();
        assert!(matches!(err, PolicyError::UnbalancedQuote { offset: 37, .. }));
        assert!(matches!(check("SELECT \"a FROM t"), Err(PolicyError::UnbalancedQuote { .. })));
    }

    #[test]
    fn parentheses_must_balance_outside_literals() {
        assert!(matches!(
            check("SELECT (1 + 2 FROM t"),
            Err(PolicyError::UnbalancedParentheses { .. })
        ));
        assert!(matches!(
            check("SELECT 1) FROM t"),
            Err(PolicyError::UnbalancedParentheses { offset: 8, .. })
        ));
        assert_eq!(check("SELECT ')' FROM t"), Ok(()));
    }

    #[test]
    fn second_statement_is_rejected() {
        assert!(matches!(
            check("SELECT 1; SELECT 2"),
            Err(PolicyError::MultipleStatements { .. })
        ));
        assert_eq!(check("SELECT 1; -- done"), Ok(()));
    }

    #[test]
    fn postgres_string_forms_do_not_hide_code() {
        let err = check(
            "WITH q AS (SELECT $$'$$ AS x), d AS (DELETE FROM customers RETURNING 1) SELECT 1 --')",
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::ForbiddenOperation { ref keyword, .. } if keyword == "DELETE"));

        let err = check(
            r"WITH q AS (SELECT E'\'' AS x), d AS (DELETE FROM customers RETURNING 1) SELECT 1 --')",
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::ForbiddenOperation { ref keyword, .. } if keyword == "DELETE"));

        assert!(matches!(
            check("SELECT $$'$$; DROP TABLE customers; --'"),
            Err(PolicyError::MultipleStatements { .. })
        ));

        assert_eq!(check("SELECT $body$ DROP TABLE t; ( $body$ AS note"), Ok(()));
        assert_eq!(check(r"SELECT E'it\'s; DELETE' AS note"), Ok(()));
    }

    #[test]
    fn removing_any_parenthesis_flips_the_verdict() {
        let balanced = "SELECT (a + (b * 2)) FROM t WHERE c IN (1, 2)";
        assert_eq!(check(balanced), Ok(()));

        for (idx, _) in balanced.match_indices(['(', ')']) {
            let mut broken = balanced.to_string();
            broken.remove(idx);
            assert!(
                matches!(check(&broken), Err(PolicyError::UnbalancedParentheses { .. })),
                "{broken}"
            );
        }
    }

    #[test]
    fn removing_the_closing_quote_flips_the_verdict() {
        let balanced = [
            "SELECT 'it''s' AS x",
            "SELECT \"col\" FROM t",
            r"SELECT E'a\'b' AS x",
            "SELECT $tag$ x $tag$ AS y",
        ];

        for statement in balanced {
            assert_eq!(check(statement), Ok(()), "{statement}");

            let closing = statement
                .rfind(['\'', '"', '$'])
                .expect("closing quote");
            let mut broken = statement.to_string();
            broken.remove(closing);
            assert!(
                matches!(check(&broken), Err(PolicyError::UnbalancedQuote { .. })),
                "{broken}"
            );
        }
    }

    #[test]
    fn custom_ruleset_is_case_insensitive() {
        let rules = PolicyRuleset::new(["select", "show"], ["sleep"]);
        let options = ScanOptions::default();
        assert_eq!(validate_policy_with("SHOW tables", &rules, options), Ok(()));
        assert!(matches!(
            validate_policy_with("SELECT SLEEP(5)", &rules, options),
            Err(PolicyError::ForbiddenOperation { .. })
        ));
        assert_eq!(validate_policy_with("SELECT 1 INTO x", &rules, options), Ok(()));
    }
}
