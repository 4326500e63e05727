//! Table references named by a statement's `FROM` and `JOIN` clauses.

use crate::scan::{self, ScanOptions, Token, TokenKind};

/// Words that end a `FROM` item or cannot be an alias.
const NON_ALIAS_WORDS: &[&str] = &[
    "ON", "USING", "WHERE", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "OUTER", "CROSS",
    "NATURAL", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "FETCH", "UNION", "INTERSECT",
    "EXCEPT", "WINDOW", "FOR", "TABLESAMPLE", "LATERAL", "RETURNING", "AS", "SELECT",
];

/// Words that may precede `(` without it being a function call.
const NON_CALL_WORDS: &[&str] = &[
    "FROM", "JOIN", "IN", "EXISTS", "AS", "ANY", "ALL", "SOME", "LATERAL", "ON", "WHERE", "AND",
    "OR", "NOT", "SELECT", "UNION", "INTERSECT", "EXCEPT", "USING", "WITH", "VALUES", "MATERIALIZED",
];

/// A table named in a statement, as written, quotes removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReference {
    /// `table` or `schema.table`.
    pub name: String,
    /// Byte offset in the statement text.
    pub offset: usize,
}

/// Tables read by `text`, in order of first appearance.
///
/// Common table expression names, derived tables and table functions are
/// not reported. `FROM` inside a function call (`EXTRACT(YEAR FROM d)`) is
/// not a clause.
pub fn table_references(text: &str, options: ScanOptions) -> Vec<TableReference> {
    let tokens: Vec<Token<'_>> = scan::tokenize(text, options)
        .filter(|token| !token.is_trivia())
        .collect();

    let ctes = cte_names(&tokens);
    let mut found: Vec<TableReference> = Vec::new();
    let mut call_stack: Vec<bool> = Vec::new();

    for (idx, token) in tokens.iter().enumerate() {
        if token.is_punct('(') {
            call_stack.push(opens_call(&tokens, idx));
            continue;
        }
        if token.is_punct(')') {
            call_stack.pop();
            continue;
        }
        if call_stack.last() == Some(&true) {
            continue;
        }

        let comma_list = token.is_word("FROM");
        if !(comma_list || token.is_word("JOIN")) {
            continue;
        }

        for reference in from_items(&tokens, idx + 1, comma_list) {
            let is_cte = !reference.name.contains('.')
                && ctes.iter().any(|cte| cte.eq_ignore_ascii_case(&reference.name));
            let seen = found
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(&reference.name));
            if !is_cte && !seen {
                found.push(reference);
            }
        }
    }

    found
}

fn opens_call(tokens: &[Token<'_>], paren: usize) -> bool {
    let Some(previous) = paren.checked_sub(1).map(|idx| &tokens[idx]) else {
        return false;
    };
    match previous.kind {
        TokenKind::Word => !NON_CALL_WORDS
            .iter()
            .any(|word| previous.text.eq_ignore_ascii_case(word)),
        TokenKind::QuotedIdent { .. } => true,
        _ => false,
    }
}

/// Names bound by `WITH name [(columns)] AS (...)`.
fn cte_names(tokens: &[Token<'_>]) -> Vec<String> {
    let mut names = Vec::new();

    for (idx, token) in tokens.iter().enumerate() {
        if !token.is_word("AS") {
            continue;
        }
        let body_follows = tokens[idx + 1..]
            .iter()
            .find(|next| !(next.is_word("NOT") || next.is_word("MATERIALIZED")))
            .is_some_and(|next| next.is_punct('('));
        if !body_follows || idx == 0 {
            continue;
        }

        let mut name_idx = idx - 1;
        if tokens[name_idx].is_punct(')') {
            // Skip an explicit column list.
            let Some(open) = tokens[..name_idx].iter().rposition(|t| t.is_punct('(')) else {
                continue;
            };
            let Some(before) = open.checked_sub(1) else {
                continue;
            };
            name_idx = before;
        }

        let is_cte_position = name_idx
            .checked_sub(1)
            .map(|prev| &tokens[prev])
            .is_some_and(|prev| {
                prev.is_word("WITH") || prev.is_word("RECURSIVE") || prev.is_punct(',')
            });
        if is_cte_position {
            if let Some(name) = tokens[name_idx].identifier() {
                names.push(name);
            }
        }
    }

    names
}

/// Parse `name [AS] [alias] [, ...]` items starting at `start`.
fn from_items(tokens: &[Token<'_>], start: usize, comma_list: bool) -> Vec<TableReference> {
    let mut out = Vec::new();
    let mut idx = start;

    loop {
        while tokens
            .get(idx)
            .is_some_and(|t| t.is_word("ONLY") || t.is_word("LATERAL"))
        {
            idx += 1;
        }

        let Some((reference, next)) = qualified_name(tokens, idx) else {
            break;
        };
        if tokens.get(next).is_some_and(|t| t.is_punct('(')) {
            // Table function, not a relation.
            break;
        }
        out.push(reference);
        idx = skip_alias(tokens, next);

        if comma_list && tokens.get(idx).is_some_and(|t| t.is_punct(',')) {
            idx += 1;
        } else {
            break;
        }
    }

    out
}

fn qualified_name(tokens: &[Token<'_>], start: usize) -> Option<(TableReference, usize)> {
    let first = tokens.get(start)?;
    if !is_name(first) {
        return None;
    }

    let mut parts = vec![first.identifier()?];
    let mut idx = start + 1;
    while tokens.get(idx).is_some_and(|t| t.is_punct('.')) {
        let Some(part) = tokens.get(idx + 1).filter(|t| is_name(t)) else {
            break;
        };
        parts.push(part.identifier()?);
        idx += 2;
    }

    let reference = TableReference {
        name: parts.join("."),
        offset: first.offset,
    };
    Some((reference, idx))
}

fn is_name(token: &Token<'_>) -> bool {
    match token.kind {
        TokenKind::QuotedIdent { terminated } => terminated,
        TokenKind::Word => {
            !is_non_alias(token.text) && !token.text.starts_with(|c: char| c.is_ascii_digit())
        }
        _ => false,
    }
}

fn skip_alias(tokens: &[Token<'_>], mut idx: usize) -> usize {
    if tokens.get(idx).is_some_and(|t| t.is_word("AS")) {
        idx += 1;
    }
    if tokens.get(idx).is_some_and(is_name) {
        idx += 1;
        // Column alias list: `t (a, b)`.
        if tokens.get(idx).is_some_and(|t| t.is_punct('(')) {
            let mut depth = 0usize;
            while let Some(token) = tokens.get(idx) {
                if token.is_punct('(') {
                    depth += 1;
                } else if token.is_punct(')') {
                    depth -= 1;
                    if depth == 0 {
                        idx += 1;
                        break;
                    }
                }
                idx += 1;
            }
        }
    }
    idx
}

fn is_non_alias(word: &str) -> bool {
    NON_ALIAS_WORDS
        .iter()
        .any(|keyword| keyword.eq_ignore_ascii_case(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(text: &str) -> Vec<String> {
        table_references(text, ScanOptions::default())
            .into_iter()
            .map(|reference| reference.name)
            .collect()
    }

    #[test]
    fn simple_from_and_joins() {
        assert_eq!(
            names("SELECT * FROM customers c JOIN orders AS o ON o.customer_id = c.id LEFT JOIN public.order_details d USING (order_id)"),
            vec!["customers", "orders", "public.order_details"]
        );
    }

    #[test]
    fn comma_separated_from_list() {
        assert_eq!(
            names("SELECT 1 FROM products p, categories AS c WHERE p.category_id = c.id"),
            vec!["products", "categories"]
        );
    }

    #[test]
    fn quoted_names_are_unquoted() {
        assert_eq!(
            names("SELECT * FROM \"Sales\".\"Order Items\" oi, `legacy`"),
            vec!["Sales.Order Items", "legacy"]
        );
    }

    #[test]
    fn cte_names_and_subqueries_are_skipped() {
        let text = "WITH recent (id) AS (SELECT id FROM orders), top AS MATERIALIZED (SELECT 1) \
                    SELECT * FROM recent r JOIN (SELECT * FROM customers) c ON true JOIN top ON true";
        assert_eq!(names(text), vec!["orders", "customers"]);
    }

    #[test]
    fn function_call_from_is_not_a_clause() {
        assert_eq!(
            names("SELECT EXTRACT(YEAR FROM order_date) FROM orders"),
            vec!["orders"]
        );
        assert!(names("SELECT * FROM generate_series(1, 3)").is_empty());
    }

    #[test]
    fn duplicates_are_reported_once_in_order() {
        assert_eq!(
            names("SELECT * FROM orders WHERE id IN (SELECT order_id FROM ORDERS)"),
            vec!["orders"]
        );
    }
}
