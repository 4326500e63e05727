//! Isolate exactly one SQL statement from free-form model output.

use std::ops::Range;

use serde::Serialize;

use crate::errors::ExtractionError;
use crate::scan::{self, ScanOptions, TokenKind};

const FENCE: &str = "```";

/// Keywords that can begin a SQL statement, read-only or not.
pub const STATEMENT_LEADERS: &[&str] = &[
    "SELECT", "WITH", "VALUES", "EXPLAIN", "SHOW", "DESCRIBE", "INSERT", "UPDATE", "DELETE",
    "MERGE", "UPSERT", "REPLACE", "CREATE", "ALTER", "DROP", "TRUNCATE", "RENAME", "GRANT",
    "REVOKE", "COPY", "CALL", "EXEC", "EXECUTE", "SET", "LOCK", "VACUUM", "ANALYZE", "REINDEX",
];

/// Words that continue a statement when they open a line.
const CLAUSE_KEYWORDS: &[&str] = &[
    "FROM", "WHERE", "JOIN", "LEFT", "RIGHT", "INNER", "OUTER", "FULL", "CROSS", "NATURAL",
    "ON", "USING", "AND", "OR", "NOT", "GROUP", "ORDER", "BY", "HAVING", "LIMIT", "OFFSET",
    "FETCH", "UNION", "INTERSECT", "EXCEPT", "AS", "CASE", "WHEN", "THEN", "ELSE", "END", "ASC",
    "DESC", "NULLS", "WINDOW", "PARTITION", "OVER", "IN", "IS", "NULL", "LIKE", "ILIKE",
    "BETWEEN", "EXISTS", "DISTINCT", "ALL", "ANY", "SOME", "INTO", "LATERAL", "RETURNING",
    "FILTER", "ROWS", "RANGE", "TRUE", "FALSE", "INTERVAL", "CAST", "COUNT", "SUM", "AVG",
    "MIN", "MAX", "COALESCE",
];

/// A single cleaned statement and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedStatement {
    /// Statement with comments removed, whitespace collapsed outside literals
    /// and no trailing terminator.
    pub text: String,
    /// Byte range of the statement in the raw input.
    pub span: Range<usize>,
}

impl ExtractedStatement {
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Extract with default quoting conventions.
pub fn extract(raw: &str) -> Result<ExtractedStatement, ExtractionError> {
    extract_with(raw, ScanOptions::default())
}

/// Locate the statement in `raw` and normalize it.
///
/// A fenced code block containing a statement leader wins over surrounding
/// prose. Outside fences the statement starts at the best leader keyword and
/// stops at a blank line, a prose line or an inline code delimiter.
/// Extraction is idempotent: feeding the returned text back in yields the
/// same text.
pub fn extract_with(
    raw: &str,
    options: ScanOptions,
) -> Result<ExtractedStatement, ExtractionError> {
    let (region, fenced) = candidate_region(raw);
    let leader = find_leader(raw, region.clone()).ok_or(ExtractionError::NoStatementFound)?;
    let start = include_open_parens(raw, region.start, leader);

    let mut end = region.end;
    if !fenced {
        if let Some(fence) = fence_in_code(raw, start..end, options) {
            end = fence;
        }
        if let Some(inline_end) = inline_code_end(raw, start) {
            end = end.min(inline_end);
        }
    }

    normalize(raw, start..end, fenced, options)
}

/// Body of the first fenced block holding a leader, else the whole input.
fn candidate_region(raw: &str) -> (Range<usize>, bool) {
    fenced_blocks(raw)
        .into_iter()
        .find(|block| find_leader(raw, block.clone()).is_some())
        .map(|block| (block, true))
        .unwrap_or((0..raw.len(), false))
}

fn fenced_blocks(raw: &str) -> Vec<Range<usize>> {
    let mut blocks = Vec::new();
    let mut cursor = 0;

    while let Some(found) = raw[cursor..].find(FENCE) {
        let body_start = fence_body_start(raw, cursor + found + FENCE.len());
        match raw[body_start..].find(FENCE) {
            Some(close) => {
                blocks.push(body_start..body_start + close);
                cursor = body_start + close + FENCE.len();
            }
            None => {
                // Unclosed fence runs to the end of the output.
                blocks.push(body_start..raw.len());
                break;
            }
        }
    }

    blocks
}

/// Skip an info string such as `sql` after an opening fence.
fn fence_body_start(raw: &str, after_fence: usize) -> usize {
    let line_end = raw[after_fence..].find('\n').map(|idx| after_fence + idx);
    let info = raw[after_fence..line_end.unwrap_or(raw.len())].trim();
    let is_info_string = info.is_empty()
        || (!is_leader(info)
            && info
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '+' | '.')));

    match (is_info_string, line_end) {
        (true, Some(end)) => end + 1,
        (true, None) => raw.len(),
        (false, _) => after_fence,
    }
}

struct Candidate<'a> {
    offset: usize,
    word: &'a str,
    line_start: bool,
}

fn candidates(raw: &str, region: Range<usize>) -> Vec<Candidate<'_>> {
    let body = &raw[region.clone()];
    let mut out = Vec::new();
    let mut line_start = true;
    let mut iter = body.char_indices().peekable();

    while let Some((idx, ch)) = iter.next() {
        if ch == '\n' {
            line_start = true;
        } else if scan::is_word_char(ch) {
            let mut end = idx + ch.len_utf8();
            while let Some(&(next_idx, next)) = iter.peek() {
                if !scan::is_word_char(next) {
                    break;
                }
                end = next_idx + next.len_utf8();
                iter.next();
            }
            out.push(Candidate {
                offset: region.start + idx,
                word: &body[idx..end],
                line_start,
            });
            line_start = false;
        } else if !(ch.is_whitespace() || ch == '`' || ch == '(') {
            line_start = false;
        }
    }

    out
}

/// Offset of the statement-leading keyword inside `region`.
///
/// Preference order: the region opening with a leader, a leader opening a
/// line (uppercase first), then a leader anywhere (uppercase first).
fn find_leader(raw: &str, region: Range<usize>) -> Option<usize> {
    let words = candidates(raw, region);
    let leaders: Vec<&Candidate<'_>> = words.iter().filter(|c| is_leader(c.word)).collect();

    if let Some(first) = words.first() {
        if first.line_start && is_leader(first.word) {
            return Some(first.offset);
        }
    }

    let tiers: [&dyn Fn(&Candidate<'_>) -> bool; 4] = [
        &|c: &Candidate<'_>| c.line_start && is_uppercase(c.word),
        &|c: &Candidate<'_>| c.line_start,
        &|c: &Candidate<'_>| is_uppercase(c.word),
        &|_: &Candidate<'_>| true,
    ];

    tiers
        .iter()
        .find_map(|tier| leaders.iter().find(|c| tier(c)).map(|c| c.offset))
}

fn include_open_parens(raw: &str, floor: usize, leader: usize) -> usize {
    let mut start = leader;
    for (idx, ch) in raw[floor..leader].char_indices().rev() {
        match ch {
            '(' => start = floor + idx,
            ' ' | '\t' => {}
            _ => break,
        }
    }
    start
}

/// First code fence in `range` that is not inside a literal or comment.
fn fence_in_code(raw: &str, range: Range<usize>, options: ScanOptions) -> Option<usize> {
    // Backticks must scan as punctuation here, not as quoted identifiers.
    let options = ScanOptions {
        backtick_identifiers: false,
        ..options
    };
    let body = &raw[range.clone()];
    scan::tokenize(body, options)
        .find(|token| token.is_punct('`') && body[token.offset..].starts_with(FENCE))
        .map(|token| range.start + token.offset)
}

/// End of an inline code span when the statement opens right after a single
/// backtick.
fn inline_code_end(raw: &str, start: usize) -> Option<usize> {
    let before = &raw[..start];
    if !before.ends_with('`') || before.ends_with(FENCE) {
        return None;
    }
    raw[start..].find('`').map(|idx| start + idx)
}

fn normalize(
    raw: &str,
    range: Range<usize>,
    fenced: bool,
    options: ScanOptions,
) -> Result<ExtractedStatement, ExtractionError> {
    let slice = &raw[range.clone()];
    let base = range.start;

    let mut text = String::with_capacity(slice.len());
    let mut pending_space = false;
    let mut depth = 0usize;
    let mut terminators = Vec::new();
    let mut span_end = base;
    let mut span_end_before_last = base;

    for token in scan::tokenize(slice, options) {
        match token.kind {
            TokenKind::Whitespace => {
                if !fenced && depth == 0 && ends_statement(slice, token.end(), token.text) {
                    break;
                }
                pending_space = true;
            }
            TokenKind::Comment { .. } => pending_space = true,
            _ => {
                if pending_space && !text.is_empty() {
                    text.push(' ');
                }
                pending_space = false;

                if token.is_punct('(') {
                    depth += 1;
                } else if token.is_punct(')') {
                    depth = depth.saturating_sub(1);
                } else if token.is_punct(';') {
                    terminators.push(text.len());
                }

                text.push_str(token.text);
                span_end_before_last = span_end;
                span_end = base + token.end();
            }
        }
    }

    if text.ends_with(';') && terminators.last() == Some(&(text.len() - 1)) {
        terminators.pop();
        text.pop();
        text.truncate(text.trim_end().len());
        span_end = span_end_before_last;
    }

    if let Some(&first) = terminators.first() {
        return Err(ExtractionError::MultipleStatementsFound {
            fragment: scan::excerpt(&text, first, 40),
        });
    }

    if text.is_empty() {
        return Err(ExtractionError::NoStatementFound);
    }

    Ok(ExtractedStatement {
        text,
        span: base..span_end,
    })
}

/// Whether a whitespace run followed by the next line closes the statement.
fn ends_statement(slice: &str, next: usize, whitespace: &str) -> bool {
    match whitespace.matches('\n').count() {
        0 => false,
        1 => is_prose_line(slice[next..].lines().next().unwrap_or("")),
        _ => true,
    }
}

/// Heuristic for a natural-language sentence following a statement.
fn is_prose_line(line: &str) -> bool {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return false;
    };

    let bare = strip_punctuation(first);
    if bare.is_empty() || !bare.chars().all(char::is_alphabetic) || is_sql_keyword(bare) {
        return false;
    }

    let mut chars = bare.chars();
    let title_case = chars.next().is_some_and(char::is_uppercase)
        && (bare.chars().count() == 1 || chars.any(char::is_lowercase));
    if !title_case {
        return false;
    }
    if first.ends_with(':') {
        return true;
    }

    let rest: Vec<&str> = words.take(2).map(strip_punctuation).collect();
    rest.len() == 2
        && rest.iter().all(|word| {
            !word.is_empty()
                && word.chars().all(char::is_alphabetic)
                && !(is_uppercase(word) && is_sql_keyword(word))
        })
}

fn strip_punctuation(word: &str) -> &str {
    word.trim_end_matches([':', ',', '.', '!', '?'])
}

pub(crate) fn is_leader(word: &str) -> bool {
    STATEMENT_LEADERS
        .iter()
        .any(|leader| leader.eq_ignore_ascii_case(word))
}

fn is_sql_keyword(word: &str) -> bool {
    is_leader(word)
        || CLAUSE_KEYWORDS
            .iter()
            .any(|keyword| keyword.eq_ignore_ascii_case(word))
}

fn is_uppercase(word: &str) -> bool {
    !word.chars().any(char::is_lowercase)
}
