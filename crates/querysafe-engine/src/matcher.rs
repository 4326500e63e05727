//! Deterministic lexical matching of a question against catalog tables.

use std::ops::Range;

use querysafe_core::SchemaCatalog;
use serde::Serialize;

/// Confidence for a question phrase naming every part of a table name.
pub const FULL_MATCH: f64 = 1.0;
/// Weight applied to partial overlap (`matched parts / total parts`).
pub const PARTIAL_WEIGHT: f64 = 0.8;

const STOPWORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "as", "at", "be", "by", "can", "did", "do",
    "does", "each", "every", "for", "from", "get", "give", "has", "have", "how", "i", "in", "is",
    "it", "list", "many", "me", "much", "my", "of", "on", "or", "our", "per", "please", "show",
    "that", "the", "their", "them", "there", "these", "this", "those", "to", "was", "we", "were",
    "what", "when", "where", "which", "who", "whose", "with", "you", "your",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableMatch {
    pub schema: String,
    pub table: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    /// Question text that produced the match.
    pub fragment: String,
    #[serde(skip)]
    pub(crate) catalog_index: usize,
}

impl TableMatch {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// Matches ordered by confidence, ties in catalog declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TableMatches(Vec<TableMatch>);

impl TableMatches {
    pub fn iter(&self) -> std::slice::Iter<'_, TableMatch> {
        self.0.iter()
    }

    pub fn top(&self) -> Option<&TableMatch> {
        self.0.first()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Matches sharing the best confidence, if it reaches `threshold`.
    pub fn best_above(&self, threshold: f64) -> &[TableMatch] {
        let Some(top) = self.top() else {
            return &[];
        };
        if top.confidence < threshold {
            return &[];
        }
        let tied = self
            .0
            .iter()
            .take_while(|candidate| candidate.confidence == top.confidence)
            .count();
        &self.0[..tied]
    }

    pub fn into_vec(self) -> Vec<TableMatch> {
        self.0
    }
}

impl<'a> IntoIterator for &'a TableMatches {
    type Item = &'a TableMatch;
    type IntoIter = std::slice::Iter<'a, TableMatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

struct QuestionWord {
    stem: String,
    span: Range<usize>,
    stopword: bool,
}

/// Score every catalog table against `question`.
///
/// Pure and deterministic for a given question and catalog snapshot. Tables
/// without any overlapping word are omitted.
pub fn match_tables(question: &str, catalog: &SchemaCatalog) -> TableMatches {
    let words = question_words(question);
    let mut matches = Vec::new();

    for (catalog_index, table) in catalog.tables.iter().enumerate() {
        let parts: Vec<String> = name_parts(&table.name)
            .iter()
            .map(|part| singularize(part))
            .collect();
        if parts.is_empty() {
            continue;
        }

        if let Some(span) = full_match(&words, &parts) {
            matches.push(TableMatch {
                schema: table.schema.clone(),
                table: table.name.clone(),
                confidence: FULL_MATCH,
                fragment: question[span].to_string(),
                catalog_index,
            });
            continue;
        }

        let mut hits: Vec<&QuestionWord> = Vec::new();
        let mut matched_parts = 0usize;
        for part in &parts {
            let hit = words
                .iter()
                .find(|word| !word.stopword && word.stem == *part);
            if let Some(hit) = hit {
                matched_parts += 1;
                if !hits.iter().any(|seen| seen.span == hit.span) {
                    hits.push(hit);
                }
            }
        }
        if matched_parts == 0 {
            continue;
        }

        hits.sort_by_key(|word| word.span.start);
        let fragment = hits
            .iter()
            .map(|word| &question[word.span.clone()])
            .collect::<Vec<_>>()
            .join(" ");
        matches.push(TableMatch {
            schema: table.schema.clone(),
            table: table.name.clone(),
            confidence: PARTIAL_WEIGHT * matched_parts as f64 / parts.len() as f64,
            fragment,
            catalog_index,
        });
    }

    matches.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(a.catalog_index.cmp(&b.catalog_index))
    });
    TableMatches(matches)
}

/// Span of consecutive question words equal to all table name parts.
fn full_match(words: &[QuestionWord], parts: &[String]) -> Option<Range<usize>> {
    words.windows(parts.len()).find_map(|window| {
        let equal = window
            .iter()
            .zip(parts)
            .all(|(word, part)| word.stem == *part);
        let meaningful = window.iter().any(|word| !word.stopword);
        (equal && meaningful).then(|| window[0].span.start..window[window.len() - 1].span.end)
    })
}

fn question_words(question: &str) -> Vec<QuestionWord> {
    let mut words = Vec::new();
    let mut start: Option<usize> = None;

    let flush = |start: &mut Option<usize>, end: usize, words: &mut Vec<QuestionWord>| {
        if let Some(begin) = start.take() {
            let lower = question[begin..end].to_lowercase();
            words.push(QuestionWord {
                stopword: STOPWORDS.contains(&lower.as_str()),
                stem: singularize(&lower),
                span: begin..end,
            });
        }
    };

    for (idx, ch) in question.char_indices() {
        if ch.is_alphanumeric() {
            start.get_or_insert(idx);
        } else {
            flush(&mut start, idx, &mut words);
        }
    }
    flush(&mut start, question.len(), &mut words);

    words
}

/// Split an identifier on `_`, `-`, spaces and camelCase boundaries.
pub fn name_parts(name: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;

    for ch in name.chars() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            previous_lower = false;
            continue;
        }
        if ch.is_uppercase() && previous_lower && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        previous_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

/// Reduce an English plural to its singular form.
///
/// `-ies` becomes `-y`; `-sses`, `-xes`, `-ches`, `-shes` and `-zzes` drop
/// `es`; any other trailing `s` is dropped unless the word ends in `ss`,
/// `us` or `is`.
pub fn singularize(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.chars().count() <= 3 {
        return lower;
    }
    if let Some(stem) = lower.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["sses", "xes", "ches", "shes", "zzes"] {
        if lower.ends_with(suffix) {
            return lower[..lower.len() - 2].to_string();
        }
    }
    if lower.ends_with('s') && !["ss", "us", "is"].iter().any(|end| lower.ends_with(end)) {
        return lower[..lower.len() - 1].to_string();
    }
    lower
}

#[cfg(test)]
mod tests {
    use querysafe_core::{ColumnDescriptor, TableDescriptor, TableKind};

    use super::*;

    fn catalog(names: &[&str]) -> SchemaCatalog {
        let mut catalog = SchemaCatalog::new("postgres", None);
        catalog.tables = names
            .iter()
            .map(|name| TableDescriptor {
                schema: "public".to_string(),
                name: name.to_string(),
                kind: TableKind::Table,
                columns: vec![ColumnDescriptor {
                    name: "id".to_string(),
                    data_type: "integer".to_string(),
                    is_nullable: false,
                }],
                foreign_keys: Vec::new(),
            })
            .collect();
        catalog
    }

    #[test]
    fn singularize_rules() {
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("addresses"), "address");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("batches"), "batch");
        assert_eq!(singularize("customers"), "customer");
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("analysis"), "analysis");
        assert_eq!(singularize("Orders"), "order");
    }

    #[test]
    fn name_parts_split_separators_and_camel_case() {
        assert_eq!(name_parts("order_details"), vec!["order", "details"]);
        assert_eq!(name_parts("OrderDetails"), vec!["order", "details"]);
        assert_eq!(name_parts("line-items2"), vec!["line", "items2"]);
    }

    #[test]
    fn full_phrase_beats_partial_overlap() {
        let catalog = catalog(&["orders", "order_details", "customers"]);
        let matches = match_tables("Show the order details for each customer", &catalog);

        let scored: Vec<(&str, f64)> = matches
            .iter()
            .map(|m| (m.table.as_str(), m.confidence))
            .collect();
        assert_eq!(
            scored,
            vec![("orders", 1.0), ("order_details", 1.0), ("customers", 1.0)]
        );
        assert_eq!(matches.top().map(|m| m.fragment.as_str()), Some("order"));
        assert_eq!(matches.iter().nth(1).map(|m| m.fragment.as_str()), Some("order details"));
    }

    #[test]
    fn partial_overlap_is_weighted() {
        let catalog = catalog(&["customer_addresses", "products"]);
        let matches = match_tables("Which customers bought the most?", &catalog);

        assert_eq!(matches.len(), 1);
        let top = matches.top().expect("match");
        assert_eq!(top.table, "customer_addresses");
        assert!((top.confidence - 0.4).abs() < 1e-9);
        assert_eq!(top.fragment, "customers");
    }

    #[test]
    fn ties_keep_catalog_order() {
        let mut catalog = catalog(&["events", "events"]);
        catalog.tables[0].schema = "archive".to_string();
        let matches = match_tables("count events", &catalog);

        let best = matches.best_above(0.6);
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].qualified_name(), "archive.events");
        assert_eq!(best[1].qualified_name(), "public.events");
    }

    #[test]
    fn stopwords_never_match_alone() {
        let catalog = catalog(&["show", "items"]);
        let matches = match_tables("show me everything", &catalog);
        assert!(matches.is_empty());
        assert!(matches.best_above(0.0).is_empty());
    }

    #[test]
    fn matching_is_deterministic() {
        let catalog = catalog(&["orders", "order_details", "products", "categories"]);
        let question = "Which product categories have the most orders?";
        assert_eq!(match_tables(question, &catalog), match_tables(question, &catalog));
    }
}
