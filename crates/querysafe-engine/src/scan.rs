//! Quote- and comment-aware SQL tokenizer.
//!
//! One pass over the input, driven by the lexical mode the scanner is in.
//! Keyword, terminator and parenthesis checks downstream only ever look at
//! tokens produced in [`Mode::Code`]; literal and quoted-identifier contents
//! come out as single opaque tokens.

use serde::{Deserialize, Serialize};

/// Quoting conventions the scanner honors.
///
/// Doubled quotes (`''` inside `'...'`, `""` inside `"..."`) are always
/// treated as an escaped quote character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// `\'` does not terminate a single-quoted literal (MySQL style).
    pub backslash_escapes: bool,
    /// `` `ident` `` is a quoted identifier rather than punctuation.
    pub backtick_identifiers: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            backslash_escapes: false,
            backtick_identifiers: true,
        }
    }
}

/// Lexical mode of the scanner at a given byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Code,
    SingleQuote,
    DoubleQuote,
    Backtick,
    LineComment,
    BlockComment,
    /// Postgres `$$...$$` or `$tag$...$tag$` string.
    DollarQuote,
    /// Postgres `E'...'` string, where `\'` never closes the literal.
    EscapeString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Run of identifier characters: keywords, names, numbers.
    Word,
    /// String literal (single-quoted, escape or dollar-quoted), quotes included.
    Literal { terminated: bool },
    /// Double-quoted or backtick-quoted identifier, quotes included.
    QuotedIdent { terminated: bool },
    /// Any other single character in code.
    Punct,
    Whitespace,
    Comment { terminated: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset of the token in the scanned input.
    pub offset: usize,
}

impl<'a> Token<'a> {
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }

    pub fn is_word(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_punct(&self, ch: char) -> bool {
        self.kind == TokenKind::Punct && self.text.starts_with(ch)
    }

    /// Whitespace and comments carry no meaning for the statement.
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment { .. })
    }

    /// Identifier text with quotes stripped and doubled quotes collapsed.
    pub fn identifier(&self) -> Option<String> {
        match self.kind {
            TokenKind::Word => Some(self.text.to_string()),
            TokenKind::QuotedIdent { .. } => {
                let quote = self.text.chars().next()?;
                let inner = self.text.strip_prefix(quote)?;
                let inner = inner.strip_suffix(quote).unwrap_or(inner);
                let doubled: String = [quote, quote].iter().collect();
                Some(inner.replace(&doubled, &quote.to_string()))
            }
            _ => None,
        }
    }
}

/// Iterator over the tokens of a SQL text.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    options: ScanOptions,
}

/// Tokenize `src`; concatenating all token texts reproduces `src` exactly.
pub fn tokenize(src: &str, options: ScanOptions) -> Scanner<'_> {
    Scanner {
        src,
        pos: 0,
        options,
    }
}

impl<'a> Scanner<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Whether the byte before the current position belongs to an identifier.
    fn follows_word(&self) -> bool {
        self.src[..self.pos]
            .chars()
            .next_back()
            .is_some_and(is_word_char)
    }

    /// Mode entered by the text at the current position.
    fn mode_at(&self) -> Option<(Mode, char)> {
        let rest = self.rest();
        let mut chars = rest.chars();
        let ch = chars.next()?;
        let next = chars.next();
        let mode = match (ch, next) {
            ('\'', _) => Mode::SingleQuote,
            ('E' | 'e', Some('\'')) if !self.follows_word() => Mode::EscapeString,
            ('$', _) if !self.follows_word() && dollar_tag(rest).is_some() => Mode::DollarQuote,
            ('"', _) => Mode::DoubleQuote,
            ('`', _) if self.options.backtick_identifiers => Mode::Backtick,
            ('-', Some('-')) => Mode::LineComment,
            ('/', Some('*')) => Mode::BlockComment,
            _ => Mode::Code,
        };
        Some((mode, ch))
    }

    /// Length of a quoted run starting at the current position, and whether
    /// the closing quote was found. `opener` is the number of chars that open
    /// the run (`'` or `E'`).
    fn quoted_len(&self, opener: usize, quote: char, allow_backslash: bool) -> (usize, bool) {
        let rest = self.rest();
        let mut iter = rest.char_indices().skip(opener).peekable();

        while let Some((idx, ch)) = iter.next() {
            if allow_backslash && ch == '\\' {
                iter.next();
                continue;
            }
            if ch == quote {
                if matches!(iter.peek(), Some((_, next)) if *next == quote) {
                    iter.next();
                    continue;
                }
                return (idx + ch.len_utf8(), true);
            }
        }

        (rest.len(), false)
    }

    fn code_len(&self, first: char) -> (usize, TokenKind) {
        let rest = self.rest();
        if first.is_whitespace() {
            let len = rest
                .find(|c: char| !c.is_whitespace())
                .unwrap_or(rest.len());
            (len, TokenKind::Whitespace)
        } else if is_word_char(first) {
            let len = rest.find(|c: char| !is_word_char(c)).unwrap_or(rest.len());
            (len, TokenKind::Word)
        } else {
            (first.len_utf8(), TokenKind::Punct)
        }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (mode, first) = self.mode_at()?;
        let rest = self.rest();

        let (len, kind) = match mode {
            Mode::Code => self.code_len(first),
            Mode::SingleQuote => {
                let (len, terminated) = self.quoted_len(1, '\'', self.options.backslash_escapes);
                (len, TokenKind::Literal { terminated })
            }
            Mode::EscapeString => {
                let (len, terminated) = self.quoted_len(2, '\'', true);
                (len, TokenKind::Literal { terminated })
            }
            Mode::DollarQuote => {
                let tag = dollar_tag(rest).unwrap_or("$$");
                match rest[tag.len()..].find(tag) {
                    Some(idx) => (
                        2 * tag.len() + idx,
                        TokenKind::Literal { terminated: true },
                    ),
                    None => (rest.len(), TokenKind::Literal { terminated: false }),
                }
            }
            Mode::DoubleQuote => {
                let (len, terminated) = self.quoted_len(1, '"', false);
                (len, TokenKind::QuotedIdent { terminated })
            }
            Mode::Backtick => {
                let (len, terminated) = self.quoted_len(1, '`', false);
                (len, TokenKind::QuotedIdent { terminated })
            }
            Mode::LineComment => {
                let len = rest.find('\n').unwrap_or(rest.len());
                (len, TokenKind::Comment { terminated: true })
            }
            Mode::BlockComment => match rest[2..].find("*/") {
                Some(idx) => (idx + 4, TokenKind::Comment { terminated: true }),
                None => (rest.len(), TokenKind::Comment { terminated: false }),
            },
        };

        let token = Token {
            kind,
            text: &rest[..len],
            offset: self.pos,
        };
        self.pos += len;
        Some(token)
    }
}

/// Opening tag of a dollar-quoted string: `$`, an optional identifier not
/// starting with a digit, then `$`.
fn dollar_tag(text: &str) -> Option<&str> {
    let body = text.strip_prefix('$')?;
    for (idx, ch) in body.char_indices() {
        if ch == '$' {
            return Some(&text[..idx + 2]);
        }
        let valid = if idx == 0 {
            ch.is_alphabetic() || ch == '_'
        } else {
            ch.is_alphanumeric() || ch == '_'
        };
        if !valid {
            return None;
        }
    }
    None
}

pub(crate) fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

/// Split free text (comment bodies, prose) into identifier-like words.
pub(crate) fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !is_word_char(c))
        .filter(|word| !word.is_empty())
}

/// Short excerpt of `text` starting at `offset`, cut on a char boundary.
pub(crate) fn excerpt(text: &str, offset: usize, max_chars: usize) -> String {
    let start = offset.min(text.len());
    let tail = text.get(start..).unwrap_or("");
    match tail.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &tail[..cut]),
        None => tail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<(TokenKind, &str)> {
        tokenize(src, ScanOptions::default())
            .filter(|token| token.kind != TokenKind::Whitespace)
            .map(|token| (token.kind, token.text))
            .collect()
    }

    #[test]
    fn tokens_reassemble_input() {
        let src = "SELECT a, 'x''y' -- note\nFROM \"T\" /* c */ WHERE b = `q`;";
        let joined: String = tokenize(src, ScanOptions::default())
            .map(|token| token.text)
            .collect();
        assert_eq!(joined, src);
    }

    #[test]
    fn literal_contents_are_opaque() {
        let tokens = kinds("SELECT 'DROP TABLE x; (' FROM t");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Word, "SELECT"),
                (TokenKind::Literal { terminated: true }, "'DROP TABLE x; ('"),
                (TokenKind::Word, "FROM"),
                (TokenKind::Word, "t"),
            ]
        );
    }

    #[test]
    fn doubled_quote_is_an_escape() {
        let tokens = kinds("SELECT 'O''Brien'");
        assert_eq!(tokens[1], (TokenKind::Literal { terminated: true }, "'O''Brien'"));
    }

    #[test]
    fn backslash_escape_is_opt_in() {
        let src = r"SELECT 'it\'s'";
        let default: Vec<_> = kinds(src);
        assert_eq!(default[1], (TokenKind::Literal { terminated: true }, r"'it\'"));

        let options = ScanOptions {
            backslash_escapes: true,
            ..ScanOptions::default()
        };
        let escaped: Vec<_> = tokenize(src, options)
            .filter(|token| !token.is_trivia())
            .collect();
        assert_eq!(escaped[1].text, r"'it\'s'");
        assert_eq!(escaped[1].kind, TokenKind::Literal { terminated: true });
    }

    #[test]
    fn dollar_quoted_strings_are_single_literals() {
        let tokens = kinds("SELECT $$'$$; DROP TABLE customers; --'");
        assert_eq!(tokens[1], (TokenKind::Literal { terminated: true }, "$$'$$"));
        assert_eq!(tokens[2], (TokenKind::Punct, ";"));
        assert_eq!(tokens[3], (TokenKind::Word, "DROP"));

        let tokens = kinds("SELECT $fn$ it's $$ here $fn$ AS body");
        assert_eq!(
            tokens[1],
            (TokenKind::Literal { terminated: true }, "$fn$ it's $$ here $fn$")
        );
        assert_eq!(tokens[2], (TokenKind::Word, "AS"));

        let tokens = kinds("SELECT $$never closed");
        assert_eq!(tokens[1], (TokenKind::Literal { terminated: false }, "$$never closed"));
    }

    #[test]
    fn dollar_signs_outside_tags_stay_in_words() {
        let tokens = kinds("SELECT $1, price$$ FROM t WHERE $2x = 1");
        assert_eq!(tokens[1], (TokenKind::Word, "$1"));
        assert_eq!(tokens[3], (TokenKind::Word, "price$$"));
        assert_eq!(tokens[7], (TokenKind::Word, "$2x"));
    }

    #[test]
    fn escape_strings_always_honor_backslash() {
        let tokens = kinds(r"WITH q AS (SELECT E'\'' AS x), d AS (DELETE FROM c) SELECT 1 --')");
        assert_eq!(tokens[5], (TokenKind::Literal { terminated: true }, r"E'\''"));
        assert!(tokens.contains(&(TokenKind::Word, "DELETE")));

        let tokens = kinds(r"SELECT e'it\'s' AS x");
        assert_eq!(tokens[1], (TokenKind::Literal { terminated: true }, r"e'it\'s'"));

        // A word ending in `e` is not an escape-string prefix.
        let tokens = kinds("SELECT name'x'");
        assert_eq!(tokens[1], (TokenKind::Word, "name"));
        assert_eq!(tokens[2], (TokenKind::Literal { terminated: true }, "'x'"));
    }

    #[test]
    fn unterminated_quote_runs_to_end() {
        let tokens = kinds("SELECT * FROM customers WHERE name = 'Smith");
        let last = tokens.last().copied().expect("tokens");
        assert_eq!(last, (TokenKind::Literal { terminated: false }, "'Smith"));
    }

    #[test]
    fn comments_are_single_tokens() {
        let tokens = kinds("SELECT 1 -- it's fine\n/* DROP */ /* open");
        assert_eq!(tokens[2], (TokenKind::Comment { terminated: true }, "-- it's fine"));
        assert_eq!(tokens[3], (TokenKind::Comment { terminated: true }, "/* DROP */"));
        assert_eq!(tokens[4], (TokenKind::Comment { terminated: false }, "/* open"));
    }

    #[test]
    fn quoted_identifier_unquotes() {
        let token = tokenize("\"Order \"\"Items\"\"\"", ScanOptions::default())
            .next()
            .expect("token");
        assert_eq!(token.identifier().as_deref(), Some("Order \"Items\""));
    }

    #[test]
    fn excerpt_cuts_on_char_boundary() {
        assert_eq!(excerpt("héllo world", 0, 5), "héllo...");
        assert_eq!(excerpt("abc", 1, 10), "bc");
    }
}
