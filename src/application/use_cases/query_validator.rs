//! Query Validator
//!
//! Read-only gate applied to every candidate statement before it reaches the
//! database. Checks run in a fixed order and the first failing one decides the
//! rejection reason:
//! 1. The statement must begin with `SELECT`. When it begins with a
//!    denylisted keyword instead, that keyword is reported
//! 2. No denylisted keyword may appear as a whole word after it
//! 3. No `--` or `/*` comment markers
//! 4. No `;` followed by further content
//!
//! This is a structural gate, not a SQL parser. Keywords inside string
//! literals are matched like any other text.

use crate::domain::query::{RejectReason, Verdict};

pub const DENIED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "ATTACH", "PRAGMA",
];

#[derive(Debug, Clone)]
pub struct QueryValidator {
    denied_keywords: Vec<String>,
}

impl Default for QueryValidator {
    fn default() -> Self {
        Self {
            denied_keywords: DENIED_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl QueryValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self, sql: &str) -> Verdict {
        let body = strip_leading_comments(sql);

        let Some(after_select) = strip_select(body) else {
            let leading = words(body).next().unwrap_or("");
            return match self.denied(leading) {
                Some(keyword) => Verdict::Reject(RejectReason::DisallowedKeyword(keyword)),
                None => Verdict::Reject(RejectReason::NonReadOnly),
            };
        };

        if let Some(keyword) = self.find_denied_keyword(after_select) {
            return Verdict::Reject(RejectReason::DisallowedKeyword(keyword));
        }

        if sql.contains("--") || sql.contains("/*") {
            return Verdict::Reject(RejectReason::CommentNotAllowed);
        }

        if has_trailing_statement(sql) {
            return Verdict::Reject(RejectReason::MultipleStatements);
        }

        Verdict::Accept
    }

    fn find_denied_keyword(&self, text: &str) -> Option<String> {
        words(text).find_map(|word| self.denied(word))
    }

    fn denied(&self, word: &str) -> Option<String> {
        self.denied_keywords
            .iter()
            .find(|keyword| keyword.eq_ignore_ascii_case(word))
            .cloned()
    }
}

/// Whitespace, `-- line` and `/* block */` comments ahead of the first token.
fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(end) => after[end + 1..].trim_start(),
                None => "",
            };
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = match after.find("*/") {
                Some(end) => after[end + 2..].trim_start(),
                None => "",
            };
        } else {
            return rest;
        }
    }
}

/// Returns the text after a leading `SELECT` word, if there is one.
fn strip_select(body: &str) -> Option<&str> {
    let head = body.get(..6)?;
    if !head.eq_ignore_ascii_case("SELECT") {
        return None;
    }
    let rest = &body[6..];
    match rest.chars().next() {
        Some(c) if is_word_char(c) => None,
        _ => Some(rest),
    }
}

fn has_trailing_statement(sql: &str) -> bool {
    sql.match_indices(';').any(|(idx, _)| {
        !sql[idx + 1..]
            .trim_start_matches(|c: char| c == ';' || c.is_whitespace())
            .is_empty()
    })
}

/// `_` counts as part of a word so identifiers like `updated_at` stay whole.
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !is_word_char(c))
        .filter(|word| !word.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(sql: &str) -> Verdict {
        QueryValidator::new().validate(sql)
    }

    fn rejected(sql: &str) -> RejectReason {
        match validate(sql) {
            Verdict::Reject(reason) => reason,
            Verdict::Accept => panic!("expected rejection for {sql:?}"),
        }
    }

    #[test]
    fn test_accepts_plain_select() {
        assert!(validate("SELECT COUNT(*) FROM data").is_accept());
        assert!(validate("  select city, count(*) from data group by city").is_accept());
        assert!(validate("SELECT * FROM data LIMIT 5;").is_accept());
        assert!(validate("SELECT * FROM data;  \n ").is_accept());
    }

    #[test]
    fn test_rejects_every_non_select_start() {
        for sql in [
            "DROP TABLE data",
            "insert into data values (1)",
            "WITH t AS (SELECT 1) SELECT * FROM t",
            "PRAGMA table_info(data)",
            "CREATE TABLE x (a)",
            "EXPLAIN SELECT 1",
            "VALUES (1)",
            "SELECTED FROM data",
            "",
        ] {
            assert!(!validate(sql).is_accept(), "{sql}");
        }
    }

    #[test]
    fn test_non_select_start_reason() {
        assert_eq!(
            rejected("DROP TABLE data"),
            RejectReason::DisallowedKeyword("DROP".to_string())
        );
        assert_eq!(
            rejected("  update data SET a = 1"),
            RejectReason::DisallowedKeyword("UPDATE".to_string())
        );
        for sql in [
            "WITH t AS (SELECT 1) SELECT * FROM t",
            "CREATE TABLE x (a)",
            "EXPLAIN SELECT 1",
            "VALUES (1)",
            "SELECTED FROM data",
            "",
        ] {
            assert_eq!(rejected(sql), RejectReason::NonReadOnly, "{sql}");
        }
    }

    #[test]
    fn test_leading_comment_is_skipped_for_start_check_but_rejected() {
        assert_eq!(
            rejected("-- list rows\nSELECT * FROM data"),
            RejectReason::CommentNotAllowed
        );
        assert_eq!(
            rejected("/* hi */ SELECT 1"),
            RejectReason::CommentNotAllowed
        );
        assert_eq!(
            rejected("/* hi */ VACUUM"),
            RejectReason::NonReadOnly
        );
    }

    #[test]
    fn test_denied_keyword_after_select() {
        assert_eq!(
            rejected("SELECT * FROM data; DROP TABLE data"),
            RejectReason::DisallowedKeyword("DROP".to_string())
        );
        assert_eq!(
            rejected("select attach from data"),
            RejectReason::DisallowedKeyword("ATTACH".to_string())
        );
    }

    #[test]
    fn test_identifiers_containing_keywords_are_allowed() {
        assert!(validate("SELECT updated_at, created_at FROM data").is_accept());
        assert!(validate("SELECT dropped, deleted_flag FROM inserts").is_accept());
        assert!(validate("SELECT \"last_update\" FROM data").is_accept());
    }

    #[test]
    fn test_comment_markers() {
        assert_eq!(
            rejected("SELECT * FROM data -- trailing"),
            RejectReason::CommentNotAllowed
        );
        assert_eq!(
            rejected("SELECT * /* x */ FROM data"),
            RejectReason::CommentNotAllowed
        );
    }

    #[test]
    fn test_multiple_statements() {
        assert_eq!(
            rejected("SELECT 1; SELECT 2"),
            RejectReason::MultipleStatements
        );
        assert_eq!(
            rejected("SELECT 1;;x"),
            RejectReason::MultipleStatements
        );
        assert!(validate("SELECT 1;;").is_accept());
    }

    #[test]
    fn test_rule_order_first_match_wins() {
        // both a denied keyword and a second statement: keyword rule comes first
        assert!(matches!(
            rejected("SELECT 1; DELETE FROM data"),
            RejectReason::DisallowedKeyword(_)
        ));
        // comment and second statement: comment rule comes first
        assert_eq!(
            rejected("SELECT 1; SELECT 2 -- x"),
            RejectReason::CommentNotAllowed
        );
    }
}
