//! Read-only statement validation
//!
//! Oracle-generated SQL is untrusted. A statement passes only if it contains no
//! write or DDL keyword anywhere (comments and literals included), is a single
//! statement, and starts with a read-oriented keyword.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AgentError, Result};

static FORBIDDEN_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(insert|update|delete|drop|alter|create|truncate|attach|detach|grant|revoke|vacuum|reindex|merge|pragma|upsert)\b",
    )
    .unwrap()
});

const READ_KEYWORDS: &[&str] = &["select", "with", "explain", "values"];

/// Validate a statement and return the text to run.
///
/// Structural checks run on a copy with comments blanked out; the returned
/// statement is the caller's text with leading/trailing comments, whitespace and
/// `;` removed, so string literals reach the database exactly as written.
pub fn validate_read_only(sql: &str) -> Result<String> {
    if let Some(m) = FORBIDDEN_KEYWORD_RE.find(sql) {
        return Err(AgentError::ForbiddenOperation(format!(
            "{} is not allowed; only read-only queries may be run",
            m.as_str().to_uppercase()
        )));
    }

    // Same byte layout as `sql`, so offsets found here slice the original
    let blanked = blank_comments(sql);
    let start = blanked.len() - blanked.trim_start().len();
    let end = blanked
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .len();

    if start >= end {
        return Err(AgentError::ForbiddenOperation("query is empty".to_string()));
    }
    let visible = &blanked[start..end];

    if count_statements(visible) > 1 {
        return Err(AgentError::ForbiddenOperation(
            "only a single statement may be run at a time".to_string(),
        ));
    }

    let first = visible
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    if !READ_KEYWORDS.contains(&first.as_str()) {
        return Err(AgentError::ForbiddenOperation(format!(
            "statements starting with '{}' are not allowed; use SELECT",
            first
        )));
    }

    Ok(sql[start..end].to_string())
}

/// Replace `--` and `/* */` comments with spaces of the same byte length.
///
/// Quoted literals and identifiers are copied untouched, so `'%--%'` or
/// `'/*'` survive.
fn blank_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                // Doubled quote is an escaped quote
                if q != ']' && chars.peek() == Some(&q) {
                    chars.next();
                    out.push(q);
                } else {
                    quote = None;
                }
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                out.push(c);
            }
            '[' => {
                quote = Some(']');
                out.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                blank(&mut out, c);
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    blank(&mut out, next);
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str("  ");
                let mut prev = '\0';
                // An unterminated block comment runs to the end of input
                for next in chars.by_ref() {
                    blank(&mut out, next);
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

fn blank(out: &mut String, c: char) {
    for _ in 0..c.len_utf8() {
        out.push(' ');
    }
}

/// Count `;`-separated statements, ignoring separators inside quotes
fn count_statements(sql: &str) -> usize {
    let mut count = 1;
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                if q != ']' && chars.peek() == Some(&q) {
                    chars.next();
                } else {
                    quote = None;
                }
            }
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '[') => quote = Some(']'),
            (None, ';') => {
                if chars.clone().any(|rest| !rest.is_whitespace() && rest != ';') {
                    count += 1;
                }
            }
            (None, _) => {}
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_forbidden(sql: &str) {
        let result = validate_read_only(sql);
        assert!(
            matches!(result, Err(AgentError::ForbiddenOperation(_))),
            "expected {:?} to be forbidden, got {:?}",
            sql,
            result
        );
    }

    #[test]
    fn test_plain_select_allowed() {
        assert_eq!(
            validate_read_only("SELECT COUNT(*) FROM users;").unwrap(),
            "SELECT COUNT(*) FROM users"
        );
    }

    #[test]
    fn test_read_keywords_allowed() {
        assert!(validate_read_only("with t as (select 1) select * from t").is_ok());
        assert!(validate_read_only("EXPLAIN QUERY PLAN SELECT * FROM users").is_ok());
        assert!(validate_read_only("VALUES (1), (2)").is_ok());
        assert!(validate_read_only("(SELECT 1)").is_err());
    }

    #[test]
    fn test_write_and_ddl_keywords_rejected() {
        assert_forbidden("DROP TABLE users");
        assert_forbidden("select 1; drop table users");
        assert_forbidden("INSERT INTO users VALUES (1)");
        assert_forbidden("update users set name = 'x'");
        assert_forbidden("DeLeTe FROM users");
        assert_forbidden("ALTER TABLE users ADD COLUMN x");
        assert_forbidden("create table t (x)");
        assert_forbidden("WITH x AS (SELECT 1) DELETE FROM users");
        assert_forbidden("ATTACH DATABASE 'other.db' AS other");
        assert_forbidden("PRAGMA writable_schema = 1");
    }

    #[test]
    fn test_keyword_hidden_in_comment_or_literal_rejected() {
        assert_forbidden("SELECT 1 -- drop table users");
        assert_forbidden("SELECT 1 /* delete */");
        assert_forbidden("SELECT * FROM logs WHERE msg = 'DROP TABLE users'");
    }

    #[test]
    fn test_identifiers_containing_keywords_allowed() {
        assert!(validate_read_only("SELECT created_at, last_update FROM users").is_ok());
        assert!(validate_read_only("SELECT * FROM pragma_table_info('users')").is_ok());
        assert!(validate_read_only("SELECT replace(name, 'a', 'b') FROM users").is_ok());
    }

    #[test]
    fn test_multiple_statements_rejected() {
        assert_forbidden("SELECT 1; SELECT 2");
        assert!(validate_read_only("SELECT 1;;  ").is_ok());
    }

    #[test]
    fn test_semicolon_inside_literal_allowed() {
        assert!(validate_read_only("SELECT * FROM notes WHERE body = 'a;b'").is_ok());
        assert!(validate_read_only("SELECT 'it''s; fine'").is_ok());
    }

    #[test]
    fn test_non_read_statements_rejected() {
        assert_forbidden("REPLACE INTO users VALUES (1)");
        assert_forbidden("BEGIN");
        assert_forbidden("");
        assert_forbidden("  -- just a comment");
    }

    #[test]
    fn test_leading_comment_stripped() {
        assert_eq!(
            validate_read_only("-- count users\nSELECT 1").unwrap(),
            "SELECT 1"
        );
    }

    #[test]
    fn test_comment_markers_inside_literals_kept() {
        let like = "SELECT name FROM users WHERE name LIKE '%--%'";
        assert_eq!(validate_read_only(like).unwrap(), like);

        let markers = "SELECT '/*' AS open, '*/' AS close";
        assert_eq!(validate_read_only(markers).unwrap(), markers);

        assert_eq!(
            validate_read_only("SELECT \"a--b\", [c/*d] FROM t;").unwrap(),
            "SELECT \"a--b\", [c/*d] FROM t"
        );
    }

    #[test]
    fn test_inner_comments_preserved_trailing_removed() {
        assert_eq!(
            validate_read_only("SELECT 1 /* one */ + 1; -- done").unwrap(),
            "SELECT 1 /* one */ + 1"
        );
        assert_eq!(
            validate_read_only("/* héllo */ SELECT 'é' /* ü */").unwrap(),
            "SELECT 'é'"
        );
    }

    #[test]
    fn test_statement_hidden_behind_comment_rejected() {
        assert_forbidden("SELECT 1; /* then */ SELECT 2");
        assert_forbidden("/* SELECT */ BEGIN");
    }
}
