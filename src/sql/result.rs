//! Query results and their rendering as observations

use serde::Serialize;
use serde_json::{Map, Value};

/// One result row, column name to value, in select-list order
pub type Row = Map<String, Value>;

/// Outcome of a guarded tool execution, fed back to the oracle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryResult {
    Rows {
        columns: Vec<String>,
        rows: Vec<Row>,
        truncated: bool,
    },
    /// Metadata answers (table lists, schemas, checker verdicts)
    Text { text: String },
    Error { message: String },
}

impl QueryResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Rows { truncated: true, .. })
    }

    pub fn row_count(&self) -> usize {
        match self {
            Self::Rows { rows, .. } => rows.len(),
            _ => 0,
        }
    }

    /// Render for the transcript, capped at `max_chars` characters
    pub fn to_observation(&self, max_chars: usize) -> String {
        let rendered = match self {
            Self::Rows { rows, truncated, .. } => {
                if rows.is_empty() {
                    "Query returned no rows.".to_string()
                } else {
                    let body = serde_json::to_string(rows).unwrap_or_else(|_| "[]".to_string());
                    if *truncated {
                        format!(
                            "{}\n[results truncated to the first {} rows; refine the query with a LIMIT or aggregate]",
                            body,
                            rows.len()
                        )
                    } else {
                        body
                    }
                }
            }
            Self::Text { text } => text.clone(),
            Self::Error { message } => format!("Error: {}", message),
        };
        truncate_chars(rendered, max_chars)
    }
}

fn truncate_chars(mut text: String, max_chars: usize) -> String {
    if let Some((cut, _)) = text.char_indices().nth(max_chars) {
        text.truncate(cut);
        text.push_str("\n... [observation truncated]");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(count: i64) -> Row {
        let mut row = Row::new();
        row.insert("count".to_string(), json!(count));
        row
    }

    #[test]
    fn test_rows_observation() {
        let result = QueryResult::Rows {
            columns: vec!["count".to_string()],
            rows: vec![row(42)],
            truncated: false,
        };
        assert_eq!(result.to_observation(1000), r#"[{"count":42}]"#);
        assert_eq!(result.row_count(), 1);
        assert!(!result.is_truncated());
    }

    #[test]
    fn test_truncated_rows_are_flagged() {
        let result = QueryResult::Rows {
            columns: vec!["count".to_string()],
            rows: vec![row(1), row(2)],
            truncated: true,
        };
        let observation = result.to_observation(1000);
        assert!(observation.contains("truncated to the first 2 rows"));
    }

    #[test]
    fn test_empty_rows() {
        let result = QueryResult::Rows {
            columns: vec![],
            rows: vec![],
            truncated: false,
        };
        assert_eq!(result.to_observation(100), "Query returned no rows.");
    }

    #[test]
    fn test_error_observation() {
        let result = QueryResult::error("no such table: userz");
        assert!(result.is_error());
        assert_eq!(result.to_observation(100), "Error: no such table: userz");
    }

    #[test]
    fn test_observation_char_cap() {
        let result = QueryResult::text("é".repeat(50));
        let observation = result.to_observation(10);
        assert!(observation.starts_with(&"é".repeat(10)));
        assert!(observation.ends_with("[observation truncated]"));
    }

    #[test]
    fn test_column_order_preserved() {
        let mut row = Row::new();
        row.insert("zeta".to_string(), json!(1));
        row.insert("alpha".to_string(), json!(2));
        let result = QueryResult::Rows {
            columns: vec!["zeta".to_string(), "alpha".to_string()],
            rows: vec![row],
            truncated: false,
        };
        assert_eq!(result.to_observation(100), r#"[{"zeta":1,"alpha":2}]"#);
    }
}
