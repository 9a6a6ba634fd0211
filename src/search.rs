//! Free-text search over rows that have already been fetched.

use serde_json::Value;

use crate::normalize::Record;

/// Keep rows where any value's text form contains `term`, ignoring case.
/// A blank term keeps every row.
pub fn filter_rows(rows: Vec<Record>, term: &str) -> Vec<Record> {
    if term.trim().is_empty() {
        return rows;
    }
    let needle = term.to_lowercase();
    rows.into_iter()
        .filter(|row| row.values().any(|v| text_of(v).to_lowercase().contains(&needle)))
        .collect()
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
