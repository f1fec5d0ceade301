use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

/// SQLite is dynamically typed, so a REAL column can still hold text.
/// Hand the cell over as JSON and let geofence validation decide.
pub fn sql_to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_in_numeric_column_survives_as_string() {
        assert_eq!(sql_to_json(SqlValue::Text("abc".into())), Value::String("abc".into()));
        assert_eq!(sql_to_json(SqlValue::Real(25.5)), Value::from(25.5));
        assert_eq!(sql_to_json(SqlValue::Integer(3)), Value::from(3));
    }
}
