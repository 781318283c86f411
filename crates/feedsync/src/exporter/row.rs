//! Typed row values
//!
//! Raw JSON records are coerced into [`Value`]s by column kind before they
//! reach an exporter. Each kind has one storage representation shared by every
//! dialect:
//!
//! | Kind | Stored as |
//! |---|---|
//! | Text | text |
//! | Integer, Boolean | 64-bit integer (booleans as 0/1) |
//! | Float | double |
//! | Timestamp | fixed-width UTC text, see [`feedsync_common::timestamp`] |

use chrono::{DateTime, Utc};
use feedsync_common::timestamp;
use serde_json::Value as Json;

use crate::feed::descriptor::ColumnKind;

/// A row aligned with its descriptor's `columns`
pub type Row = Vec<Value>;

/// One cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

/// A value in the form it is bound to a statement
#[derive(Debug, Clone, PartialEq)]
pub enum Stored {
    Text(Option<String>),
    Integer(Option<i64>),
    Float(Option<f64>),
}

impl Value {
    /// Coerce a JSON value into `kind`. The error is a reason, not yet tied to a column.
    pub fn from_json(json: &Json, kind: ColumnKind) -> std::result::Result<Value, String> {
        if json.is_null() {
            return Ok(Value::Null);
        }

        match kind {
            ColumnKind::Text => Ok(Value::Text(match json {
                Json::String(s) => s.clone(),
                other => other.to_string(),
            })),
            ColumnKind::Integer => match json {
                Json::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f.round() as i64))
                    .map(Value::Integer)
                    .ok_or_else(|| format!("{} is out of range", n)),
                Json::Bool(b) => Ok(Value::Integer(i64::from(*b))),
                Json::String(s) if s.trim().is_empty() => Ok(Value::Null),
                Json::String(s) => s
                    .trim()
                    .parse()
                    .map(Value::Integer)
                    .map_err(|_| format!("'{}' is not an integer", s)),
                other => Err(format!("expected an integer, got {}", other)),
            },
            ColumnKind::Float => match json {
                Json::Number(n) => n
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| format!("{} is not a float", n)),
                Json::String(s) if s.trim().is_empty() => Ok(Value::Null),
                Json::String(s) => s
                    .trim()
                    .parse()
                    .map(Value::Float)
                    .map_err(|_| format!("'{}' is not a number", s)),
                other => Err(format!("expected a number, got {}", other)),
            },
            ColumnKind::Boolean => match json {
                Json::Bool(b) => Ok(Value::Boolean(*b)),
                Json::Number(n) => Ok(Value::Boolean(n.as_f64().is_some_and(|f| f != 0.0))),
                Json::String(s) => match s.trim().to_lowercase().as_str() {
                    "true" | "1" | "yes" => Ok(Value::Boolean(true)),
                    "false" | "0" | "no" => Ok(Value::Boolean(false)),
                    "" => Ok(Value::Null),
                    _ => Err(format!("'{}' is not a boolean", s)),
                },
                other => Err(format!("expected a boolean, got {}", other)),
            },
            ColumnKind::Timestamp => match json {
                Json::String(s) if s.trim().is_empty() => Ok(Value::Null),
                Json::String(s) => timestamp::parse(s)
                    .map(Value::Timestamp)
                    .map_err(|e| e.to_string()),
                other => Err(format!("expected a timestamp, got {}", other)),
            },
        }
    }

    /// Bind form for a column of `kind`. NULLs keep the column's type.
    pub fn to_stored(&self, kind: ColumnKind) -> Stored {
        match kind {
            ColumnKind::Text | ColumnKind::Timestamp => Stored::Text(self.as_text()),
            ColumnKind::Integer | ColumnKind::Boolean => Stored::Integer(match self {
                Value::Integer(i) => Some(*i),
                Value::Boolean(b) => Some(i64::from(*b)),
                Value::Float(f) => Some(f.round() as i64),
                _ => None,
            }),
            ColumnKind::Float => Stored::Float(match self {
                Value::Float(f) => Some(*f),
                Value::Integer(i) => Some(*i as f64),
                _ => None,
            }),
        }
    }

    /// Rebuild a value read back from storage
    pub fn from_stored(stored: Stored, kind: ColumnKind) -> Value {
        match (stored, kind) {
            (Stored::Text(None), _) | (Stored::Integer(None), _) | (Stored::Float(None), _) => {
                Value::Null
            },
            (Stored::Text(Some(s)), ColumnKind::Timestamp) => match timestamp::parse(&s) {
                Ok(ts) => Value::Timestamp(ts),
                Err(_) => Value::Text(s),
            },
            (Stored::Text(Some(s)), _) => Value::Text(s),
            (Stored::Integer(Some(i)), ColumnKind::Boolean) => Value::Boolean(i != 0),
            (Stored::Integer(Some(i)), _) => Value::Integer(i),
            (Stored::Float(Some(f)), _) => Value::Float(f),
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Timestamp(ts) => Some(timestamp::format(ts)),
        }
    }

    /// Text used to compare keys within a batch
    pub fn key_text(&self) -> String {
        self.as_text().unwrap_or_default()
    }

    /// Field text in a CSV file. NULL is an empty field.
    pub fn to_csv_field(&self) -> String {
        match self {
            Value::Timestamp(ts) => ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            other => other.as_text().unwrap_or_default(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_text_coercion() {
        assert_eq!(
            Value::from_json(&json!("abc"), ColumnKind::Text).unwrap(),
            Value::Text("abc".to_string())
        );
        assert_eq!(
            Value::from_json(&json!(42), ColumnKind::Text).unwrap(),
            Value::Text("42".to_string())
        );
        assert_eq!(
            Value::from_json(&json!([{"name": "Ops"}]), ColumnKind::Text).unwrap(),
            Value::Text(r#"[{"name":"Ops"}]"#.to_string())
        );
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(
            Value::from_json(&json!("17"), ColumnKind::Integer).unwrap(),
            Value::Integer(17)
        );
        assert_eq!(
            Value::from_json(&json!(2.6), ColumnKind::Integer).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            Value::from_json(&json!(3), ColumnKind::Float).unwrap(),
            Value::Float(3.0)
        );
        assert!(Value::from_json(&json!("x"), ColumnKind::Float).is_err());
        assert!(Value::from_json(&json!({"a": 1}), ColumnKind::Integer).is_err());
    }

    #[test]
    fn test_boolean_coercion() {
        assert_eq!(
            Value::from_json(&json!("TRUE"), ColumnKind::Boolean).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            Value::from_json(&json!(0), ColumnKind::Boolean).unwrap(),
            Value::Boolean(false)
        );
        assert!(Value::from_json(&json!("maybe"), ColumnKind::Boolean).is_err());
    }

    #[test]
    fn test_timestamp_coercion() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 29, 6, 0, 0).unwrap();
        assert_eq!(
            Value::from_json(&json!("2024-02-29T06:00:00.000Z"), ColumnKind::Timestamp).unwrap(),
            Value::Timestamp(ts)
        );
        assert_eq!(
            Value::from_json(&json!(""), ColumnKind::Timestamp).unwrap(),
            Value::Null
        );
        assert!(Value::from_json(&json!(12), ColumnKind::Timestamp).is_err());
    }

    #[test]
    fn test_stored_forms_keep_type_for_null() {
        assert_eq!(Value::Null.to_stored(ColumnKind::Integer), Stored::Integer(None));
        assert_eq!(Value::Null.to_stored(ColumnKind::Float), Stored::Float(None));
        assert_eq!(Value::Boolean(true).to_stored(ColumnKind::Boolean), Stored::Integer(Some(1)));
    }

    #[test]
    fn test_stored_timestamp_round_trip() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 29, 6, 0, 0).unwrap();
        let stored = Value::Timestamp(ts).to_stored(ColumnKind::Timestamp);
        assert_eq!(stored, Stored::Text(Some("2024-02-29T06:00:00.000000Z".to_string())));
        assert_eq!(
            Value::from_stored(stored, ColumnKind::Timestamp),
            Value::Timestamp(ts)
        );
    }

    #[test]
    fn test_csv_fields() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 29, 6, 0, 0).unwrap();
        assert_eq!(Value::Timestamp(ts).to_csv_field(), "2024-02-29T06:00:00.000Z");
        assert_eq!(Value::Null.to_csv_field(), "");
        assert_eq!(Value::Boolean(false).to_csv_field(), "false");
    }
}
