//! The dynamic cell and parameter type shared by the ORM, the filters and
//! the renderer.
//!
//! Stored template filters are JSON objects, so [`Value`] converts to and
//! from plain JSON as well as serializing in a tagged form of its own.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// One database value.
///
/// ```
/// use flex_report_db::value::Value;
///
/// assert_eq!(Value::from(42), Value::Int(42));
/// assert_eq!(Value::from(None::<i64>), Value::Null);
/// assert_eq!(Value::from("Ann").to_string(), "Ann");
/// ```
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    /// A naive timestamp, as SQLite stores it.
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<Utc>),
    Time(NaiveTime),
    Uuid(uuid::Uuid),
    /// A JSON document; JSON arrays become [`Value::List`] instead.
    Json(serde_json::Value),
    /// Parameters of an `IN` lookup, or the keys of a relation filter.
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Self::Date(v) => write!(f, "{v}"),
            Self::DateTime(v) => write!(f, "{v}"),
            Self::DateTimeTz(v) => write!(f, "{v}"),
            Self::Time(v) => write!(f, "{v}"),
            Self::Uuid(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    f64 => Float,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
    DateTime<Utc> => DateTimeTz,
    NaiveTime => Time,
    uuid::Uuid => Uuid,
    serde_json::Value => Json,
    Vec<Value> => List,
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_int(&self) -> Option<i64> {
        if let Self::Int(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub const fn as_float(&self) -> Option<f64> {
        if let Self::Float(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Self::String(v) = self {
            Some(v)
        } else {
            None
        }
    }

    /// Whether a filter treats this value as given.
    ///
    /// Null, `false`, zero and empty text, bytes, lists or JSON documents
    /// count as not given.
    ///
    /// ```
    /// use flex_report_db::value::Value;
    ///
    /// assert!(!Value::Int(0).is_truthy());
    /// assert!(!Value::from("").is_truthy());
    /// assert!(Value::from("x").is_truthy());
    /// ```
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(v) => *v,
            Self::Int(_) | Self::Float(_) => !self.is_zero(),
            Self::String(v) => !v.is_empty(),
            Self::Bytes(v) => !v.is_empty(),
            Self::List(v) => !v.is_empty(),
            Self::Json(v) => json_truthy(v),
            Self::Date(_) | Self::DateTime(_) | Self::DateTimeTz(_) | Self::Time(_) | Self::Uuid(_) => true,
        }
    }

    /// `true` for integer or float zero only.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Int(v) => *v == 0,
            Self::Float(v) => *v == 0.0,
            _ => false,
        }
    }

    /// Plain JSON for storage. Temporal values and UUIDs become strings,
    /// byte strings become arrays of numbers.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Null => Json::Null,
            Self::Bool(v) => Json::Bool(*v),
            Self::Int(v) => Json::from(*v),
            Self::Float(v) => Json::from(*v),
            Self::String(v) => Json::String(v.clone()),
            Self::Bytes(v) => Json::from(v.clone()),
            Self::Json(v) => v.clone(),
            Self::List(items) => items.iter().map(Self::to_json).collect(),
            Self::Date(_) | Self::DateTime(_) | Self::DateTimeTz(_) | Self::Time(_) | Self::Uuid(_) => {
                Json::String(self.to_string())
            }
        }
    }

    /// Reads plain JSON back. Integral numbers become `Int`, arrays become
    /// `List` and objects stay `Json`.
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Self::Null,
            Json::Bool(v) => Self::Bool(*v),
            Json::Number(n) => n.as_i64().map_or_else(|| Self::Float(n.as_f64().unwrap_or_default()), Self::Int),
            Json::String(v) => Self::String(v.clone()),
            Json::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Json::Object(_) => Self::Json(json.clone()),
        }
    }
}

fn json_truthy(json: &serde_json::Value) -> bool {
    use serde_json::Value as Json;
    match json {
        Json::Null => false,
        Json::Bool(v) => *v,
        Json::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Json::String(v) => !v.is_empty(),
        Json::Array(v) => !v.is_empty(),
        Json::Object(v) => !v.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions_pick_the_variant() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(Value::from(7_i32), Value::Int(7));
        assert_eq!(Value::from(0.5), Value::Float(0.5));
        assert_eq!(Value::from(String::from("a")), Value::from("a"));
        assert_eq!(Value::from(day), Value::Date(day));
        assert_eq!(Value::from(Some(true)), Value::Bool(true));
        assert_eq!(Value::from(None::<NaiveDate>), Value::Null);
        assert_eq!(Value::from(vec![Value::Int(1)]), Value::List(vec![Value::Int(1)]));
    }

    #[test]
    fn test_display_is_the_cell_text() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(14, 30, 0).unwrap();
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Float(7.0).to_string(), "7");
        assert_eq!(Value::Float(12.5).to_string(), "12.5");
        assert_eq!(Value::DateTime(at).to_string(), "2024-03-05 14:30:00");
        assert_eq!(Value::Bytes(vec![1, 2, 3]).to_string(), "<3 bytes>");
        assert_eq!(Value::List(vec![Value::Int(1), Value::from("b")]).to_string(), "[1, b]");
        assert_eq!(Value::List(vec![]).to_string(), "[]");
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Int(3).as_int(), Some(3));
        assert_eq!(Value::Float(3.0).as_int(), None);
        assert_eq!(Value::Float(1.5).as_float(), Some(1.5));
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert!(Value::Null.is_null());
        assert!(!Value::Int(0).is_null());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(!Value::Json(serde_json::json!({})).is_truthy());
        assert!(!Value::Json(serde_json::json!(0)).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).is_truthy());
        assert!(!Value::from("0").is_zero());
    }

    #[test]
    fn test_stored_filters_read_back_from_json() {
        let json = serde_json::json!({"ids__in": [1, 2], "name": "x", "active": true, "ratio": 0.5});
        let Value::Json(ref obj) = Value::from_json(&json) else {
            panic!("objects stay JSON");
        };
        assert_eq!(Value::from_json(&obj["ids__in"]), Value::List(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(Value::from_json(&obj["ratio"]), Value::Float(0.5));
        assert_eq!(Value::from_json(&obj["active"]), Value::Bool(true));

        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(Value::Date(day).to_json(), serde_json::json!("2024-01-15"));
        assert_eq!(Value::List(vec![Value::Int(1), Value::Null]).to_json(), serde_json::json!([1, null]));
    }

    #[test]
    fn test_serde_is_tagged() {
        assert_eq!(
            serde_json::to_value(Value::Int(3)).unwrap(),
            serde_json::json!({"type": "Int", "value": 3})
        );
        assert_eq!(serde_json::to_value(Value::Null).unwrap(), serde_json::json!({"type": "Null"}));
        let back: Value = serde_json::from_value(serde_json::json!({"type": "String", "value": "a"})).unwrap();
        assert_eq!(back, Value::from("a"));
    }
}
