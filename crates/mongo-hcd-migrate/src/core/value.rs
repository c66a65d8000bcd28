//! Schema-flexible value type shared by both document stores.
//!
//! Subscriber records are not bound to a fixed schema, so a field value is a
//! tagged union mirroring what JSON-like stores can hold. Conversions to and
//! from BSON (MongoDB) and `serde_json` (Data API) live here so the rest of
//! the pipeline never touches store-specific representations.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use mongodb::bson::Bson;

use super::document::Document;

/// A single field value inside a [`Document`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Explicit null (also used for BSON min/max keys and `undefined`).
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// 64-bit signed integer. BSON int32/int64 both land here.
    Int(i64),

    /// 64-bit floating point.
    Float(f64),

    /// UTF-8 string.
    String(String),

    /// Ordered sequence of values.
    Array(Vec<Value>),

    /// Nested document.
    Object(Document),
}

impl Value {
    /// Check if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the inner string, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the inner array, if this is an array value.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow the inner document, if this is an object value.
    #[must_use]
    pub fn as_object(&self) -> Option<&Document> {
        match self {
            Value::Object(doc) => Some(doc),
            _ => None,
        }
    }

    /// Render the value as plain text for identity lookups and log lines.
    ///
    /// Strings are returned verbatim; other scalars use their JSON form.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_json().to_string(),
        }
    }

    /// Convert into a `serde_json` value for the Data API.
    ///
    /// Non-finite floats have no JSON representation and become `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(doc) => serde_json::Value::Object(doc.to_json_map()),
        }
    }

    /// Convert into a BSON value for MongoDB.
    #[must_use]
    pub fn to_bson(&self) -> Bson {
        match self {
            Value::Null => Bson::Null,
            Value::Bool(b) => Bson::Boolean(*b),
            Value::Int(i) => Bson::Int64(*i),
            Value::Float(f) => Bson::Double(*f),
            Value::String(s) => Bson::String(s.clone()),
            Value::Array(items) => Bson::Array(items.iter().map(Value::to_bson).collect()),
            Value::Object(doc) => Bson::Document(doc.to_bson()),
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                // u64 above i64::MAX and real numbers
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::Array(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => Value::Object(Document::from_json_map(map)),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from(&json)
    }
}

impl From<Bson> for Value {
    fn from(bson: Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined | Bson::MinKey | Bson::MaxKey => Value::Null,
            Bson::Boolean(b) => Value::Bool(b),
            Bson::Int32(i) => Value::Int(i64::from(i)),
            Bson::Int64(i) => Value::Int(i),
            Bson::Double(f) => Value::Float(f),
            Bson::String(s) => Value::String(s),
            Bson::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Bson::Document(doc) => Value::Object(Document::from(doc)),
            Bson::ObjectId(oid) => Value::String(oid.to_hex()),
            Bson::DateTime(dt) => Value::String(
                dt.try_to_rfc3339_string()
                    .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
            ),
            Bson::Decimal128(d) => Value::String(d.to_string()),
            Bson::Binary(bin) => Value::String(BASE64.encode(&bin.bytes)),
            Bson::Timestamp(ts) => Value::Int(i64::from(ts.time)),
            Bson::Symbol(s) => Value::String(s),
            Bson::JavaScriptCode(code) => Value::String(code),
            other => Value::String(other.to_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, oid::ObjectId, Binary};

    #[test]
    fn test_json_numbers() {
        assert_eq!(Value::from(serde_json::json!(42)), Value::Int(42));
        assert_eq!(Value::from(serde_json::json!(1.5)), Value::Float(1.5));
        assert_eq!(
            Value::from(serde_json::json!(u64::MAX)),
            Value::Float(u64::MAX as f64)
        );
    }

    #[test]
    fn test_non_finite_float_becomes_null() {
        assert_eq!(Value::Float(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(Value::Float(f64::INFINITY).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_bson_object_id_becomes_hex() {
        let oid = ObjectId::new();
        assert_eq!(Value::from(Bson::ObjectId(oid)), Value::String(oid.to_hex()));
    }

    #[test]
    fn test_bson_binary_is_base64() {
        let bin = Binary {
            subtype: mongodb::bson::spec::BinarySubtype::Generic,
            bytes: vec![1, 2, 3],
        };
        assert_eq!(Value::from(Bson::Binary(bin)), Value::String("AQID".into()));
    }

    #[test]
    fn test_bson_int32_widens() {
        assert_eq!(Value::from(Bson::Int32(-7)), Value::Int(-7));
    }

    #[test]
    fn test_nested_bson_document() {
        let bson = Bson::Document(doc! {
            "product": [{ "id": "26111350", "status": "A" }],
            "services": [],
        });
        let value = Value::from(bson);
        let offering = value.as_object().unwrap();
        let products = offering.get("product").and_then(Value::as_array).unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(
            products[0].as_object().unwrap().get_str("id"),
            Some("26111350")
        );
        assert_eq!(offering.get("services").and_then(Value::as_array).map(<[Value]>::len), Some(0));
    }

    #[test]
    fn test_display_string() {
        assert_eq!(Value::from("0015").to_display_string(), "0015");
        assert_eq!(Value::Int(15).to_display_string(), "15");
        assert_eq!(Value::Null.to_display_string(), "null");
    }
}
