//! Insertion-ordered document type.

use mongodb::bson;

use super::value::Value;

/// Store-internal identity field. Never carried from one store to another.
pub const INTERNAL_ID_FIELD: &str = "_id";

/// Placeholder used in logs when a document has no domain identity.
const UNKNOWN_IDENTITY: &str = "unknown";

/// A schema-flexible document: field name to [`Value`], in insertion order.
///
/// Field order is preserved through reads and writes so migrated records
/// look the same in both stores. Lookups are linear, which is fine for the
/// few dozen fields a subscriber record carries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of top-level fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Get a field value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Get a field as a string slice, if it is a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Check whether a field is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace a field, returning the previous value.
    /// New fields are appended; replaced fields keep their position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(idx).1)
    }

    /// Iterate over fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate over field names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Remove the store-internal identity field, if present.
    pub fn strip_identity(&mut self) -> Option<Value> {
        self.remove(INTERNAL_ID_FIELD)
    }

    /// Domain identity as text (e.g. `hashMsisdn`), if the field is set.
    #[must_use]
    pub fn identity(&self, field: &str) -> Option<String> {
        self.get(field)
            .filter(|v| !v.is_null())
            .map(Value::to_display_string)
    }

    /// Domain identity truncated to `max_chars` for log lines.
    #[must_use]
    pub fn identity_prefix(&self, field: &str, max_chars: usize) -> String {
        match self.identity(field) {
            Some(id) => truncate(&id, max_chars),
            None => UNKNOWN_IDENTITY.to_string(),
        }
    }

    /// Convert to a `serde_json` object map.
    #[must_use]
    pub fn to_json_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }

    /// Convert to a `serde_json` object value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(self.to_json_map())
    }

    /// Build from a `serde_json` object map.
    #[must_use]
    pub fn from_json_map(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            fields: map.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect(),
        }
    }

    /// Build from a `serde_json` value. Non-object values yield `None`.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        json.as_object().map(Self::from_json_map)
    }

    /// Convert to a BSON document.
    #[must_use]
    pub fn to_bson(&self) -> bson::Document {
        let mut doc = bson::Document::new();
        for (k, v) in &self.fields {
            doc.insert(k.clone(), v.to_bson());
        }
        doc
    }
}

impl From<bson::Document> for Document {
    fn from(doc: bson::Document) -> Self {
        Self {
            fields: doc.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.insert(k, v);
        }
        doc
    }
}

impl std::fmt::Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Truncate on a char boundary, appending `...` when shortened.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn subscriber() -> Document {
        Document::from(doc! {
            "_id": mongodb::bson::oid::ObjectId::new(),
            "hashMsisdn": "9010C99CA6247F5B0EF606AB8A9C6F1BF38E0F65A788FA02B47DD50569C963FA",
            "provider": "VODAFONE",
            "circleID": "0015",
        })
    }

    #[test]
    fn test_strip_identity() {
        let mut doc = subscriber();
        assert!(doc.contains_key("_id"));
        assert!(doc.strip_identity().is_some());
        assert!(!doc.contains_key("_id"));
        assert!(doc.strip_identity().is_none());
        assert_eq!(doc.len(), 3);
    }

    #[test]
    fn test_field_order_preserved() {
        let mut doc = subscriber();
        doc.strip_identity();
        let keys: Vec<_> = doc.keys().collect();
        assert_eq!(keys, vec!["hashMsisdn", "provider", "circleID"]);

        let json = doc.to_json();
        let json_keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(json_keys, vec!["hashMsisdn", "provider", "circleID"]);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut doc: Document = [("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(doc.insert("a", 10), Some(Value::Int(1)));
        let keys: Vec<_> = doc.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(doc.get("a"), Some(&Value::Int(10)));
    }

    #[test]
    fn test_identity_prefix() {
        let doc = subscriber();
        assert_eq!(doc.identity_prefix("hashMsisdn", 16), "9010C99CA6247F5B...");
        assert_eq!(doc.identity_prefix("missing", 16), "unknown");

        let short: Document = [("hashMsisdn", "ABC")].into_iter().collect();
        assert_eq!(short.identity_prefix("hashMsisdn", 16), "ABC");
    }

    #[test]
    fn test_null_identity_is_absent() {
        let doc: Document = [("hashMsisdn", Value::Null)].into_iter().collect();
        assert_eq!(doc.identity("hashMsisdn"), None);
    }

    #[test]
    fn test_bson_roundtrip_keeps_values() {
        let mut doc = subscriber();
        doc.strip_identity();
        let back = Document::from(doc.to_bson());
        assert_eq!(back, doc);
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("ééééé", 2), "éé...");
    }
}
