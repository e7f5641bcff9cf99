//! JSON value model for meshlines datasets.
//!
//! [`JsonValue`] is the in-memory shape of every stored record: a tagged
//! union over null, booleans, signed and unsigned 64-bit integers, doubles,
//! strings, arrays, and insertion-ordered objects. Object key order is
//! preserved through parse and print but does not participate in equality.

pub mod stable_hash;

use indexmap::IndexMap;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// A JSON value stored in a dataset record
///
/// Numbers keep the distinction the parser made: integer literals that fit
/// in an i64 become [`JsonValue::Integer`], larger non-negative literals
/// become [`JsonValue::Unsigned`], everything else becomes
/// [`JsonValue::Float`].
#[derive(Debug, Clone)]
pub enum JsonValue {
    /// JSON null
    Null,
    /// true / false
    Bool(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit unsigned integer that does not fit in an i64
    Unsigned(u64),
    /// 64-bit floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Ordered array of values
    Array(Vec<JsonValue>),
    /// Object with insertion-ordered keys
    Object(IndexMap<String, JsonValue>),
}

impl JsonValue {
    /// Parse a value from JSON text
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Render the value as canonical JSON text
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "null".to_string())
    }

    /// Borrow the fields of an object value
    pub fn as_object(&self) -> Option<&IndexMap<String, JsonValue>> {
        match self {
            JsonValue::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Mutably borrow the fields of an object value
    pub fn as_object_mut(&mut self) -> Option<&mut IndexMap<String, JsonValue>> {
        match self {
            JsonValue::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, JsonValue::Object(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, JsonValue::Null)
    }

    /// Name of the variant, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            JsonValue::Null => "null",
            JsonValue::Bool(_) => "bool",
            JsonValue::Integer(_) => "integer",
            JsonValue::Unsigned(_) => "unsigned",
            JsonValue::Float(_) => "float",
            JsonValue::String(_) => "string",
            JsonValue::Array(_) => "array",
            JsonValue::Object(_) => "object",
        }
    }

    /// Build an object value from key/value pairs
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, JsonValue)>,
    {
        JsonValue::Object(
            fields
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    /// Ordering used by row predicates: numeric across the numeric
    /// variants, lexicographic for strings, false-before-true for booleans.
    /// Values of unrelated kinds do not compare.
    pub fn compare(&self, other: &JsonValue) -> Option<Ordering> {
        use JsonValue::*;

        match (self, other) {
            (Integer(a), Integer(b)) => Some(a.cmp(b)),
            (Unsigned(a), Unsigned(b)) => Some(a.cmp(b)),
            (Integer(a), Unsigned(b)) => Some(compare_i64_u64(*a, *b)),
            (Unsigned(a), Integer(b)) => Some(compare_i64_u64(*b, *a).reverse()),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Integer(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Unsigned(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Unsigned(b)) => a.partial_cmp(&(*b as f64)),
            (String(a), String(b)) => Some(a.cmp(b)),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

fn compare_i64_u64(signed: i64, unsigned: u64) -> Ordering {
    if signed < 0 {
        Ordering::Less
    } else {
        (signed as u64).cmp(&unsigned)
    }
}

/// Equality semantics for join keys and predicates: `Integer` and
/// `Unsigned` holding the same value are equal; `Float` compares only with
/// `Float`; object comparison ignores key order.
impl PartialEq for JsonValue {
    fn eq(&self, other: &Self) -> bool {
        use JsonValue::*;

        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Unsigned(a), Unsigned(b)) => a == b,
            (Integer(a), Unsigned(b)) | (Unsigned(b), Integer(a)) => {
                *a >= 0 && *a as u64 == *b
            }
            (Float(a), Float(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for JsonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<bool> for JsonValue {
    fn from(value: bool) -> Self {
        JsonValue::Bool(value)
    }
}

impl From<i64> for JsonValue {
    fn from(value: i64) -> Self {
        JsonValue::Integer(value)
    }
}

impl From<u64> for JsonValue {
    fn from(value: u64) -> Self {
        if value <= i64::MAX as u64 {
            JsonValue::Integer(value as i64)
        } else {
            JsonValue::Unsigned(value)
        }
    }
}

impl From<f64> for JsonValue {
    fn from(value: f64) -> Self {
        JsonValue::Float(value)
    }
}

impl From<&str> for JsonValue {
    fn from(value: &str) -> Self {
        JsonValue::String(value.to_string())
    }
}

impl From<String> for JsonValue {
    fn from(value: String) -> Self {
        JsonValue::String(value)
    }
}

impl Serialize for JsonValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            JsonValue::Null => serializer.serialize_unit(),
            JsonValue::Bool(value) => serializer.serialize_bool(*value),
            JsonValue::Integer(value) => serializer.serialize_i64(*value),
            JsonValue::Unsigned(value) => serializer.serialize_u64(*value),
            JsonValue::Float(value) => serializer.serialize_f64(*value),
            JsonValue::String(value) => serializer.serialize_str(value),
            JsonValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            JsonValue::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

struct JsonValueVisitor;

impl<'de> Visitor<'de> for JsonValueVisitor {
    type Value = JsonValue;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON value")
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<JsonValue, E> {
        Ok(JsonValue::Bool(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<JsonValue, E> {
        Ok(JsonValue::Integer(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<JsonValue, E> {
        // integer literals land in the signed variant when they fit
        Ok(JsonValue::from(value))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<JsonValue, E> {
        Ok(JsonValue::Float(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<JsonValue, E> {
        Ok(JsonValue::String(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<JsonValue, E> {
        Ok(JsonValue::String(value))
    }

    fn visit_unit<E: de::Error>(self) -> Result<JsonValue, E> {
        Ok(JsonValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<JsonValue, E> {
        Ok(JsonValue::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<JsonValue, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(JsonValueVisitor)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<JsonValue, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(JsonValue::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<JsonValue, A::Error>
    where
        A: MapAccess<'de>,
    {
        // entries arrive in document order, which the IndexMap preserves
        let mut fields = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, JsonValue>()? {
            fields.insert(key, value);
        }
        Ok(JsonValue::Object(fields))
    }
}

impl<'de> Deserialize<'de> for JsonValue {
    fn deserialize<D>(deserializer: D) -> Result<JsonValue, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(JsonValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_preserves_object_key_order() {
        let value = JsonValue::parse(r#"{"z":1,"a":2,"m":3}"#).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["z", "a", "m"]);
        assert_eq!(value.to_text(), r#"{"z":1,"a":2,"m":3}"#);
    }

    #[test]
    fn object_equality_ignores_key_order() {
        let a = JsonValue::parse(r#"{"x":1,"y":"s"}"#).unwrap();
        let b = JsonValue::parse(r#"{"y":"s","x":1}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn integer_kinds_compare_numerically() {
        assert_eq!(JsonValue::Integer(7), JsonValue::Unsigned(7));
        assert_ne!(JsonValue::Integer(-1), JsonValue::Unsigned(u64::MAX));
        assert_ne!(JsonValue::Integer(1), JsonValue::Float(1.0));
    }

    #[test]
    fn large_literals_become_unsigned() {
        let text = format!("{}", u64::MAX);
        let value = JsonValue::parse(&text).unwrap();
        assert!(matches!(value, JsonValue::Unsigned(u64::MAX)));

        let value = JsonValue::parse("42").unwrap();
        assert!(matches!(value, JsonValue::Integer(42)));
    }

    #[test]
    fn compare_spans_numeric_variants() {
        use std::cmp::Ordering;

        let lt = JsonValue::Integer(-3).compare(&JsonValue::Unsigned(2));
        assert_eq!(lt, Some(Ordering::Less));
        let gt = JsonValue::Float(2.5).compare(&JsonValue::Integer(2));
        assert_eq!(gt, Some(Ordering::Greater));
        assert_eq!(JsonValue::from("a").compare(&JsonValue::Integer(1)), None);
    }

    #[test]
    fn roundtrip_keeps_value_shape() {
        let text = r#"{"k":1,"arr":[1,2.5,"x",null],"nested":{"b":true}}"#;
        let value = JsonValue::parse(text).unwrap();
        assert_eq!(value.to_text(), text);
    }
}
