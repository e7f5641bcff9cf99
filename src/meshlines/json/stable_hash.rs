//! Rank-stable hashing over JSON values.
//!
//! Every rank must compute bit-identical hashes for equal values, so the
//! scheme avoids anything process- or platform-dependent: leaves are FNV-1a
//! over the value's raw bytes, composites fold their parts with the
//! golden-ratio combiner. Both constants are frozen as part of the wire
//! contract between ranks.

use super::JsonValue;
use indexmap::IndexMap;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hash contributed by a null value
const NULL_SENTINEL: u64 = 0x9e37_79b9_7f4a_7c15;

/// FNV-1a over a byte slice
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Fold one component into a running seed
pub fn combine(seed: u64, component: u64) -> u64 {
    seed ^ component
        .wrapping_add(0x9e37_79b9)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

/// Hash of a single JSON value
///
/// `Integer` and `Unsigned` hash their 64-bit pattern, so the same
/// non-negative number hashes identically in either variant, matching
/// [`JsonValue`] equality. Floats hash their IEEE bit pattern. Object
/// fields are folded in insertion order; array elements in sequence order,
/// with no extra position term beyond the seed threading.
pub fn hash_value(value: &JsonValue) -> u64 {
    match value {
        JsonValue::Null => NULL_SENTINEL,
        JsonValue::Bool(v) => hash_bytes(&[u8::from(*v)]),
        JsonValue::Integer(v) => hash_bytes(&v.to_le_bytes()),
        JsonValue::Unsigned(v) => hash_bytes(&v.to_le_bytes()),
        JsonValue::Float(v) => hash_bytes(&v.to_bits().to_le_bytes()),
        JsonValue::String(v) => hash_bytes(v.as_bytes()),
        JsonValue::Array(items) => {
            let mut seed = 0u64;
            for item in items {
                seed = combine(seed, hash_value(item));
            }
            seed
        }
        JsonValue::Object(fields) => {
            let mut seed = 0u64;
            for (key, value) in fields {
                seed = combine(seed, hash_bytes(key.as_bytes()));
                seed = combine(seed, hash_value(value));
            }
            seed
        }
    }
}

/// Hash of a record restricted to the named columns
///
/// Columns absent from the record contribute nothing at all, they are not
/// folded in as null.
pub fn hash_row(row: &IndexMap<String, JsonValue>, columns: &[String]) -> u64 {
    let mut seed = 0u64;
    for column in columns {
        if let Some(value) = row.get(column) {
            seed = combine(seed, hash_value(value));
        }
    }
    seed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(text: &str) -> JsonValue {
        JsonValue::parse(text).unwrap()
    }

    #[test]
    fn equal_values_hash_equal() {
        let a = row(r#"{"k":[1,"x",{"n":null}]}"#);
        let b = row(r#"{"k":[1,"x",{"n":null}]}"#);
        assert_eq!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn signed_and_unsigned_same_value_hash_equal() {
        assert_eq!(
            hash_value(&JsonValue::Integer(123)),
            hash_value(&JsonValue::Unsigned(123))
        );
    }

    #[test]
    fn array_order_changes_the_hash() {
        let a = row("[1,2]");
        let b = row("[2,1]");
        assert_ne!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn absent_columns_contribute_nothing() {
        let full = row(r#"{"k":1,"other":"ignored"}"#);
        let sparse = row(r#"{"k":1}"#);
        let columns = vec!["k".to_string(), "missing".to_string()];

        assert_eq!(
            hash_row(full.as_object().unwrap(), &columns),
            hash_row(sparse.as_object().unwrap(), &columns),
        );
    }

    #[test]
    fn column_order_matters() {
        let record = row(r#"{"a":1,"b":2}"#);
        let fields = record.as_object().unwrap();
        let ab = vec!["a".to_string(), "b".to_string()];
        let ba = vec!["b".to_string(), "a".to_string()];
        assert_ne!(hash_row(fields, &ab), hash_row(fields, &ba));
    }
}
