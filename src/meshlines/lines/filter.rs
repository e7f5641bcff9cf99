//! Row-selection predicates.
//!
//! A dataset handle may carry a `selected` list; each entry compares one
//! field of the record against a literal. A row is selected when every
//! predicate holds. Two virtual fields are resolvable when the record
//! itself has no field of that name: `rowid` (the local row number) and
//! `rank` (the rank holding the row).

use indexmap::IndexMap;
use serde::Deserialize;

use crate::meshlines::json::JsonValue;

/// Comparison applied by a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// The record itself has the field
    Exists,
    /// The record itself lacks the field
    Missing,
}

/// One condition over a record field
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RowPredicate {
    pub field: String,
    pub op: CompareOp,
    #[serde(default)]
    pub value: Option<JsonValue>,
}

impl RowPredicate {
    /// Evaluate against one record
    pub fn matches(&self, row: &IndexMap<String, JsonValue>, rownum: usize, rank: usize) -> bool {
        match self.op {
            CompareOp::Exists => return row.contains_key(&self.field),
            CompareOp::Missing => return !row.contains_key(&self.field),
            _ => {}
        }

        let looked_up = lookup(row, &self.field, rownum, rank);
        let literal = self.value.clone().unwrap_or(JsonValue::Null);

        match self.op {
            CompareOp::Eq => looked_up == literal,
            CompareOp::Ne => looked_up != literal,
            CompareOp::Lt => matches!(
                looked_up.compare(&literal),
                Some(std::cmp::Ordering::Less)
            ),
            CompareOp::Le => matches!(
                looked_up.compare(&literal),
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            ),
            CompareOp::Gt => matches!(
                looked_up.compare(&literal),
                Some(std::cmp::Ordering::Greater)
            ),
            CompareOp::Ge => matches!(
                looked_up.compare(&literal),
                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
            ),
            CompareOp::Exists | CompareOp::Missing => unreachable!("handled above"),
        }
    }
}

/// Field lookup with virtual-field fallback; absent fields read as null
fn lookup(row: &IndexMap<String, JsonValue>, field: &str, rownum: usize, rank: usize) -> JsonValue {
    if let Some(value) = row.get(field) {
        return value.clone();
    }

    match field {
        "rowid" => JsonValue::Integer(rownum as i64),
        "rank" => JsonValue::Integer(rank as i64),
        _ => JsonValue::Null,
    }
}

/// True when every predicate selects the row
pub fn row_selected(
    predicates: &[RowPredicate],
    row: &IndexMap<String, JsonValue>,
    rownum: usize,
    rank: usize,
) -> bool {
    predicates
        .iter()
        .all(|predicate| predicate.matches(row, rownum, rank))
}
