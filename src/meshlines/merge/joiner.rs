//! Phase 4: the local join.
//!
//! Every payload bundle pairs left rows this rank owns with materialised
//! right values. Hash equality got them here, so each pair is re-verified
//! field by field before a joined record is appended; a missing join key or
//! unequal values is a silent non-match, never an error.

use indexmap::IndexMap;

use crate::meshlines::error::{MeshError, MeshResult};
use crate::meshlines::json::JsonValue;
use crate::meshlines::lines::JsonLines;
use crate::meshlines::merge::state::MergeState;
use crate::meshlines::merge::ResolvedColumns;

const LEFT_SUFFIX: &str = "_l";
const RIGHT_SUFFIX: &str = "_r";

/// Join all pending payload bundles into `output`; consumes `join_data`
///
/// Returns the number of records appended locally.
pub fn join_local(
    state: &mut MergeState,
    left: &JsonLines,
    output: &mut JsonLines,
    columns: &ResolvedColumns,
) -> MeshResult<usize> {
    let bundles = std::mem::take(&mut state.join_data);
    let mut produced = 0;

    for bundle in &bundles {
        for &left_index in &bundle.left_indices {
            let left_index = usize::try_from(left_index).map_err(|_| {
                MeshError::internal(format!("negative left row index {}", left_index))
            })?;
            let left_row = left.at(left_index)?;
            let left_fields = left_row.as_object().ok_or_else(|| {
                MeshError::data_shape(
                    format!("expected a JSON object, found {}", left_row.type_name()),
                    Some(left_index),
                )
            })?;

            for right_value in &bundle.right_values {
                let right_fields = right_value.as_object().ok_or_else(|| {
                    MeshError::data_shape(
                        format!("expected a JSON object, found {}", right_value.type_name()),
                        None,
                    )
                })?;

                if !keys_match(left_fields, &columns.left_on, right_fields, &columns.right_on) {
                    continue;
                }

                let record = join_records(
                    left_fields,
                    &columns.left_columns,
                    right_fields,
                    &columns.right_columns,
                );
                output.append_local(record)?;
                produced += 1;
            }
        }
    }

    Ok(produced)
}

/// The collision guard: hash equality is necessary, value equality decides
fn keys_match(
    left: &IndexMap<String, JsonValue>,
    left_on: &[String],
    right: &IndexMap<String, JsonValue>,
    right_on: &[String],
) -> bool {
    left_on.iter().zip(right_on).all(|(left_col, right_col)| {
        match (left.get(left_col), right.get(right_col)) {
            (Some(left_value), Some(right_value)) => left_value == right_value,
            _ => false,
        }
    })
}

/// Build the joined record: left projection then right projection, each key
/// suffixed by its side
pub(crate) fn join_records(
    left: &IndexMap<String, JsonValue>,
    left_columns: &[String],
    right: &IndexMap<String, JsonValue>,
    right_columns: &[String],
) -> JsonValue {
    let mut fields = IndexMap::new();
    append_fields(&mut fields, left, left_columns, LEFT_SUFFIX);
    append_fields(&mut fields, right, right_columns, RIGHT_SUFFIX);
    JsonValue::Object(fields)
}

fn append_fields(
    out: &mut IndexMap<String, JsonValue>,
    source: &IndexMap<String, JsonValue>,
    projection: &[String],
    suffix: &str,
) {
    if projection.is_empty() {
        for (key, value) in source {
            out.insert(format!("{}{}", key, suffix), value.clone());
        }
        return;
    }

    for key in projection {
        if let Some(value) = source.get(key) {
            out.insert(format!("{}{}", key, suffix), value.clone());
        }
    }
}
