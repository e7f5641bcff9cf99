//! Phase 3: materialising and shipping right-side payloads.
//!
//! Each candidate bundle names right rows local to this rank. They are
//! projected through the right send list and shipped, as one JSON array, to
//! every rank owning a left candidate of the same hash group. The array is
//! replicated per owning rank; receivers pick which left rows to pair with
//! it in phase 4.

use indexmap::IndexMap;

use crate::meshlines::comm::Comm;
use crate::meshlines::error::{MeshError, MeshResult};
use crate::meshlines::json::JsonValue;
use crate::meshlines::lines::JsonLines;
use crate::meshlines::merge::state::{MergeEvent, MergeState, PayloadBundle};

/// Ship every pending candidate bundle; consumes `merge_candidates`
pub fn ship_payloads(
    comm: &Comm<MergeEvent>,
    state: &mut MergeState,
    right: &JsonLines,
    send_list: &[String],
) -> MeshResult<()> {
    let candidates = std::mem::take(&mut state.merge_candidates);

    for bundle in candidates {
        let mut payload = Vec::with_capacity(bundle.right_indices.len());
        for &index in &bundle.right_indices {
            let index = usize::try_from(index)
                .map_err(|_| MeshError::internal(format!("negative right row index {}", index)))?;
            let row = right.at(index)?;
            payload.push(project_row(&row, send_list, index)?);
        }

        // the wire text is rendered at most once per bundle; left refs are
        // grouped by owner because the index was sorted by (hash, owner)
        let mut wire: Option<String> = None;
        let refs = &bundle.left_refs;
        let mut cursor = 0;

        while cursor < refs.len() {
            let owner = refs[cursor].owner;
            let mut owner_end = cursor;
            while owner_end < refs.len() && refs[owner_end].owner == owner {
                owner_end += 1;
            }

            let left_indices: Vec<i32> =
                refs[cursor..owner_end].iter().map(|r| r.index).collect();
            let dest = usize::try_from(owner)
                .map_err(|_| MeshError::internal(format!("negative owner rank {}", owner)))?;

            if dest == comm.rank() {
                state.store_payload(PayloadBundle {
                    left_indices,
                    right_values: payload.clone(),
                });
            } else {
                let text = match &wire {
                    Some(text) => text.clone(),
                    None => {
                        let rendered = serde_json::to_string(&payload).map_err(|error| {
                            MeshError::internal(format!("payload failed to serialise: {}", error))
                        })?;
                        wire = Some(rendered.clone());
                        rendered
                    }
                };
                comm.send(dest, MergeEvent::Payload { left_indices, text })?;
            }

            cursor = owner_end;
        }
    }

    Ok(())
}

/// Project a record through a column list; an empty list keeps the whole
/// record
fn project_row(row: &JsonValue, columns: &[String], rownum: usize) -> MeshResult<JsonValue> {
    let fields = row.as_object().ok_or_else(|| {
        MeshError::data_shape(
            format!("expected a JSON object, found {}", row.type_name()),
            Some(rownum),
        )
    })?;

    if columns.is_empty() {
        return Ok(row.clone());
    }

    let mut projected = IndexMap::with_capacity(columns.len());
    for column in columns {
        if let Some(value) = fields.get(column) {
            projected.insert(column.clone(), value.clone());
        }
    }
    Ok(JsonValue::Object(projected))
}
