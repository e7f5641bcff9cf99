//! Per-join mutable state and the typed events that mutate it.
//!
//! Each rank carries one [`MergeState`] per join. Phase 1 fills the two
//! partitioned indices, phase 2 drains them into candidate bundles, phase 3
//! turns candidates into payload bundles, phase 4 drains those into the
//! output dataset. Inbound messages are [`MergeEvent`]s applied between
//! barriers; the state is cleared piecewise as each phase consumes it.

use crate::meshlines::error::{MeshError, MeshResult};
use crate::meshlines::json::JsonValue;

/// Which input dataset an index entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    Left = 0,
    Right = 1,
}

impl JoinSide {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One row's entry in the hash-partitioned index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub hash: u64,
    pub owner_rank: i32,
    pub owner_index: i32,
}

impl IndexEntry {
    /// Sort key for the candidate walk
    pub fn sort_key(&self) -> (u64, i32) {
        (self.hash, self.owner_rank)
    }
}

/// Location of a left-side row on its owning rank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeftRef {
    pub owner: i32,
    pub index: i32,
}

/// Phase-2 message: right rows local to the receiver that share a hash
/// with left rows living on the listed owners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateBundle {
    pub right_indices: Vec<i32>,
    pub left_refs: Vec<LeftRef>,
}

/// Phase-3 message after materialisation: left rows local to the receiver
/// plus the projected right-side values they may join with
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadBundle {
    pub left_indices: Vec<i32>,
    pub right_values: Vec<JsonValue>,
}

/// Inbound rank-to-rank messages of the merge engine
#[derive(Debug, Clone, PartialEq)]
pub enum MergeEvent {
    IndexInsert {
        side: JoinSide,
        hash: u64,
        owner_rank: i32,
        owner_index: i32,
    },
    Candidates(CandidateBundle),
    /// Right values travel as canonical JSON text and are reparsed on the
    /// receiving rank
    Payload {
        left_indices: Vec<i32>,
        text: String,
    },
}

/// Per-rank working state of one join
#[derive(Debug, Default)]
pub struct MergeState {
    pub join_index: [Vec<IndexEntry>; 2],
    pub merge_candidates: Vec<CandidateBundle>,
    pub join_data: Vec<PayloadBundle>,
}

impl MergeState {
    pub fn store_entry(&mut self, side: JoinSide, entry: IndexEntry) {
        self.join_index[side.index()].push(entry);
    }

    pub fn store_candidates(&mut self, bundle: CandidateBundle) {
        self.merge_candidates.push(bundle);
    }

    pub fn store_payload(&mut self, bundle: PayloadBundle) {
        self.join_data.push(bundle);
    }

    /// Apply one inbound event
    pub fn apply(&mut self, event: MergeEvent) -> MeshResult<()> {
        match event {
            MergeEvent::IndexInsert {
                side,
                hash,
                owner_rank,
                owner_index,
            } => {
                self.store_entry(
                    side,
                    IndexEntry {
                        hash,
                        owner_rank,
                        owner_index,
                    },
                );
                Ok(())
            }
            MergeEvent::Candidates(bundle) => {
                self.store_candidates(bundle);
                Ok(())
            }
            MergeEvent::Payload { left_indices, text } => {
                let right_values: Vec<JsonValue> = serde_json::from_str(&text).map_err(|error| {
                    MeshError::internal(format!("payload text failed to reparse: {}", error))
                })?;
                self.store_payload(PayloadBundle {
                    left_indices,
                    right_values,
                });
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_events_reparse_wire_text() {
        let mut state = MergeState::default();
        state
            .apply(MergeEvent::Payload {
                left_indices: vec![3, 5],
                text: r#"[{"k":1},{"k":2}]"#.to_string(),
            })
            .unwrap();

        assert_eq!(state.join_data.len(), 1);
        assert_eq!(state.join_data[0].left_indices, vec![3, 5]);
        assert_eq!(
            state.join_data[0].right_values[1],
            JsonValue::parse(r#"{"k":2}"#).unwrap()
        );
    }

    #[test]
    fn malformed_payload_text_is_an_internal_error() {
        let mut state = MergeState::default();
        let error = state
            .apply(MergeEvent::Payload {
                left_indices: vec![0],
                text: "not json".to_string(),
            })
            .unwrap_err();
        assert!(matches!(error, MeshError::InternalError { .. }));
    }
}
