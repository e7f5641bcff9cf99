//! Phase 1: the hash-partitioned index builder.
//!
//! Every selected row of either input contributes one
//! `(hash, owner_rank, owner_index)` triple, stored on the rank the hash
//! maps to. After the phase barrier each rank therefore holds the complete
//! slice of BOTH sides for its share of the hash space, whatever rank the
//! underlying rows live on.

use crate::meshlines::comm::Comm;
use crate::meshlines::error::{MeshError, MeshResult};
use crate::meshlines::lines::JsonLines;
use crate::meshlines::merge::state::{IndexEntry, JoinSide, MergeEvent, MergeState};
use crate::meshlines::merge::RowHasher;

/// Route one index entry to the rank owning its hash
pub fn insert_remote(
    comm: &Comm<MergeEvent>,
    state: &mut MergeState,
    side: JoinSide,
    hash: u64,
    owner_rank: i32,
    owner_index: i32,
) -> MeshResult<()> {
    let dest = (hash % comm.size() as u64) as usize;

    if dest == comm.rank() {
        state.store_entry(
            side,
            IndexEntry {
                hash,
                owner_rank,
                owner_index,
            },
        );
        return Ok(());
    }

    comm.send(
        dest,
        MergeEvent::IndexInsert {
            side,
            hash,
            owner_rank,
            owner_index,
        },
    )
}

/// Index every selected local row of `dataset` under `columns`
pub fn build_index(
    comm: &Comm<MergeEvent>,
    state: &mut MergeState,
    side: JoinSide,
    dataset: &JsonLines,
    columns: &[String],
    hasher: &dyn RowHasher,
) -> MeshResult<()> {
    let rank = comm.rank() as i32;

    dataset.for_each_selected(|rownum, fields| {
        let hash = hasher.hash_row(fields, columns);
        let owner_index = i32::try_from(rownum).map_err(|_| {
            MeshError::internal(format!("row index {} exceeds the index range", rownum))
        })?;
        insert_remote(comm, state, side, hash, rank, owner_index)
    })?;

    Ok(())
}
