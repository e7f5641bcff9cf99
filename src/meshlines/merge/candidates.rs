//! Phase 2: the candidate walk.
//!
//! With both partitioned indices local, matching is a co-sorted two-pointer
//! walk over equal-hash runs. For each hash present on both sides, the
//! packed left run is shipped to every rank that owns at least one right
//! row of that hash; the receiving rank later materialises those right rows
//! itself. Only surviving candidates cross the network, never the full
//! index.

use crate::meshlines::comm::Comm;
use crate::meshlines::error::MeshResult;
use crate::meshlines::merge::state::{
    CandidateBundle, IndexEntry, JoinSide, LeftRef, MergeEvent, MergeState,
};

/// Walk the two local indices and ship candidate bundles
///
/// Consumes (and thereby clears) both indices.
pub fn exchange_candidates(comm: &Comm<MergeEvent>, state: &mut MergeState) -> MeshResult<()> {
    let mut left = std::mem::take(&mut state.join_index[JoinSide::Left.index()]);
    let mut right = std::mem::take(&mut state.join_index[JoinSide::Right.index()]);

    left.sort_unstable_by_key(IndexEntry::sort_key);
    right.sort_unstable_by_key(IndexEntry::sort_key);

    let mut li = 0;
    let mut ri = 0;

    while li < left.len() && ri < right.len() {
        let left_hash = left[li].hash;
        let right_hash = right[ri].hash;
        let left_run = run_end(&left, li);
        let right_run = run_end(&right, ri);

        if left_hash < right_hash {
            li = left_run;
            continue;
        }
        if left_hash > right_hash {
            ri = right_run;
            continue;
        }

        // hashes are equal: pack the left run once, then one bundle per
        // distinct right owner
        let left_refs: Vec<LeftRef> = left[li..left_run]
            .iter()
            .map(|entry| LeftRef {
                owner: entry.owner_rank,
                index: entry.owner_index,
            })
            .collect();

        let mut cursor = ri;
        while cursor < right_run {
            let owner = right[cursor].owner_rank;
            let mut owner_end = cursor;
            while owner_end < right_run && right[owner_end].owner_rank == owner {
                owner_end += 1;
            }

            let right_indices: Vec<i32> = right[cursor..owner_end]
                .iter()
                .map(|entry| entry.owner_index)
                .collect();

            deliver(
                comm,
                state,
                owner as usize,
                CandidateBundle {
                    right_indices,
                    left_refs: left_refs.clone(),
                },
            )?;

            cursor = owner_end;
        }

        li = left_run;
        ri = right_run;
    }

    Ok(())
}

/// First position past the equal-hash run starting at `from`
fn run_end(entries: &[IndexEntry], from: usize) -> usize {
    let hash = entries[from].hash;
    let mut position = from + 1;
    while position < entries.len() && entries[position].hash == hash {
        position += 1;
    }
    position
}

fn deliver(
    comm: &Comm<MergeEvent>,
    state: &mut MergeState,
    dest: usize,
    bundle: CandidateBundle,
) -> MeshResult<()> {
    if dest == comm.rank() {
        state.store_candidates(bundle);
        return Ok(());
    }
    comm.send(dest, MergeEvent::Candidates(bundle))
}
