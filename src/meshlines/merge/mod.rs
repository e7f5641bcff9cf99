//! The distributed merge engine.
//!
//! An inner equi-join over two JSON-lines datasets, run in four phases per
//! rank with a barrier between each:
//!
//! 1. index every selected row by the stable hash of its join columns,
//!    partitioned so entries for one hash land on one rank,
//! 2. walk the co-sorted indices and ship left candidates to the owners of
//!    matching right rows,
//! 3. materialise the referenced right rows and ship them to the owners of
//!    the left rows,
//! 4. re-verify each candidate pair locally and append joined records to
//!    the output dataset.
//!
//! Hash agreement across ranks is load-bearing; see
//! [`crate::meshlines::json::stable_hash`].

pub mod candidates;
pub mod index;
pub mod joiner;
pub mod payload;
pub mod state;

pub use state::{CandidateBundle, IndexEntry, JoinSide, LeftRef, MergeEvent, MergeState, PayloadBundle};

use indexmap::IndexMap;
use log::{debug, info};

use crate::meshlines::comm::Comm;
use crate::meshlines::error::{MeshError, MeshResult};
use crate::meshlines::json::{stable_hash, JsonValue};
use crate::meshlines::lines::handle::DatasetHandle;
use crate::meshlines::lines::JsonLines;

/// Hashing seam of the engine
///
/// Production uses [`StableRowHasher`]; tests inject degenerate hashers to
/// exercise the collision guard.
pub trait RowHasher: Send + Sync {
    fn hash_row(&self, row: &IndexMap<String, JsonValue>, columns: &[String]) -> u64;
}

/// The rank-stable production hasher
#[derive(Debug, Clone, Copy, Default)]
pub struct StableRowHasher;

impl RowHasher for StableRowHasher {
    fn hash_row(&self, row: &IndexMap<String, JsonValue>, columns: &[String]) -> u64 {
        stable_hash::hash_row(row, columns)
    }
}

/// User-facing merge arguments, before resolution
#[derive(Debug, Clone, Default)]
pub struct MergeArgs {
    /// Join columns for both sides, unless overridden per side
    pub on: Vec<String>,
    pub left_on: Vec<String>,
    pub right_on: Vec<String>,
    /// Output projections; empty keeps all columns of a side
    pub left_columns: Vec<String>,
    pub right_columns: Vec<String>,
}

/// Column lists after default resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub left_on: Vec<String>,
    pub right_on: Vec<String>,
    pub left_columns: Vec<String>,
    pub right_columns: Vec<String>,
    /// Projection used when shipping right rows: the right projection plus
    /// any join column it omits, so receivers can always re-verify
    pub right_send: Vec<String>,
}

impl MergeArgs {
    /// Resolve defaults and validate the join specification
    pub fn resolve(&self) -> MeshResult<ResolvedColumns> {
        if self.left_on.is_empty() && self.on.is_empty() {
            return Err(MeshError::configuration(
                "join columns unspecified for the left dataset",
            ));
        }
        if self.right_on.is_empty() && self.on.is_empty() {
            return Err(MeshError::configuration(
                "join columns unspecified for the right dataset",
            ));
        }

        let left_on = if self.left_on.is_empty() {
            self.on.clone()
        } else {
            self.left_on.clone()
        };
        let right_on = if self.right_on.is_empty() {
            self.on.clone()
        } else {
            self.right_on.clone()
        };

        if left_on.len() != right_on.len() {
            return Err(MeshError::configuration(format!(
                "left_on names {} columns but right_on names {}",
                left_on.len(),
                right_on.len()
            )));
        }

        let right_send = union_columns(&self.right_columns, &right_on);

        Ok(ResolvedColumns {
            left_on,
            right_on,
            left_columns: self.left_columns.clone(),
            right_columns: self.right_columns.clone(),
            right_send,
        })
    }
}

/// Append the join columns a projection omits; an empty projection already
/// covers everything
fn union_columns(projection: &[String], join_columns: &[String]) -> Vec<String> {
    if projection.is_empty() {
        return Vec::new();
    }

    let mut out = projection.to_vec();
    for column in join_columns {
        if !out.contains(column) {
            out.push(column.clone());
        }
    }
    out
}

/// Run the merge with the production hasher
pub async fn merge(
    comm: &mut Comm<MergeEvent>,
    output: &DatasetHandle,
    left: &DatasetHandle,
    right: &DatasetHandle,
    args: &MergeArgs,
) -> MeshResult<Option<String>> {
    merge_with_hasher(comm, output, left, right, args, &StableRowHasher).await
}

/// Run the merge with an injected hasher
///
/// Returns rank 0's result string; every other rank returns `None`.
pub async fn merge_with_hasher(
    comm: &mut Comm<MergeEvent>,
    output: &DatasetHandle,
    left: &DatasetHandle,
    right: &DatasetHandle,
    args: &MergeArgs,
    hasher: &dyn RowHasher,
) -> MeshResult<Option<String>> {
    let columns = args.resolve()?;

    // open everything before the first rendezvous so configuration and
    // storage failures surface while no rank is parked in a barrier
    let mut left_lines = JsonLines::open_read_only(&left.state.location, comm.rank())?;
    left_lines.select(left.state.selected.clone());
    let mut right_lines = JsonLines::open_read_only(&right.state.location, comm.rank())?;
    right_lines.select(right.state.selected.clone());

    if comm.rank() == 0 {
        JsonLines::clean_location(&output.state.location)?;
    }
    comm.barrier(|_event: MergeEvent| Ok(())).await?;
    let mut out_lines = JsonLines::create_overwrite(&output.state.location, comm.rank())?;

    let mut state = MergeState::default();

    debug!(
        "merge rank {}: indexing {} left / {} right local rows",
        comm.rank(),
        left_lines.local_len(),
        right_lines.local_len()
    );
    index::build_index(
        comm,
        &mut state,
        JoinSide::Left,
        &left_lines,
        &columns.left_on,
        hasher,
    )?;
    index::build_index(
        comm,
        &mut state,
        JoinSide::Right,
        &right_lines,
        &columns.right_on,
        hasher,
    )?;
    comm.barrier(|event| state.apply(event)).await?;

    debug!(
        "merge rank {}: matching {} left / {} right index entries",
        comm.rank(),
        state.join_index[JoinSide::Left.index()].len(),
        state.join_index[JoinSide::Right.index()].len()
    );
    candidates::exchange_candidates(comm, &mut state)?;
    comm.barrier(|event| state.apply(event)).await?;

    debug!(
        "merge rank {}: shipping payloads for {} candidate bundles",
        comm.rank(),
        state.merge_candidates.len()
    );
    payload::ship_payloads(comm, &mut state, &right_lines, &columns.right_send)?;
    comm.barrier(|event| state.apply(event)).await?;

    debug!(
        "merge rank {}: joining {} payload bundles",
        comm.rank(),
        state.join_data.len()
    );
    let produced = joiner::join_local(&mut state, &left_lines, &mut out_lines, &columns)?;
    out_lines.flush()?;
    comm.barrier(|_event| {
        Err(MeshError::internal(
            "message received after the join phase drained",
        ))
    })
    .await?;

    let total = comm.all_reduce_sum(produced as u64).await;

    if comm.rank() == 0 {
        info!("merge complete: {} records joined", total);
        Ok(Some(format!("joined {} records.", total)))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(on: &[&str]) -> MergeArgs {
        MergeArgs {
            on: on.iter().map(|s| s.to_string()).collect(),
            ..MergeArgs::default()
        }
    }

    #[test]
    fn on_fills_both_sides() {
        let resolved = args(&["k"]).resolve().unwrap();
        assert_eq!(resolved.left_on, vec!["k"]);
        assert_eq!(resolved.right_on, vec!["k"]);
    }

    #[test]
    fn side_specific_columns_override_on() {
        let mut merge_args = args(&["k"]);
        merge_args.left_on = vec!["u".to_string()];
        merge_args.right_on = vec!["x".to_string()];

        let resolved = merge_args.resolve().unwrap();
        assert_eq!(resolved.left_on, vec!["u"]);
        assert_eq!(resolved.right_on, vec!["x"]);
    }

    #[test]
    fn missing_join_columns_are_a_configuration_error() {
        let error = MergeArgs::default().resolve().unwrap_err();
        assert!(matches!(error, MeshError::ConfigurationError { .. }));
    }

    #[test]
    fn mismatched_lengths_are_a_configuration_error() {
        let mut merge_args = MergeArgs::default();
        merge_args.left_on = vec!["a".to_string(), "b".to_string()];
        merge_args.right_on = vec!["x".to_string()];

        let error = merge_args.resolve().unwrap_err();
        assert!(matches!(error, MeshError::ConfigurationError { .. }));
    }

    #[test]
    fn right_send_list_unions_join_columns() {
        let mut merge_args = args(&["k"]);
        merge_args.right_columns = vec!["b".to_string()];

        let resolved = merge_args.resolve().unwrap();
        assert_eq!(resolved.right_send, vec!["b", "k"]);

        // an empty projection already covers every column
        let resolved = args(&["k"]).resolve().unwrap();
        assert!(resolved.right_send.is_empty());
    }
}
