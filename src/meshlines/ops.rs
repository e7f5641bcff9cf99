//! Collective dataset operations besides the merge.
//!
//! Both operate on one dataset through its handle, honour the handle's row
//! selection, and report a global figure from rank 0.

use log::info;

use crate::meshlines::comm::Comm;
use crate::meshlines::error::MeshResult;
use crate::meshlines::json::JsonValue;
use crate::meshlines::lines::handle::DatasetHandle;
use crate::meshlines::lines::JsonLines;

/// Count selected rows across all ranks
pub async fn count<M: Send + 'static>(
    comm: &Comm<M>,
    dataset: &DatasetHandle,
) -> MeshResult<Option<u64>> {
    let mut lines = JsonLines::open_read_only(&dataset.state.location, comm.rank())?;
    lines.select(dataset.state.selected.clone());

    let local = lines.count_selected()? as u64;
    let total = comm.all_reduce_sum(local).await;

    Ok((comm.rank() == 0).then_some(total))
}

/// Assign `value` to `column` of every selected row, on every rank
///
/// Returns the global number of updated rows from rank 0.
pub async fn set_field<M: Send + 'static>(
    comm: &Comm<M>,
    dataset: &DatasetHandle,
    column: &str,
    value: &JsonValue,
) -> MeshResult<Option<u64>> {
    let mut lines = JsonLines::open_read_write(&dataset.state.location, comm.rank())?;
    lines.select(dataset.state.selected.clone());

    let updated = lines.set_field(column, value)? as u64;
    lines.flush()?;

    let total = comm.all_reduce_sum(updated).await;
    if comm.rank() == 0 {
        info!(
            "set '{}' on {} rows of {}",
            column,
            total,
            dataset.state.location.display()
        );
    }

    Ok((comm.rank() == 0).then_some(total))
}
