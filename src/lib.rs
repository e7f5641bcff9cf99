//! Distributed JSON-lines frames.
//!
//! meshlines stores JSON records in per-rank, memory-mapped shard files and
//! runs collective operations over them on an in-process world of ranks.
//! The centerpiece is a hash-partitioned inner equi-join that builds a
//! distributed index, exchanges join candidates between the ranks that own
//! them, and materialises joined records into a third dataset.

pub mod meshlines;

// Re-export main API
pub use meshlines::comm::{Comm, World};
pub use meshlines::error::{MeshError, MeshResult};
pub use meshlines::json::JsonValue;
pub use meshlines::lines::JsonLines;
pub use meshlines::merge::MergeArgs;
