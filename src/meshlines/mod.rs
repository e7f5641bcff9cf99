// Distributed JSON-lines module tree for meshlines
// Rank runtime, storage container, and the merge engine live here

pub mod comm;
pub mod config;
pub mod error;
pub mod json;
pub mod lines;
pub mod merge;
pub mod ops;

// Re-export main API
pub use comm::{Comm, World};
pub use config::RuntimeConfig;
pub use error::{MeshError, MeshResult};
pub use json::JsonValue;
pub use lines::handle::DatasetHandle;
pub use lines::JsonLines;
pub use merge::{MergeArgs, MergeEvent, RowHasher, StableRowHasher};

// Version and feature info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const FEATURES: &[&str] = &[
    "json_lines_storage",   // memory-mapped per-rank shard files
    "row_selection",        // predicate-filtered row scans
    "distributed_merge",    // hash-partitioned inner equi-join
    "dataset_count",        // selected-row counting across ranks
    "dataset_set",          // column assignment for selected rows
];
