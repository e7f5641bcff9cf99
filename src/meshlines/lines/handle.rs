//! Dataset handles.
//!
//! Operations name their datasets with a small JSON object carrying a
//! `state` sub-object: the storage location, plus the currently selected
//! row filter. The handle is what crosses the CLI boundary; opening the
//! dataset itself happens per rank.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::filter::RowPredicate;
use crate::meshlines::error::{MeshError, MeshResult};

/// Persistent state carried by a handle
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetState {
    /// Filesystem path of the dataset directory
    pub location: PathBuf,
    /// Predicates restricting which rows the operation sees
    #[serde(default)]
    pub selected: Vec<RowPredicate>,
}

/// A reference to a dataset plus its current selection
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetHandle {
    pub state: DatasetState,
}

impl DatasetHandle {
    /// Decode a handle from its JSON text form
    pub fn parse(text: &str) -> MeshResult<Self> {
        serde_json::from_str(text)
            .map_err(|error| MeshError::configuration(format!("invalid dataset handle: {}", error)))
    }

    /// Handle for a location with no row selection
    pub fn at(location: impl AsRef<Path>) -> Self {
        DatasetHandle {
            state: DatasetState {
                location: location.as_ref().to_path_buf(),
                selected: Vec::new(),
            },
        }
    }

    /// Same dataset, restricted to rows matching `predicates`
    pub fn with_selection(mut self, predicates: Vec<RowPredicate>) -> Self {
        self.state.selected = predicates;
        self
    }
}
