use std::fmt;

/// Errors that can occur while operating on distributed JSON-lines datasets
#[derive(Debug, Clone)]
pub enum MeshError {
    /// Missing or inconsistent operation arguments
    ConfigurationError { message: String },

    /// A dataset could not be opened, read, or flushed at its location
    StorageError { location: String, message: String },

    /// A record did not have the shape an operation requires
    DataShapeError {
        message: String,
        row: Option<usize>,
    },

    /// The rank messenger failed to deliver a message
    CommError { message: String },

    /// A violated internal assumption
    InternalError { message: String },
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshError::ConfigurationError { message } => {
                write!(f, "configuration error: {}", message)
            }
            MeshError::StorageError { location, message } => {
                write!(f, "storage error at '{}': {}", location, message)
            }
            MeshError::DataShapeError { message, row } => {
                if let Some(row) = row {
                    write!(f, "data shape error at row {}: {}", row, message)
                } else {
                    write!(f, "data shape error: {}", message)
                }
            }
            MeshError::CommError { message } => {
                write!(f, "communication error: {}", message)
            }
            MeshError::InternalError { message } => {
                write!(f, "internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for MeshError {}

impl MeshError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        MeshError::ConfigurationError {
            message: message.into(),
        }
    }

    /// Create a storage error for a dataset location
    pub fn storage(location: impl Into<String>, message: impl Into<String>) -> Self {
        MeshError::StorageError {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Create a data shape error, optionally tied to a local row number
    pub fn data_shape(message: impl Into<String>, row: Option<usize>) -> Self {
        MeshError::DataShapeError {
            message: message.into(),
            row,
        }
    }

    /// Create a communication error
    pub fn comm(message: impl Into<String>) -> Self {
        MeshError::CommError {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        MeshError::InternalError {
            message: message.into(),
        }
    }
}

/// Result type for meshlines operations
pub type MeshResult<T> = Result<T, MeshError>;
