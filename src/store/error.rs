/// Errors raised by a reference store collaborator
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store cannot be reached
    #[error("Reference store unavailable: {0}")]
    Unavailable(String),

    /// A lookup failed for a reason other than "not found"
    #[error("Reference query failed: {0}")]
    QueryError(String),

    /// Reference data could not be loaded
    #[error("Invalid reference data: {0}")]
    InvalidData(String),

    /// I/O error while loading reference data
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON decoding error while loading reference data
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Outcome of a batch insert that did not commit.
///
/// Record indices refer to positions in [`ImportBatch::records`](super::ImportBatch).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Records violating the storage uniqueness constraint
    #[error("{} duplicate record(s) rejected by storage", .0.len())]
    Duplicates(Vec<usize>),

    /// The storage rejected a duplicate without telling which record caused it
    #[error("Duplicate record rejected by storage")]
    UnknownDuplicate,

    /// A record value does not match the type the storage expects
    #[error("Invalid value for record {index}")]
    InvalidValue {
        /// Offending record index
        index: usize,
    },

    /// The batch exceeds the storage set size limit
    #[error("Batch of {size} records exceeds the limit of {limit}")]
    TooLarge {
        /// Maximum records per batch
        limit: usize,
        /// Records in the rejected batch
        size: usize,
    },

    /// Any other storage failure; the transaction was rolled back
    #[error("Storage failure: {0}")]
    Fatal(String),
}
