use crate::store::{SinkError, StoreError};

/// Fatal import failures.
///
/// Problems with the content of a file are never reported here: they are
/// accumulated as cell errors in the
/// [`ValidationResult`](super::ValidationResult).
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The CSV stream could not be decoded
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// A header variable has no declared datatype
    #[error("Variable {variable} has no declared datatype")]
    MissingDatatype {
        /// Variable URI
        variable: String,
    },

    /// The provenance of the import does not exist
    #[error("Provenance not found: {0}")]
    ProvenanceNotFound(String),

    /// The user may not import into the experiment
    #[error("Access to experiment {0} denied")]
    ExperimentAccessDenied(String),

    /// A reference lookup failed
    #[error("Reference store error: {0}")]
    StoreError(#[from] StoreError),

    /// The batch insert failed and nothing was committed
    #[error("Insertion failed: {0}")]
    SinkError(#[from] SinkError),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The source document could not be archived
    #[error("ZIP error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A validation worker panicked
    #[error("Validation worker panicked")]
    WorkerPanicked,
}
