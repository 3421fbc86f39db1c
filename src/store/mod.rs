//! Collaborator contracts of the import pipeline.
//!
//! The pipeline never talks to a database directly. Reference data
//! (experiments, targets, devices, variables, provenances) is read through a
//! [`ReferenceStore`], and a validated import is committed in one piece
//! through an [`ObservationSink`].
//!
//! [`MemoryStore`] implements both contracts on top of a JSON reference file
//! and is what the CLI and the test suite use.

mod error;
mod memory;


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    Annotation, Device, DeviceVariableLink, Experiment, NamedResource, ObservationRecord, Provenance,
    Variable,
};

pub use error::{SinkError, StoreError};
pub use memory::{
    DeviceEntry, DeviceTypeEntry, ExperimentEntry, MemoryStore, ReferenceData, ScientificObjectEntry,
};

/// RDF type of the archived CSV document
pub const IMPORTED_DATASET_TYPE: &str = "http://www.opensilex.org/vocabulary/oeso#ImportedDataset";

/// Outcome of a name-or-URI lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    /// Exactly one entity matches
    Found(T),
    /// No entity matches
    NotFound,
    /// The name matches several entities in the lookup scope
    Ambiguous,
}

impl<T> Resolution<T> {
    /// Build a resolution from every match of a name lookup
    pub fn from_matches(mut matches: Vec<T>) -> Self {
        match matches.len() {
            0 => Resolution::NotFound,
            1 => matches.pop().map_or(Resolution::NotFound, Resolution::Found),
            _ => Resolution::Ambiguous,
        }
    }
}

/// Read access to the reference metadata an import is checked against.
///
/// Every method is a blocking call. Implementations must be safe to call
/// concurrently from the validation workers.
pub trait ReferenceStore: Send + Sync {
    /// Load a provenance by URI
    fn provenance(&self, uri: &str) -> Result<Option<Provenance>, StoreError>;

    /// Whether `user` may write data into `experiment`
    fn check_experiment_access(&self, experiment: &str, user: Option<&str>) -> Result<bool, StoreError>;

    /// Resolve an experiment by name or URI
    fn resolve_experiment(&self, name_or_uri: &str) -> Result<Resolution<Experiment>, StoreError>;

    /// Resolve an observation target (facility, scientific object or any
    /// known resource) by name or URI
    fn resolve_target(&self, name_or_uri: &str) -> Result<Resolution<NamedResource>, StoreError>;

    /// Look a scientific object up by URI, inside the experiment graph when one
    /// is given, in the global graph otherwise
    fn scientific_object_by_uri(
        &self,
        experiment: Option<&str>,
        uri: &str,
    ) -> Result<Option<NamedResource>, StoreError>;

    /// Look a scientific object up by name inside an experiment graph
    fn scientific_object_by_name(
        &self,
        experiment: &str,
        name: &str,
    ) -> Result<Resolution<NamedResource>, StoreError>;

    /// Resolve a device by name or URI
    fn resolve_device(&self, name_or_uri: &str) -> Result<Resolution<Device>, StoreError>;

    /// Load a device by URI
    fn device_by_uri(&self, uri: &str) -> Result<Option<Device>, StoreError>;

    /// Whether an ontology type is a device type
    fn is_device_type(&self, type_uri: &str) -> Result<bool, StoreError>;

    /// Whether a device is known to measure a variable
    fn is_variable_associated_to_device(&self, device: &str, variable: &str) -> Result<bool, StoreError>;

    /// Load a variable by URI
    fn variable(&self, uri: &str) -> Result<Option<Variable>, StoreError>;

    /// Root device type above a concrete device type
    fn root_device_type(&self, type_uri: &str) -> Result<Option<String>, StoreError>;
}

/// Import history entry created for every committed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchHistory {
    /// Batch URI
    pub uri: String,
    /// Insertion timestamp
    pub publication_date: DateTime<Utc>,
    /// Importing user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    /// Archived source document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_uri: Option<String>,
}

/// The imported CSV, zipped and stored next to the batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedDocument {
    /// Document URI
    pub uri: String,
    /// Document title
    pub title: String,
    /// Document format, always `zip`
    pub format: String,
    /// Document type
    pub rdf_type: String,
    /// Documented resources (the batch)
    pub targets: Vec<String>,
    /// Importing user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    /// Creation date
    pub date: DateTime<Utc>,
    /// Size of the archive in bytes
    pub size: usize,
    /// Zip archive bytes
    #[serde(skip)]
    pub content: Vec<u8>,
}

/// Everything one import commits, in one transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    /// History entry of the batch
    pub history: BatchHistory,
    /// Observations to insert
    pub records: Vec<ObservationRecord>,
    /// Device to variable links to create, one per distinct pair
    pub associations: Vec<DeviceVariableLink>,
    /// Annotations to create, targets already bound
    pub annotations: Vec<Annotation>,
    /// Archived source document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<ArchivedDocument>,
}

/// Acknowledgement of a committed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceipt {
    /// Number of observations inserted
    pub records_inserted: usize,
    /// URI of the batch history entry
    pub batch_uri: String,
    /// URI of the archived document, if one was stored
    pub document_uri: Option<String>,
}

/// Transactional write side of the pipeline.
///
/// `insert_batch` either commits the whole batch or nothing.
pub trait ObservationSink: Send + Sync {
    /// Commit a batch
    fn insert_batch(&self, batch: ImportBatch) -> Result<BatchReceipt, SinkError>;
}
