use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::model::{
    is_valid_uri, Annotation, DataValue, Device, DeviceVariableLink, Experiment, NamedResource,
    ObservationRecord, Provenance, Variable,
};

use super::{
    BatchHistory, BatchReceipt, ImportBatch, ObservationSink, ReferenceStore, Resolution, SinkError,
    StoreError,
};

/// An experiment and the users allowed to import into it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentEntry {
    /// Experiment URI
    pub uri: String,
    /// Experiment name
    pub name: String,
    /// Users allowed to write; empty means open to everyone
    #[serde(default)]
    pub members: Vec<String>,
}

/// A scientific object and the experiments it takes part in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScientificObjectEntry {
    /// Object URI
    pub uri: String,
    /// Object name, unique inside one experiment only
    pub name: String,
    /// Experiment graphs the object belongs to
    #[serde(default)]
    pub experiments: Vec<String>,
}

/// A device and the variables it is known to measure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Device URI
    pub uri: String,
    /// Device name
    pub name: String,
    /// Concrete device type
    pub rdf_type: String,
    /// Measured variables
    #[serde(default)]
    pub variables: Vec<String>,
}

/// A device type and its root type in the device ontology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTypeEntry {
    /// Concrete type URI
    pub uri: String,
    /// Root type URI
    pub root: String,
}

/// Reference data file contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceData {
    /// Known experiments
    #[serde(default)]
    pub experiments: Vec<ExperimentEntry>,
    /// Known scientific objects
    #[serde(default)]
    pub scientific_objects: Vec<ScientificObjectEntry>,
    /// Other observation targets (facilities, ...)
    #[serde(default)]
    pub facilities: Vec<NamedResource>,
    /// Known devices
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
    /// Device type hierarchy
    #[serde(default)]
    pub device_types: Vec<DeviceTypeEntry>,
    /// Known variables
    #[serde(default)]
    pub variables: Vec<Variable>,
    /// Known provenances
    #[serde(default)]
    pub provenances: Vec<Provenance>,
    /// Maximum number of records a single batch may insert
    #[serde(default)]
    pub max_batch_records: Option<usize>,
}

type UniqueKey = (DateTime<Utc>, String, String, Option<String>, Option<String>);

fn unique_key(record: &ObservationRecord) -> UniqueKey {
    (
        record.date,
        record.variable.clone(),
        record.provenance.uri.clone(),
        record.target.clone(),
        record.device().map(str::to_string),
    )
}

#[derive(Debug, Default)]
struct Inner {
    data: ReferenceData,
    links: BTreeSet<DeviceVariableLink>,
    roots: HashMap<String, String>,
    index: HashSet<UniqueKey>,
    batches: Vec<ImportBatch>,
}

/// In-memory reference store and transactional sink.
///
/// Reference lookups take a read lock; `insert_batch` validates the whole
/// batch against the uniqueness index before touching any state, then
/// commits it under the write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Build a store from reference data
    pub fn new(data: ReferenceData) -> Self {
        let links = data
            .devices
            .iter()
            .flat_map(|device| {
                device
                    .variables
                    .iter()
                    .map(move |variable| DeviceVariableLink::new(&device.uri, variable))
            })
            .collect();
        let roots = data
            .device_types
            .iter()
            .map(|entry| (entry.uri.clone(), entry.root.clone()))
            .collect();

        Self {
            inner: RwLock::new(Inner {
                data,
                links,
                roots,
                index: HashSet::new(),
                batches: Vec::new(),
            }),
        }
    }

    /// Parse reference data from a JSON string
    pub fn from_json(content: &str) -> Result<Self, StoreError> {
        let data: ReferenceData = serde_json::from_str(content)?;
        Ok(Self::new(data))
    }

    /// Load reference data from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let store = Self::from_json(&content)?;
        info!("Loaded reference data from {}", path.display());
        Ok(store)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("reference store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, SinkError> {
        self.inner
            .write()
            .map_err(|_| SinkError::Fatal("reference store lock poisoned".to_string()))
    }

    /// Batches committed so far, in commit order
    pub fn committed_batches(&self) -> Vec<ImportBatch> {
        self.inner
            .read()
            .map(|inner| inner.batches.clone())
            .unwrap_or_default()
    }

    /// All committed observations
    pub fn records(&self) -> Vec<ObservationRecord> {
        self.committed_batches()
            .into_iter()
            .flat_map(|batch| batch.records)
            .collect()
    }

    /// All committed annotations
    pub fn annotations(&self) -> Vec<Annotation> {
        self.committed_batches()
            .into_iter()
            .flat_map(|batch| batch.annotations)
            .collect()
    }

    /// History entries of committed batches
    pub fn batch_histories(&self) -> Vec<BatchHistory> {
        self.committed_batches()
            .into_iter()
            .map(|batch| batch.history)
            .collect()
    }
}

impl Inner {
    fn device(entry: &DeviceEntry) -> Device {
        Device {
            uri: entry.uri.clone(),
            name: entry.name.clone(),
            rdf_type: entry.rdf_type.clone(),
        }
    }

    fn experiment(entry: &ExperimentEntry) -> Experiment {
        Experiment {
            uri: entry.uri.clone(),
            name: entry.name.clone(),
        }
    }

    fn object(entry: &ScientificObjectEntry) -> NamedResource {
        NamedResource::new(&entry.uri, &entry.name)
    }
}

impl ReferenceStore for MemoryStore {
    fn provenance(&self, uri: &str) -> Result<Option<Provenance>, StoreError> {
        let inner = self.read()?;
        Ok(inner.data.provenances.iter().find(|p| p.uri == uri).cloned())
    }

    fn check_experiment_access(&self, experiment: &str, user: Option<&str>) -> Result<bool, StoreError> {
        let inner = self.read()?;
        let Some(entry) = inner.data.experiments.iter().find(|e| e.uri == experiment) else {
            return Ok(false);
        };
        Ok(entry.members.is_empty() || user.map_or(false, |u| entry.members.iter().any(|m| m == u)))
    }

    fn resolve_experiment(&self, name_or_uri: &str) -> Result<Resolution<Experiment>, StoreError> {
        let inner = self.read()?;
        let experiments = &inner.data.experiments;
        if let Some(entry) = experiments.iter().find(|e| e.uri == name_or_uri) {
            return Ok(Resolution::Found(Inner::experiment(entry)));
        }
        Ok(Resolution::from_matches(
            experiments
                .iter()
                .filter(|e| e.name == name_or_uri)
                .map(Inner::experiment)
                .collect(),
        ))
    }

    fn resolve_target(&self, name_or_uri: &str) -> Result<Resolution<NamedResource>, StoreError> {
        let inner = self.read()?;
        let data = &inner.data;

        if is_valid_uri(name_or_uri) {
            let by_uri = data
                .facilities
                .iter()
                .find(|f| f.uri == name_or_uri)
                .cloned()
                .or_else(|| {
                    data.scientific_objects
                        .iter()
                        .find(|o| o.uri == name_or_uri)
                        .map(Inner::object)
                })
                .or_else(|| {
                    data.devices
                        .iter()
                        .find(|d| d.uri == name_or_uri)
                        .map(|d| NamedResource::new(&d.uri, &d.name))
                });
            if let Some(resource) = by_uri {
                return Ok(Resolution::Found(resource));
            }
        }

        let matches = data
            .facilities
            .iter()
            .filter(|f| f.name.as_deref() == Some(name_or_uri))
            .cloned()
            .chain(
                data.scientific_objects
                    .iter()
                    .filter(|o| o.name == name_or_uri)
                    .map(Inner::object),
            )
            .collect();
        Ok(Resolution::from_matches(matches))
    }

    fn scientific_object_by_uri(
        &self,
        experiment: Option<&str>,
        uri: &str,
    ) -> Result<Option<NamedResource>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .data
            .scientific_objects
            .iter()
            .find(|o| o.uri == uri && experiment.map_or(true, |xp| o.experiments.iter().any(|e| e == xp)))
            .map(Inner::object))
    }

    fn scientific_object_by_name(
        &self,
        experiment: &str,
        name: &str,
    ) -> Result<Resolution<NamedResource>, StoreError> {
        let inner = self.read()?;
        Ok(Resolution::from_matches(
            inner
                .data
                .scientific_objects
                .iter()
                .filter(|o| o.name == name && o.experiments.iter().any(|e| e == experiment))
                .map(Inner::object)
                .collect(),
        ))
    }

    fn resolve_device(&self, name_or_uri: &str) -> Result<Resolution<Device>, StoreError> {
        let inner = self.read()?;
        let devices = &inner.data.devices;
        if let Some(entry) = devices.iter().find(|d| d.uri == name_or_uri) {
            return Ok(Resolution::Found(Inner::device(entry)));
        }
        Ok(Resolution::from_matches(
            devices
                .iter()
                .filter(|d| d.name == name_or_uri)
                .map(Inner::device)
                .collect(),
        ))
    }

    fn device_by_uri(&self, uri: &str) -> Result<Option<Device>, StoreError> {
        let inner = self.read()?;
        Ok(inner.data.devices.iter().find(|d| d.uri == uri).map(Inner::device))
    }

    fn is_device_type(&self, type_uri: &str) -> Result<bool, StoreError> {
        let inner = self.read()?;
        Ok(inner.roots.contains_key(type_uri) || inner.roots.values().any(|root| root == type_uri))
    }

    fn is_variable_associated_to_device(&self, device: &str, variable: &str) -> Result<bool, StoreError> {
        let inner = self.read()?;
        Ok(inner.links.contains(&DeviceVariableLink::new(device, variable)))
    }

    fn variable(&self, uri: &str) -> Result<Option<Variable>, StoreError> {
        let inner = self.read()?;
        Ok(inner.data.variables.iter().find(|v| v.uri == uri).cloned())
    }

    fn root_device_type(&self, type_uri: &str) -> Result<Option<String>, StoreError> {
        let inner = self.read()?;
        if let Some(root) = inner.roots.get(type_uri) {
            return Ok(Some(root.clone()));
        }
        Ok(inner
            .roots
            .values()
            .find(|root| root.as_str() == type_uri)
            .cloned())
    }
}

impl ObservationSink for MemoryStore {
    fn insert_batch(&self, batch: ImportBatch) -> Result<BatchReceipt, SinkError> {
        let mut inner = self.write()?;

        if let Some(limit) = inner.data.max_batch_records {
            if batch.records.len() > limit {
                return Err(SinkError::TooLarge {
                    limit,
                    size: batch.records.len(),
                });
            }
        }

        if let Some(index) = batch
            .records
            .iter()
            .position(|r| matches!(r.value, DataValue::Decimal(v) if !v.is_finite()))
        {
            return Err(SinkError::InvalidValue { index });
        }

        if inner.batches.iter().any(|b| b.history.uri == batch.history.uri) {
            return Err(SinkError::Fatal(format!(
                "batch {} already committed",
                batch.history.uri
            )));
        }

        let mut staged = HashSet::with_capacity(batch.records.len());
        let mut duplicates = Vec::new();
        for (index, record) in batch.records.iter().enumerate() {
            let key = unique_key(record);
            if inner.index.contains(&key) || !staged.insert(key) {
                duplicates.push(index);
            }
        }
        if !duplicates.is_empty() {
            debug!("Rejecting batch {}: {} duplicate(s)", batch.history.uri, duplicates.len());
            return Err(SinkError::Duplicates(duplicates));
        }

        inner.index.extend(staged);
        inner.links.extend(batch.associations.iter().cloned());

        let receipt = BatchReceipt {
            records_inserted: batch.records.len(),
            batch_uri: batch.history.uri.clone(),
            document_uri: batch.history.document_uri.clone(),
        };
        inner.batches.push(batch);

        info!(
            "Committed batch {} ({} records)",
            receipt.batch_uri, receipt.records_inserted
        );
        Ok(receipt)
    }
}
