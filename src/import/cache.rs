//! Read-through caches shared by the validation workers of one run.
//!
//! Every cache is monotonic: once a key is populated it is never
//! invalidated within the run. Two workers racing on the same key may both
//! query the store; the second insert is a no-op.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

use crate::model::{Device, DeviceVariableLink, Experiment, NamedResource, ObservationRecord};
use crate::store::{ReferenceStore, Resolution, StoreError};

/// Name-or-URI resolutions of one entity kind, with the tokens known to be
/// missing or ambiguous
#[derive(Debug)]
pub(crate) struct ResolutionCache<T> {
    resolved: DashMap<String, T>,
    not_found: DashSet<String>,
    duplicated: DashSet<String>,
}

impl<T> Default for ResolutionCache<T> {
    fn default() -> Self {
        Self {
            resolved: DashMap::new(),
            not_found: DashSet::new(),
            duplicated: DashSet::new(),
        }
    }
}

impl<T: Clone + PartialEq> ResolutionCache<T> {
    /// Resolve `token`, calling `lookup` only when the token was never seen.
    ///
    /// A token that resolves to a different entity than the one already
    /// cached for it is marked duplicated.
    pub(crate) fn resolve_with<F>(&self, token: &str, lookup: F) -> Result<Resolution<T>, StoreError>
    where
        F: FnOnce() -> Result<Resolution<T>, StoreError>,
    {
        if self.duplicated.contains(token) {
            return Ok(Resolution::Ambiguous);
        }
        if let Some(hit) = self.resolved.get(token) {
            return Ok(Resolution::Found(hit.value().clone()));
        }
        if self.not_found.contains(token) {
            return Ok(Resolution::NotFound);
        }

        let outcome = lookup()?;
        match &outcome {
            Resolution::Found(value) => match self.resolved.entry(token.to_string()) {
                Entry::Occupied(existing) if existing.get() != value => {
                    drop(existing);
                    self.duplicated.insert(token.to_string());
                    return Ok(Resolution::Ambiguous);
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(value.clone());
                }
            },
            Resolution::NotFound => {
                self.not_found.insert(token.to_string());
            }
            Resolution::Ambiguous => {
                self.duplicated.insert(token.to_string());
            }
        }
        Ok(outcome)
    }

    #[cfg(test)]
    pub(crate) fn is_duplicated(&self, token: &str) -> bool {
        self.duplicated.contains(token)
    }
}

/// Device backing the observations of a variable when the device comes
/// from the provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProvenanceDevice {
    /// Exactly one usable device
    Device(Device),
    /// The provenance offers no usable device
    NoDevice,
    /// Several devices could back the variable
    Ambiguous,
}

/// Identity of an observation for in-run duplicate detection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ObservationKey {
    pub instant: DateTime<Utc>,
    pub variable: String,
    pub provenance: String,
    pub target: Option<String>,
    pub device: Option<String>,
}

impl ObservationKey {
    pub(crate) fn of(record: &ObservationRecord) -> Self {
        Self {
            instant: record.date,
            variable: record.variable.clone(),
            provenance: record.provenance.uri.clone(),
            target: record.target.clone(),
            device: record
                .provenance
                .was_associated_with
                .first()
                .map(|agent| agent.uri.clone()),
        }
    }
}

/// All caches of a validation run
#[derive(Debug, Default)]
pub(crate) struct ReferenceCaches {
    pub experiments: ResolutionCache<Experiment>,
    pub targets: ResolutionCache<NamedResource>,
    pub objects: ResolutionCache<NamedResource>,
    pub devices: ResolutionCache<Device>,
    root_types: DashMap<String, Option<String>>,
    checked_links: DashSet<DeviceVariableLink>,
    provenance_devices: DashMap<String, ProvenanceDevice>,
    first_rows: DashMap<ObservationKey, usize>,
}

impl ReferenceCaches {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Root type of a device type, looked up once per run
    pub(crate) fn root_type(
        &self,
        store: &dyn ReferenceStore,
        device_type: &str,
    ) -> Result<Option<String>, StoreError> {
        if let Some(root) = self.root_types.get(device_type) {
            return Ok(root.value().clone());
        }
        let root = store.root_device_type(device_type)?;
        self.root_types
            .entry(device_type.to_string())
            .or_insert_with(|| root.clone());
        Ok(root)
    }

    /// Mark a device/variable pair as checked; returns `false` if it already was
    pub(crate) fn check_link(&self, link: &DeviceVariableLink) -> bool {
        self.checked_links.insert(link.clone())
    }

    pub(crate) fn provenance_device(&self, variable: &str) -> Option<ProvenanceDevice> {
        self.provenance_devices.get(variable).map(|d| d.value().clone())
    }

    /// Record the provenance device decision for a variable, keeping the
    /// first decision if another worker got there first
    pub(crate) fn decide_provenance_device(&self, variable: &str, decision: ProvenanceDevice) -> ProvenanceDevice {
        self.provenance_devices
            .entry(variable.to_string())
            .or_insert(decision)
            .value()
            .clone()
    }

    /// Register the observation key of `row`, keeping the lowest row seen
    /// for it. Returns `true` if a lower row already holds the key.
    ///
    /// A row validated before a lower duplicate is not flagged here; the
    /// ordered merge catches it.
    pub(crate) fn held_by_earlier_row(&self, key: ObservationKey, row: usize) -> bool {
        match self.first_rows.entry(key) {
            Entry::Occupied(mut first) => {
                if *first.get() < row {
                    true
                } else {
                    first.insert(row);
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(row);
                false
            }
        }
    }
}
