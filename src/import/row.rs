//! Validation of a single data row.
//!
//! A row is checked in two passes. The first pass walks the columns left to
//! right and resolves the fixed columns (experiment, target, scientific
//! object, date, device, annotation); variable cells are only collected.
//! The second pass builds one observation per filled variable cell, once
//! everything the observation depends on is known, whatever the column
//! order.

use std::sync::Arc;

use chrono::FixedOffset;
use log::debug;

use crate::model::{
    is_valid_uri, AgentRef, Annotation, DataValue, Device, DeviceVariableLink, NamedResource,
    ObservationRecord, ParsedDate, Provenance, ProvenanceRef,
};
use crate::store::{ReferenceStore, Resolution};

use super::cache::{ObservationKey, ProvenanceDevice, ReferenceCaches};
use super::error::ImportError;
use super::header::{
    ColumnRole, HeaderMap, VariableColumn, ANNOTATION_HEADER, DATE_HEADER, DEVICE_HEADER,
    EXPERIMENT_HEADER, SCIENTIFIC_OBJECT_HEADER, TARGET_HEADER,
};
use super::result::{CellErrorKind, CsvCell, ValidationResult};

/// Everything row validation needs, shared read-only by all workers of a run
pub(crate) struct ValidationRun {
    pub store: Arc<dyn ReferenceStore>,
    pub caches: ReferenceCaches,
    pub headers: HeaderMap,
    pub header_tokens: Vec<String>,
    pub header_labels: Vec<String>,
    pub provenance: Provenance,
    /// Experiment every row is attached to, if the import names one
    pub experiment: Option<String>,
    pub user: Option<String>,
    /// Whether the provenance has a device-typed agent
    pub device_from_provenance: bool,
    /// Devices behind the device-typed agents of the provenance
    pub provenance_devices: Vec<Device>,
    pub default_offset: FixedOffset,
}

/// Per-row scratch state
struct RowState {
    index: usize,
    experiments: Vec<String>,
    target: Option<NamedResource>,
    object: Option<NamedResource>,
    device: Option<Device>,
    date: Option<ParsedDate>,
    annotation: Option<(usize, Annotation)>,
    deferred: Vec<usize>,
    missing_target_or_device: bool,
    halted: bool,
    valid: bool,
}

impl RowState {
    fn new(index: usize, experiment: Option<&str>) -> Self {
        Self {
            index,
            experiments: experiment.map(str::to_string).into_iter().collect(),
            target: None,
            object: None,
            device: None,
            date: None,
            annotation: None,
            deferred: Vec::new(),
            missing_target_or_device: false,
            halted: false,
            valid: true,
        }
    }

    fn reject(&mut self, out: &mut ValidationResult, kind: CellErrorKind, cell: CsvCell) {
        out.add_error(kind, cell);
        self.valid = false;
    }

    /// Resolved target of the row; a scientific object wins over a target
    fn target_uri(&self) -> Option<&str> {
        self.object
            .as_ref()
            .or(self.target.as_ref())
            .map(|resource| resource.uri.as_str())
    }
}

fn cell_value(values: &[String], column: usize) -> &str {
    values.get(column).map(|v| v.trim()).unwrap_or_default()
}

impl ValidationRun {
    pub(crate) fn label(&self, column: usize) -> String {
        let header = self.header_tokens.get(column).map(String::as_str).unwrap_or_default();
        match self.header_labels.get(column) {
            Some(label) if !label.is_empty() => format!("{}({})", label, header),
            _ => header.to_string(),
        }
    }

    /// Validate one row, adding its observations and errors to `out`.
    ///
    /// Returns whether the row is valid. Only collaborator failures are
    /// returned as errors.
    pub(crate) fn validate_row(
        &self,
        index: usize,
        values: &[String],
        out: &mut ValidationResult,
    ) -> Result<bool, ImportError> {
        debug!("Validating row {}", index);
        let mut row = RowState::new(index, self.experiment.as_deref());

        for (column, role) in self.headers.columns() {
            let value = cell_value(values, column);
            match role {
                ColumnRole::Experiment => self.check_experiment(&mut row, column, value, out)?,
                ColumnRole::Target => self.check_target(&mut row, column, value, out)?,
                ColumnRole::ScientificObject => self.check_object(&mut row, column, value, out)?,
                ColumnRole::Device => self.check_device(&mut row, column, value, out)?,
                ColumnRole::Date => {
                    if !self.check_date(&mut row, column, value, out) {
                        break;
                    }
                }
                ColumnRole::Annotation => {
                    if !value.is_empty() {
                        row.annotation = Some((column, Annotation::comment(value, self.user.as_deref())));
                    }
                }
                ColumnRole::RawData => {}
                ColumnRole::Variable(_) => {
                    if !value.is_empty() {
                        row.deferred.push(column);
                    }
                }
            }
        }

        if row.valid {
            let deferred = std::mem::take(&mut row.deferred);
            for column in deferred {
                if row.halted {
                    break;
                }
                if let Some(ColumnRole::Variable(variable)) = self.headers.role(column) {
                    self.build_observation(&mut row, column, variable, values, out)?;
                }
            }
        }

        self.finish_annotation(&mut row, out);

        if row.missing_target_or_device {
            let device_column = self.headers.column_of(&ColumnRole::Device);
            let target_column = self
                .headers
                .column_of(&ColumnRole::Target)
                .or_else(|| self.headers.column_of(&ColumnRole::ScientificObject));
            for (column, header) in [(device_column, DEVICE_HEADER), (target_column, TARGET_HEADER)] {
                out.add_error(
                    CellErrorKind::MissingRequiredValue,
                    CsvCell {
                        row: Some(index),
                        column,
                        value: None,
                        header: header.to_string(),
                    },
                );
            }
        }

        Ok(row.valid)
    }

    fn check_experiment(
        &self,
        row: &mut RowState,
        column: usize,
        value: &str,
        out: &mut ValidationResult,
    ) -> Result<(), ImportError> {
        if value.is_empty() {
            return Ok(());
        }
        let resolution = self
            .caches
            .experiments
            .resolve_with(value, || self.store.resolve_experiment(value))?;
        let cell = CsvCell::new(row.index, column, value, EXPERIMENT_HEADER);
        match resolution {
            Resolution::Found(experiment) => {
                if !row.experiments.contains(&experiment.uri) {
                    row.experiments.push(experiment.uri);
                }
            }
            Resolution::NotFound => row.reject(out, CellErrorKind::InvalidExperiment, cell),
            Resolution::Ambiguous => row.reject(out, CellErrorKind::DuplicateExperiment, cell),
        }
        Ok(())
    }

    fn check_target(
        &self,
        row: &mut RowState,
        column: usize,
        value: &str,
        out: &mut ValidationResult,
    ) -> Result<(), ImportError> {
        if value.is_empty() {
            return Ok(());
        }
        let resolution = self
            .caches
            .targets
            .resolve_with(value, || self.store.resolve_target(value))?;
        let cell = CsvCell::new(row.index, column, value, TARGET_HEADER);
        match resolution {
            Resolution::Found(target) => row.target = Some(target),
            Resolution::NotFound => row.reject(out, CellErrorKind::InvalidTarget, cell),
            Resolution::Ambiguous => row.reject(out, CellErrorKind::DuplicateTarget, cell),
        }
        Ok(())
    }

    fn check_object(
        &self,
        row: &mut RowState,
        column: usize,
        value: &str,
        out: &mut ValidationResult,
    ) -> Result<(), ImportError> {
        if value.is_empty() {
            return Ok(());
        }
        let cell = CsvCell::new(row.index, column, value, SCIENTIFIC_OBJECT_HEADER);
        let experiment = row.experiments.first().cloned();

        let resolution = if is_valid_uri(value) {
            let key = format!("{}|{}", experiment.as_deref().unwrap_or_default(), value);
            self.caches.objects.resolve_with(&key, || {
                Ok(self
                    .store
                    .scientific_object_by_uri(experiment.as_deref(), value)?
                    .map_or(Resolution::NotFound, Resolution::Found))
            })?
        } else if let Some(experiment) = experiment.as_deref() {
            let key = format!("{}|{}", experiment, value);
            self.caches
                .objects
                .resolve_with(&key, || self.store.scientific_object_by_name(experiment, value))?
        } else {
            row.reject(out, CellErrorKind::ObjectNameAmbiguity, cell);
            return Ok(());
        };

        match resolution {
            Resolution::Found(object) => row.object = Some(object),
            Resolution::NotFound => row.reject(out, CellErrorKind::InvalidObject, cell),
            Resolution::Ambiguous => row.reject(out, CellErrorKind::DuplicateObject, cell),
        }
        Ok(())
    }

    fn check_device(
        &self,
        row: &mut RowState,
        column: usize,
        value: &str,
        out: &mut ValidationResult,
    ) -> Result<(), ImportError> {
        if value.is_empty() {
            return Ok(());
        }
        let resolution = self
            .caches
            .devices
            .resolve_with(value, || self.store.resolve_device(value))?;
        let cell = CsvCell::new(row.index, column, value, DEVICE_HEADER);
        match resolution {
            Resolution::Found(device) => row.device = Some(device),
            Resolution::NotFound => row.reject(out, CellErrorKind::InvalidDevice, cell),
            Resolution::Ambiguous => row.reject(out, CellErrorKind::DuplicateDevice, cell),
        }
        Ok(())
    }

    /// Returns `false` when the rest of the row must be skipped
    fn check_date(&self, row: &mut RowState, column: usize, value: &str, out: &mut ValidationResult) -> bool {
        match crate::model::parse_date(value, self.default_offset) {
            Some(date) => {
                row.date = Some(date);
                true
            }
            None => {
                row.reject(
                    out,
                    CellErrorKind::InvalidDate,
                    CsvCell::new(row.index, column, value, DATE_HEADER),
                );
                false
            }
        }
    }

    /// Make sure the device is linked to the variable, queueing the link
    /// for creation when it is not
    fn link_device(
        &self,
        device: &Device,
        variable: &str,
        out: &mut ValidationResult,
    ) -> Result<(), ImportError> {
        let link = DeviceVariableLink::new(&device.uri, variable);
        if self.caches.check_link(&link)
            && !self.store.is_variable_associated_to_device(&device.uri, variable)?
        {
            debug!("Device {} will be linked to variable {}", device.uri, variable);
            out.associations.insert(link);
        }
        Ok(())
    }

    /// Which provenance device backs `variable`, decided once per run
    fn provenance_device(&self, variable: &str, out: &mut ValidationResult) -> Result<ProvenanceDevice, ImportError> {
        if let Some(decision) = self.caches.provenance_device(variable) {
            return Ok(decision);
        }

        let mut linked = Vec::new();
        for device in &self.provenance_devices {
            if self.store.is_variable_associated_to_device(&device.uri, variable)? {
                linked.push(device);
            }
        }

        let decision = match (linked.as_slice(), self.provenance_devices.as_slice()) {
            ([device], _) => ProvenanceDevice::Device((*device).clone()),
            ([], [device]) => {
                out.associations
                    .insert(DeviceVariableLink::new(&device.uri, variable));
                ProvenanceDevice::Device(device.clone())
            }
            ([], []) => ProvenanceDevice::NoDevice,
            _ => ProvenanceDevice::Ambiguous,
        };
        Ok(self.caches.decide_provenance_device(variable, decision))
    }

    fn build_observation(
        &self,
        row: &mut RowState,
        column: usize,
        variable: &VariableColumn,
        values: &[String],
        out: &mut ValidationResult,
    ) -> Result<(), ImportError> {
        let device = if let Some(device) = row.device.clone() {
            self.link_device(&device, &variable.uri, out)?;
            Some(device)
        } else if self.device_from_provenance {
            match self.provenance_device(&variable.uri, out)? {
                ProvenanceDevice::Device(device) => Some(device),
                ProvenanceDevice::NoDevice => None,
                ProvenanceDevice::Ambiguous => {
                    row.reject(
                        out,
                        CellErrorKind::DeviceChoiceAmbiguity,
                        CsvCell::new(row.index, column, &self.provenance.uri, DEVICE_HEADER),
                    );
                    row.halted = true;
                    return Ok(());
                }
            }
        } else {
            None
        };

        if device.is_none() && row.target_uri().is_none() {
            row.missing_target_or_device = true;
            row.valid = false;
            row.halted = true;
            return Ok(());
        }

        let Some(date) = row.date else {
            return Ok(());
        };

        let text = cell_value(values, column);
        let value = match variable.datatype.coerce(text, self.default_offset) {
            Ok(value) => value,
            Err(_) => {
                row.reject(
                    out,
                    CellErrorKind::InvalidDatatype,
                    CsvCell::new(row.index, column, text, self.label(column)),
                );
                return Ok(());
            }
        };

        let raw_data = match self.raw_data(row, column, variable, values, out) {
            Ok(raw_data) => raw_data,
            Err(()) => return Ok(()),
        };

        let was_associated_with = match &device {
            Some(device) => vec![AgentRef {
                uri: device.uri.clone(),
                rdf_type: self.caches.root_type(self.store.as_ref(), &device.rdf_type)?,
            }],
            None => Vec::new(),
        };

        let record = ObservationRecord {
            variable: variable.uri.clone(),
            target: row.target_uri().map(str::to_string),
            date: date.instant,
            offset: date.offset_string(),
            is_datetime: date.is_datetime,
            value,
            raw_data,
            provenance: ProvenanceRef {
                uri: self.provenance.uri.clone(),
                experiments: row.experiments.clone(),
                was_associated_with,
            },
            batch_uri: None,
            publication_date: None,
        };
        if self
            .caches
            .held_by_earlier_row(ObservationKey::of(&record), row.index)
        {
            out.add_error(
                CellErrorKind::DuplicatedData,
                CsvCell::new(row.index, column, text, self.label(column)),
            );
            row.valid = false;
        }
        out.add_record(row.index, column, record);
        Ok(())
    }

    /// Raw values of the `raw_data` column following `column`, if any.
    /// `Err(())` means a datatype error was recorded.
    fn raw_data(
        &self,
        row: &mut RowState,
        column: usize,
        variable: &VariableColumn,
        values: &[String],
        out: &mut ValidationResult,
    ) -> Result<Option<Vec<DataValue>>, ()> {
        if self.headers.role(column + 1) != Some(&ColumnRole::RawData) {
            return Ok(None);
        }
        let text = cell_value(values, column + 1);
        if text.is_empty() {
            return Ok(None);
        }

        let mut raw = Vec::new();
        for item in text.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            match variable.datatype.coerce(item, self.default_offset) {
                Ok(value) => raw.push(value),
                Err(_) => {
                    row.reject(
                        out,
                        CellErrorKind::InvalidDatatype,
                        CsvCell::new(row.index, column + 1, text, self.label(column + 1)),
                    );
                    return Err(());
                }
            }
        }
        Ok(Some(raw))
    }

    fn finish_annotation(&self, row: &mut RowState, out: &mut ValidationResult) {
        let Some((column, mut annotation)) = row.annotation.take() else {
            return;
        };
        match row.target_uri().map(str::to_string) {
            None => {
                let cell = CsvCell::new(row.index, column, annotation.description.as_str(), ANNOTATION_HEADER);
                row.reject(out, CellErrorKind::InvalidAnnotation, cell);
            }
            Some(target) => {
                if row.valid {
                    annotation.targets = vec![target];
                    out.annotations.push(annotation);
                }
            }
        }
    }
}
