use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::{Annotation, DeviceVariableLink, ObservationRecord};

/// Number of file lines preceding the first data row (headers, labels and
/// the reserved third line)
pub const DATA_LINE_OFFSET: usize = 4;

/// Kind of a cell-level validation error
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellErrorKind {
    /// Experiment name or URI does not exist
    InvalidExperiment,
    /// Experiment name matches several experiments
    DuplicateExperiment,
    /// Target name or URI does not exist
    InvalidTarget,
    /// Target name matches several resources
    DuplicateTarget,
    /// Scientific object not found in the experiment
    InvalidObject,
    /// Scientific object name matches several objects of the experiment
    DuplicateObject,
    /// Scientific object given by name without an experiment to scope it
    ObjectNameAmbiguity,
    /// Date in none of the accepted forms
    InvalidDate,
    /// Device name or URI does not exist
    InvalidDevice,
    /// Device name matches several devices
    DuplicateDevice,
    /// The provenance offers several devices for the variable
    DeviceChoiceAmbiguity,
    /// Neither a target nor a device was given
    MissingRequiredValue,
    /// Value does not match the variable datatype
    InvalidDatatype,
    /// Observation already present in the import or in storage
    DuplicatedData,
    /// Annotation on a row without target
    InvalidAnnotation,
}

impl CellErrorKind {
    /// Human-readable description of the error kind
    pub fn description(&self) -> &'static str {
        match self {
            CellErrorKind::InvalidExperiment => "Unknown experiment",
            CellErrorKind::DuplicateExperiment => "Experiment name matches several experiments",
            CellErrorKind::InvalidTarget => "Unknown target",
            CellErrorKind::DuplicateTarget => "Target name matches several resources",
            CellErrorKind::InvalidObject => "Scientific object not found",
            CellErrorKind::DuplicateObject => "Scientific object name matches several objects",
            CellErrorKind::ObjectNameAmbiguity => {
                "Scientific object name used without an experiment"
            }
            CellErrorKind::InvalidDate => "Invalid date",
            CellErrorKind::InvalidDevice => "Unknown device",
            CellErrorKind::DuplicateDevice => "Device name matches several devices",
            CellErrorKind::DeviceChoiceAmbiguity => "Provenance device choice is ambiguous",
            CellErrorKind::MissingRequiredValue => "Missing target or device",
            CellErrorKind::InvalidDatatype => "Value does not match the variable datatype",
            CellErrorKind::DuplicatedData => "Duplicated data",
            CellErrorKind::InvalidAnnotation => "Annotation without target",
        }
    }
}

/// Location and content of an offending cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvCell {
    /// 0-based data row index
    pub row: Option<usize>,
    /// 0-based column index
    pub column: Option<usize>,
    /// Offending cell text
    pub value: Option<String>,
    /// Column header, or a label built from it
    pub header: String,
}

impl CsvCell {
    /// Cell at a known position
    pub fn new(row: usize, column: usize, value: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            row: Some(row),
            column: Some(column),
            value: Some(value.into()),
            header: header.into(),
        }
    }

    /// 1-based line of the cell in the source file
    pub fn line(&self) -> Option<usize> {
        self.row.map(|row| row + DATA_LINE_OFFSET)
    }
}

/// An observation together with the cell it was read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationCell {
    /// 0-based column index of the value
    pub column: usize,
    /// The observation
    pub record: ObservationRecord,
}

/// Outcome of validating (and possibly importing) one CSV file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Header tokens (line 1)
    pub headers: Vec<String>,
    /// Header labels (line 2)
    pub header_labels: Vec<String>,
    /// Missing header alternatives, e.g. `target or scientific_object`
    pub missing_headers: Vec<String>,
    /// 1-based indices of blank header cells
    pub empty_headers: Vec<usize>,
    /// Header tokens that are not known variable URIs
    pub invalid_header_uris: Vec<CsvCell>,
    /// Cell errors, grouped by kind
    pub errors: BTreeMap<CellErrorKind, Vec<CsvCell>>,
    /// Observations by 0-based data row index
    pub records: BTreeMap<usize, Vec<ObservationCell>>,
    /// Device to variable links to create on insertion
    pub associations: BTreeSet<DeviceVariableLink>,
    /// Annotations to create on insertion, targets bound
    pub annotations: Vec<Annotation>,
    /// Number of observations to import
    pub lines_to_import: usize,
    /// Number of observations imported
    pub lines_imported: usize,
    /// Number of data rows the validator went through
    pub rows_checked: usize,
    /// Whether the file can be imported
    pub valid: bool,
    /// Whether the file exceeds the dataset size limit
    pub too_large_dataset: bool,
    /// Whether validation ran
    pub validation_step: bool,
    /// Whether the data was inserted
    pub insertion_step: bool,
    /// Whether some workers were still running when the grace period ended
    pub interrupted: bool,
    /// Global error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Key under which the validation is cached for a later import
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_key: Option<String>,
    /// URI of the inserted batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_uri: Option<String>,
    /// URI of the archived source document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_uri: Option<String>,
}

impl ValidationResult {
    /// Create an empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cell error
    pub fn add_error(&mut self, kind: CellErrorKind, cell: CsvCell) {
        self.errors.entry(kind).or_default().push(cell);
    }

    /// Record an observation read from `row`/`column`
    pub fn add_record(&mut self, row: usize, column: usize, record: ObservationRecord) {
        self.records
            .entry(row)
            .or_default()
            .push(ObservationCell { column, record });
    }

    /// Cell errors of one kind
    pub fn errors_of(&self, kind: CellErrorKind) -> &[CsvCell] {
        self.errors.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of cell errors
    pub fn cell_error_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    /// Whether the header row was rejected
    pub fn has_header_errors(&self) -> bool {
        !self.missing_headers.is_empty()
            || !self.empty_headers.is_empty()
            || !self.invalid_header_uris.is_empty()
    }

    /// Whether any header or cell error was recorded
    pub fn has_errors(&self) -> bool {
        self.has_header_errors() || self.errors.values().any(|cells| !cells.is_empty())
    }

    /// Number of observations held
    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    /// Observations in row order, with their source cell
    pub fn observations(&self) -> impl Iterator<Item = (usize, &ObservationCell)> {
        self.records
            .iter()
            .flat_map(|(row, cells)| cells.iter().map(move |cell| (*row, cell)))
    }

    /// Human column label: `label(header)`, or the header alone
    pub fn column_label(&self, column: usize) -> String {
        let header = self.headers.get(column).map(String::as_str).unwrap_or_default();
        match self.header_labels.get(column) {
            Some(label) if !label.is_empty() => format!("{}({})", label, header),
            _ => header.to_string(),
        }
    }

    /// Append a partial result.
    ///
    /// Partial results hold disjoint row ranges; merging them in batch order
    /// keeps every record and error.
    pub fn merge(&mut self, other: ValidationResult) {
        if self.headers.is_empty() {
            self.headers = other.headers;
        }
        if self.header_labels.is_empty() {
            self.header_labels = other.header_labels;
        }
        self.missing_headers.extend(other.missing_headers);
        self.empty_headers.extend(other.empty_headers);
        self.invalid_header_uris.extend(other.invalid_header_uris);
        for (kind, cells) in other.errors {
            self.errors.entry(kind).or_default().extend(cells);
        }
        for (row, cells) in other.records {
            self.records.entry(row).or_default().extend(cells);
        }
        self.associations.extend(other.associations);
        self.annotations.extend(other.annotations);
        self.lines_to_import += other.lines_to_import;
        self.lines_imported += other.lines_imported;
        self.rows_checked += other.rows_checked;
        self.too_large_dataset |= other.too_large_dataset;
        self.interrupted |= other.interrupted;
        if self.error_message.is_none() {
            self.error_message = other.error_message;
        }
    }

    /// Compute the valid flag from the accumulated errors
    pub fn finalize(&mut self) {
        self.valid = !self.has_errors()
            && !self.too_large_dataset
            && !self.interrupted
            && self.error_message.is_none();
    }
}
