//! # Bulk CSV Import
//!
//! Validation and insertion of observation files.
//!
//! A file has three header lines (variable or keyword tokens, human labels,
//! a reserved line) followed by one row per sampling event. Validation
//! resolves every reference of every row against a [`ReferenceStore`] and
//! accumulates cell errors in a [`ValidationResult`]; a file with no error
//! can then be committed to an [`ObservationSink`] as a single batch.
//!
//! ## Pipeline
//!
//! 1. **Headers**: columns are classified; missing, empty or unknown headers
//!    stop the validation before any row is read.
//! 2. **Rows**: rows are validated in parallel batches that share read-through
//!    caches of the resolved references, until the error budget is spent.
//! 3. **Insertion**: observations, device links and annotations are committed
//!    atomically with the zipped source file.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use silex_import::import::{DataImporter, ImportConfig};
//! use silex_import::store::MemoryStore;
//!
//! let store = Arc::new(MemoryStore::from_file("references.json")?);
//! let importer = DataImporter::new(store.clone(), store, ImportConfig::default());
//!
//! let content = std::fs::read("observations.csv")?;
//! let result = importer.import_csv("http://example.org/provenance/1", None, &content, None)?;
//! println!("{}", result);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::sync::Arc;
use std::time::Instant;

use csv::{ReaderBuilder, Trim};
use log::{debug, info, warn};

use crate::model::{Device, Provenance};
use crate::store::{ObservationSink, ReferenceStore};

mod archive;
mod cache;
mod config;
mod error;
mod header;
mod insert;
mod report;
mod result;
mod row;
mod scheduler;
mod validation_cache;

#[cfg(test)]
mod tests;

pub use archive::{zip_csv, DOCUMENT_NAME};
pub use config::{
    ImportConfig, DEFAULT_GRACE_PERIOD, DEFAULT_MAX_ERRORS, DEFAULT_MAX_ROWS,
    DEFAULT_MIN_BATCH_SIZE, DEFAULT_VALIDATION_TTL, DEFAULT_WORKER_COUNT,
};
pub use error::ImportError;
pub use header::{
    classify_headers, ColumnRole, HeaderMap, VariableColumn, ANNOTATION_HEADER, DATE_HEADER,
    DEVICE_HEADER, EXPERIMENT_HEADER, RAW_DATA_HEADER, SCIENTIFIC_OBJECT_HEADER, TARGET_HEADER,
};
pub use insert::{UNKNOWN_VALUE, UNKNOWN_VARIABLE};
pub use report::{CheckStatus, ImportReport, ReportCheck};
pub use result::{CellErrorKind, CsvCell, ObservationCell, ValidationResult, DATA_LINE_OFFSET};
pub use validation_cache::{validation_key, ValidatedSource, ValidationCache};

use cache::ReferenceCaches;
use row::ValidationRun;

/// Message of a file without data rows
pub const EMPTY_FILE_MESSAGE: &str = "No data imported: The CSV file contains no rows to process";

/// Lines before the first data row: headers, labels, reserved
const HEADER_LINES: usize = 3;

/// Validates and imports CSV observation files
pub struct DataImporter {
    store: Arc<dyn ReferenceStore>,
    sink: Arc<dyn ObservationSink>,
    config: ImportConfig,
    user: Option<String>,
    validations: ValidationCache,
}

impl DataImporter {
    /// Create an importer reading references from `store` and committing
    /// batches to `sink`
    pub fn new(
        store: Arc<dyn ReferenceStore>,
        sink: Arc<dyn ObservationSink>,
        config: ImportConfig,
    ) -> Self {
        let validations = ValidationCache::new(config.validation_ttl);
        Self {
            store,
            sink,
            config,
            user: None,
            validations,
        }
    }

    /// Set the importing user (URI)
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Validate a CSV file without importing it.
    ///
    /// A valid result is kept in the validation cache; its key is returned
    /// in [`ValidationResult::validation_key`].
    pub fn validate_csv(
        &self,
        provenance: &str,
        experiment: Option<&str>,
        content: &[u8],
    ) -> Result<ValidationResult, ImportError> {
        let mut result = self.validate(provenance, experiment, content)?;
        if result.valid {
            let source = ValidatedSource {
                provenance,
                experiment,
                content,
            };
            let key = self.validations.store(self.user.as_deref(), &source, result.clone());
            debug!("Validation cached under {}", key);
            result.validation_key = Some(key);
        }
        Ok(result)
    }

    /// Validate a CSV file and, when it is valid, commit its observations.
    ///
    /// A `validation_key` returned by [`DataImporter::validate_csv`] skips
    /// the validation while the cached result is alive and was computed for
    /// the same provenance, experiment and content. The key is consumed when
    /// that cached result is inserted.
    pub fn import_csv(
        &self,
        provenance: &str,
        experiment: Option<&str>,
        content: &[u8],
        validation_key: Option<&str>,
    ) -> Result<ValidationResult, ImportError> {
        let source = ValidatedSource {
            provenance,
            experiment,
            content,
        };
        let cached = validation_key.and_then(|key| Some((key, self.validations.get(key, &source)?)));
        let (mut result, reused_key) = match cached {
            Some((key, cached)) => {
                self.check_access(experiment)?;
                info!("Reusing cached validation {}", key);
                ((*cached).clone(), Some(key))
            }
            None => (self.validate(provenance, experiment, content)?, None),
        };

        if result.valid {
            insert::insert_validated(self.sink.as_ref(), &mut result, content, self.user.as_deref())?;
            if let Some(key) = reused_key {
                self.validations.invalidate(key);
            }
            info!(
                "Imported {} of {} observation(s)",
                result.lines_imported, result.lines_to_import
            );
        } else {
            info!("Import skipped, the file is not valid");
        }
        Ok(result)
    }

    fn check_access(&self, experiment: Option<&str>) -> Result<(), ImportError> {
        if let Some(experiment) = experiment {
            if !self
                .store
                .check_experiment_access(experiment, self.user.as_deref())?
            {
                return Err(ImportError::ExperimentAccessDenied(experiment.to_string()));
            }
        }
        Ok(())
    }

    fn validate(
        &self,
        provenance: &str,
        experiment: Option<&str>,
        content: &[u8],
    ) -> Result<ValidationResult, ImportError> {
        let started = Instant::now();
        info!("Validating {} bytes of CSV for provenance {}", content.len(), provenance);

        self.check_access(experiment)?;
        let provenance = self
            .store
            .provenance(provenance)?
            .ok_or_else(|| ImportError::ProvenanceNotFound(provenance.to_string()))?;

        let caches = ReferenceCaches::new();
        let (device_from_provenance, provenance_devices) = self.provenance_devices(&provenance)?;
        for device in &provenance_devices {
            caches.root_type(self.store.as_ref(), &device.rdf_type)?;
        }

        let mut lines = read_rows(content)?.into_iter();
        let headers = lines.next().unwrap_or_default();
        let labels = lines.next().unwrap_or_default();
        let rows: Vec<Vec<String>> = lines.skip(HEADER_LINES - 2).collect();

        let mut result = ValidationResult::new();
        result.headers = headers.clone();
        result.header_labels = labels.clone();

        let header_map = classify_headers(&headers, device_from_provenance, self.store.as_ref(), &mut result)?;
        if result.has_header_errors() {
            result.finalize();
            return Ok(result);
        }

        if rows.is_empty() {
            info!("{}", EMPTY_FILE_MESSAGE);
            result.error_message = Some(EMPTY_FILE_MESSAGE.to_string());
            result.finalize();
            return Ok(result);
        }

        if rows.len() > self.config.max_rows {
            warn!(
                "Dataset of {} rows exceeds the limit of {} rows",
                rows.len(),
                self.config.max_rows
            );
            result.too_large_dataset = true;
            result.lines_to_import = rows.len();
            result.finalize();
            return Ok(result);
        }

        let row_count = rows.len();
        let run = Arc::new(ValidationRun {
            store: Arc::clone(&self.store),
            caches,
            headers: header_map,
            header_tokens: headers,
            header_labels: labels,
            provenance,
            experiment: experiment.map(str::to_string),
            user: self.user.clone(),
            device_from_provenance,
            provenance_devices,
            default_offset: self.config.default_offset,
        });

        let rows_result = scheduler::validate_rows(run, rows, &self.config)?;
        result.merge(rows_result);
        result.lines_to_import = result.record_count();
        result.validation_step = true;
        result.finalize();

        info!(
            "Validated {} of {} row(s) in {} ms: {} observation(s), {} cell error(s)",
            result.rows_checked,
            row_count,
            started.elapsed().as_millis(),
            result.lines_to_import,
            result.cell_error_count()
        );
        Ok(result)
    }

    /// Whether the provenance has a device-typed agent, and the devices
    /// behind those agents
    fn provenance_devices(&self, provenance: &Provenance) -> Result<(bool, Vec<Device>), ImportError> {
        let mut device_typed = false;
        let mut devices = Vec::new();
        for agent in &provenance.agents {
            let Some(rdf_type) = agent.rdf_type.as_deref() else {
                continue;
            };
            if !self.store.is_device_type(rdf_type)? {
                continue;
            }
            device_typed = true;
            match self.store.device_by_uri(&agent.uri)? {
                Some(device) => devices.push(device),
                None => debug!("Provenance agent {} is not a known device", agent.uri),
            }
        }
        Ok((device_typed, devices))
    }
}

impl std::fmt::Debug for DataImporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataImporter")
            .field("config", &self.config)
            .field("user", &self.user)
            .field("validations", &self.validations)
            .finish()
    }
}

/// Delimiters recognised in the header line, by precedence on ties
const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Most frequent delimiter of the first non-blank line, outside quotes.
/// Falls back to a comma.
pub(crate) fn detect_delimiter(content: &[u8]) -> u8 {
    let header = content
        .split(|&byte| byte == b'\n')
        .find(|line| line.iter().any(|byte| !byte.is_ascii_whitespace()))
        .unwrap_or_default();

    let mut counts = [0usize; DELIMITERS.len()];
    let mut quoted = false;
    for &byte in header {
        if byte == b'"' {
            quoted = !quoted;
        } else if !quoted {
            if let Some(i) = DELIMITERS.iter().position(|&d| d == byte) {
                counts[i] += 1;
            }
        }
    }

    let best = (1..DELIMITERS.len()).fold(0, |best, i| if counts[i] > counts[best] { i } else { best });
    DELIMITERS[best]
}

/// Decode every line of the file; cells are trimmed and rows may be ragged
fn read_rows(content: &[u8]) -> Result<Vec<Vec<String>>, ImportError> {
    let delimiter = detect_delimiter(content);
    if delimiter != b',' {
        debug!("Reading CSV with delimiter {:?}", delimiter as char);
    }
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(content);

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|cell| String::from_utf8_lossy(cell).into_owned())
                .collect(),
        );
    }
    Ok(rows)
}
