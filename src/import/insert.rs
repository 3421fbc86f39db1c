//! Insertion of a validated import.

use std::time::Instant;

use chrono::Utc;
use log::{debug, warn};
use uuid::Uuid;

use crate::store::{BatchHistory, ImportBatch, ObservationSink, SinkError};

use super::archive::archive_document;
use super::error::ImportError;
use super::result::{CellErrorKind, CsvCell, ValidationResult};

/// Value reported for a storage duplicate that cannot be traced to a cell
pub const UNKNOWN_VALUE: &str = "Unknown value";
/// Header reported for a storage duplicate that cannot be traced to a cell
pub const UNKNOWN_VARIABLE: &str = "Unknown variable";

/// Commit the observations, links and annotations of a valid result, with
/// the zipped source file, as one batch.
///
/// Storage conflicts are reported in `result` with the validation error
/// kinds; only a fatal storage failure is returned as an error, in which
/// case nothing was committed.
pub(crate) fn insert_validated(
    sink: &dyn ObservationSink,
    result: &mut ValidationResult,
    content: &[u8],
    publisher: Option<&str>,
) -> Result<(), ImportError> {
    let started = Instant::now();
    let publication_date = Utc::now();
    let batch_uri = format!("urn:uuid:{}", Uuid::new_v4());
    debug!("Inserting {} observation(s) as batch {}", result.record_count(), batch_uri);

    let document = archive_document(&batch_uri, content, publisher, publication_date)?;

    let mut origins = Vec::with_capacity(result.record_count());
    let mut records = Vec::with_capacity(result.record_count());
    for (row, cell) in result.observations() {
        origins.push((row, cell.column, cell.record.value.to_string()));
        let mut record = cell.record.clone();
        record.batch_uri = Some(batch_uri.clone());
        record.publication_date = Some(publication_date);
        records.push(record);
    }

    let batch = ImportBatch {
        history: BatchHistory {
            uri: batch_uri.clone(),
            publication_date,
            publisher: publisher.map(str::to_string),
            document_uri: Some(document.uri.clone()),
        },
        records,
        associations: result.associations.iter().cloned().collect(),
        annotations: result.annotations.clone(),
        document: Some(document),
    };

    let cell_of = |index: usize, result: &ValidationResult| match origins.get(index) {
        Some((row, column, value)) => CsvCell::new(*row, *column, value.as_str(), result.column_label(*column)),
        None => unknown_cell(),
    };

    match sink.insert_batch(batch) {
        Ok(receipt) => {
            result.insertion_step = true;
            result.lines_imported = receipt.records_inserted;
            result.batch_uri = Some(receipt.batch_uri);
            result.document_uri = receipt.document_uri;
        }
        Err(SinkError::Duplicates(indices)) => {
            warn!("Storage rejected {} duplicate observation(s)", indices.len());
            for index in indices {
                let cell = cell_of(index, result);
                result.add_error(CellErrorKind::DuplicatedData, cell);
            }
        }
        Err(SinkError::UnknownDuplicate) => {
            warn!("Storage rejected a duplicate observation");
            result.add_error(CellErrorKind::DuplicatedData, unknown_cell());
        }
        Err(SinkError::InvalidValue { index }) => {
            warn!("Storage rejected the value of observation {}", index);
            let cell = cell_of(index, result);
            result.add_error(CellErrorKind::InvalidDatatype, cell);
        }
        Err(SinkError::TooLarge { limit, size }) => {
            warn!("Storage rejected {} observations, limit is {}", size, limit);
            result.too_large_dataset = true;
        }
        Err(e @ SinkError::Fatal(_)) => return Err(e.into()),
    }

    result.finalize();
    debug!("Insertion step completed in {} ms", started.elapsed().as_millis());
    Ok(())
}

fn unknown_cell() -> CsvCell {
    CsvCell {
        row: None,
        column: None,
        value: Some(UNKNOWN_VALUE.to_string()),
        header: UNKNOWN_VARIABLE.to_string(),
    }
}
