//! Archiving of the imported CSV as a zipped document.

use std::io::{Cursor, Write};

use chrono::{DateTime, Utc};
use log::info;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::store::{ArchivedDocument, IMPORTED_DATASET_TYPE};

use super::error::ImportError;

/// Title prefix of archived import documents
pub const DOCUMENT_NAME: &str = "imported_data";

const BEST_COMPRESSION: i64 = 9;

/// Zip `content` into a single `<name>.csv` entry at the best deflate level
pub fn zip_csv(name: &str, content: &[u8]) -> Result<Vec<u8>, ImportError> {
    let mut zip_writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(BEST_COMPRESSION))
        .unix_permissions(0o644);
    zip_writer.start_file(format!("{}.csv", name), options)?;
    zip_writer.write_all(content)?;
    Ok(zip_writer.finish()?.into_inner())
}

/// Build the document archiving the CSV imported as batch `batch_uri`
pub(crate) fn archive_document(
    batch_uri: &str,
    content: &[u8],
    publisher: Option<&str>,
    date: DateTime<Utc>,
) -> Result<ArchivedDocument, ImportError> {
    let batch_id = batch_uri.rsplit(':').next().unwrap_or(batch_uri);
    let archive = zip_csv(batch_id, content)?;
    info!("CSV zipped for batch {} ({} bytes)", batch_uri, archive.len());

    Ok(ArchivedDocument {
        uri: format!("urn:uuid:{}", Uuid::new_v4()),
        title: format!("{}_{}", DOCUMENT_NAME, batch_id),
        format: "zip".to_string(),
        rdf_type: IMPORTED_DATASET_TYPE.to_string(),
        targets: vec![batch_uri.to_string()],
        publisher: publisher.map(str::to_string),
        date,
        size: archive.len(),
        content: archive,
    })
}
