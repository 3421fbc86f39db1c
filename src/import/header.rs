//! Header row classification.

use log::{debug, info};

use crate::model::{is_valid_uri, XsdDatatype};
use crate::store::ReferenceStore;

use super::error::ImportError;
use super::result::{CsvCell, ValidationResult};

/// `experiment` column keyword
pub const EXPERIMENT_HEADER: &str = "experiment";
/// `target` column keyword
pub const TARGET_HEADER: &str = "target";
/// `date` column keyword
pub const DATE_HEADER: &str = "date";
/// `device` column keyword
pub const DEVICE_HEADER: &str = "device";
/// `scientific_object` column keyword
pub const SCIENTIFIC_OBJECT_HEADER: &str = "scientific_object";
/// `raw_data` column keyword
pub const RAW_DATA_HEADER: &str = "raw_data";
/// `object_annotation` column keyword
pub const ANNOTATION_HEADER: &str = "object_annotation";

/// A column holding values of a measured variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableColumn {
    /// Variable URI
    pub uri: String,
    /// Declared datatype URI
    pub datatype_uri: String,
    /// Coercion rule derived from the datatype
    pub datatype: XsdDatatype,
}

/// Semantic role of a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRole {
    /// Experiment name or URI
    Experiment,
    /// Target name or URI
    Target,
    /// Observation date
    Date,
    /// Device name or URI
    Device,
    /// Scientific object name or URI
    ScientificObject,
    /// Raw values of the preceding variable column
    RawData,
    /// Free-text annotation on the row target
    Annotation,
    /// Values of a measured variable
    Variable(VariableColumn),
}

impl ColumnRole {
    fn from_keyword(header: &str) -> Option<Self> {
        match header.to_ascii_lowercase().as_str() {
            EXPERIMENT_HEADER => Some(ColumnRole::Experiment),
            TARGET_HEADER => Some(ColumnRole::Target),
            DATE_HEADER => Some(ColumnRole::Date),
            DEVICE_HEADER => Some(ColumnRole::Device),
            SCIENTIFIC_OBJECT_HEADER => Some(ColumnRole::ScientificObject),
            RAW_DATA_HEADER => Some(ColumnRole::RawData),
            ANNOTATION_HEADER => Some(ColumnRole::Annotation),
            _ => None,
        }
    }
}

/// Column index to role mapping of a file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    roles: Vec<Option<ColumnRole>>,
}

impl HeaderMap {
    /// Role of a column; `None` for rejected or out-of-range columns
    pub fn role(&self, column: usize) -> Option<&ColumnRole> {
        self.roles.get(column).and_then(Option::as_ref)
    }

    /// Columns and their roles, in file order
    pub fn columns(&self) -> impl Iterator<Item = (usize, &ColumnRole)> {
        self.roles
            .iter()
            .enumerate()
            .filter_map(|(column, role)| role.as_ref().map(|role| (column, role)))
    }

    /// First column with the given role
    pub fn column_of(&self, role: &ColumnRole) -> Option<usize> {
        self.roles.iter().position(|r| r.as_ref() == Some(role))
    }
}

/// Classify the header row, recording header errors in `result`.
///
/// `device_from_provenance` tells whether the import provenance has a
/// device-typed agent that can stand in for a device column. A variable
/// without declared datatype is a fatal error.
pub fn classify_headers(
    headers: &[String],
    device_from_provenance: bool,
    store: &dyn ReferenceStore,
    result: &mut ValidationResult,
) -> Result<HeaderMap, ImportError> {
    let keywords: Vec<String> = headers
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();
    let present = |keyword: &str| keywords.iter().any(|k| k == keyword);

    if !present(DEVICE_HEADER)
        && !present(TARGET_HEADER)
        && !present(SCIENTIFIC_OBJECT_HEADER)
        && !device_from_provenance
    {
        result.missing_headers.push(format!(
            "{} or {} or {}",
            DEVICE_HEADER, TARGET_HEADER, SCIENTIFIC_OBJECT_HEADER
        ));
    }
    if present(ANNOTATION_HEADER) && !present(TARGET_HEADER) && !present(SCIENTIFIC_OBJECT_HEADER) {
        result
            .missing_headers
            .push(format!("{} or {}", TARGET_HEADER, SCIENTIFIC_OBJECT_HEADER));
    }
    if !present(DATE_HEADER) {
        result.missing_headers.push(DATE_HEADER.to_string());
    }

    let mut roles = Vec::with_capacity(headers.len());
    for (column, header) in headers.iter().enumerate() {
        let header = header.trim();
        if header.is_empty() {
            result.empty_headers.push(column + 1);
            roles.push(None);
            continue;
        }
        if let Some(role) = ColumnRole::from_keyword(header) {
            roles.push(Some(role));
            continue;
        }

        let variable = if is_valid_uri(header) {
            store.variable(header)?
        } else {
            None
        };
        match variable {
            Some(variable) => {
                let datatype_uri = variable.datatype.ok_or_else(|| ImportError::MissingDatatype {
                    variable: variable.uri.clone(),
                })?;
                debug!("Column {} holds variable {} ({})", column, variable.uri, datatype_uri);
                roles.push(Some(ColumnRole::Variable(VariableColumn {
                    datatype: XsdDatatype::from_uri(&datatype_uri),
                    uri: variable.uri,
                    datatype_uri,
                })));
            }
            None => {
                result.invalid_header_uris.push(CsvCell {
                    row: None,
                    column: Some(column),
                    value: Some(header.to_string()),
                    header: header.to_string(),
                });
                roles.push(None);
            }
        }
    }

    if result.has_header_errors() {
        info!(
            "Header rejected: {} missing, {} empty, {} invalid URI(s)",
            result.missing_headers.len(),
            result.empty_headers.len(),
            result.invalid_header_uris.len()
        );
    }

    Ok(HeaderMap { roles })
}
