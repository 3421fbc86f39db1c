//! # silex-import - Bulk Import of Scientific Observations
//!
//! `silex_import` validates CSV files of field and greenhouse observations
//! against experiment, scientific object, device and variable reference data,
//! then commits the resolved observations as a single atomic batch.
//!
//! ## Key Features
//!
//! - **Full-file validation**: every cell error of a file is reported at once,
//!   with its line, column, value and column label, up to an error budget.
//!
//! - **Parallel row validation**: rows are validated by a pool of workers that
//!   share read-through caches, so each distinct reference is looked up once.
//!
//! - **Provenance devices**: observations without a device column are bound to
//!   the device of their provenance when that choice is unambiguous.
//!
//! - **Atomic insertion**: observations, device links, annotations and the
//!   zipped source file are committed together or not at all; storage-level
//!   duplicates are reported as cell errors.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use silex_import::prelude::*;
//!
//! let store = Arc::new(MemoryStore::from_file("references.json")?);
//! let importer = DataImporter::new(store.clone(), store.clone(), ImportConfig::default())
//!     .with_user("http://example.org/users#alice");
//!
//! let content = std::fs::read("observations.csv")?;
//! let validation = importer.validate_csv("http://example.org/prov/1", None, &content)?;
//! println!("{}", validation);
//!
//! if validation.valid {
//!     let key = validation.validation_key.as_deref();
//!     let result = importer.import_csv("http://example.org/prov/1", None, &content, key)?;
//!     println!("Imported {} observations", result.lines_imported);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## File Format
//!
//! | Line | Content |
//! |------|---------|
//! | 1 | Column tokens: `experiment`, `target`, `scientific_object`, `date`, `device`, `raw_data`, `object_annotation` or a variable URI |
//! | 2 | Human-readable column labels |
//! | 3 | Reserved, ignored |
//! | 4+ | One sampling event per row |
//!
//! ## Architecture
//!
//! - [`model`]: Domain values, date parsing and datatype coercion
//! - [`store`]: Reference lookup and storage contracts, in-memory implementation
//! - [`import`]: Header classification, row validation, batch scheduling, insertion

// Documentation lints - enforce complete documentation for publication
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod import;
pub mod model;
pub mod store;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::import::{
        CellErrorKind, CsvCell, DataImporter, ImportConfig, ImportError, ImportReport,
        ValidationResult,
    };
    pub use crate::model::{DataValue, ObservationRecord, Provenance};
    pub use crate::store::{MemoryStore, ObservationSink, ReferenceStore, Resolution};
}
