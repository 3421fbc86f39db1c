//! # Domain Model
//!
//! Value types shared by the import pipeline and its collaborators:
//!
//! 1. **Reference entities**: experiments, targets, devices, variables and
//!    provenances as returned by the metadata store
//!
//! 2. **Observations**: the records produced for every valid data cell, with
//!    their typed value, parsed date and provenance reference
//!
//! 3. **Parsing helpers**: XSD datatype coercion and the observation date
//!    parser used for the `date` column

mod date;
mod datatype;
mod entities;
mod observation;

#[cfg(test)]
mod tests;

pub use date::{format_offset, parse_date, parse_offset, ParsedDate};
pub use datatype::{DatatypeMismatch, XsdDatatype, XSD_NAMESPACE};
pub use entities::{
    is_valid_uri, Agent, Device, DeviceVariableLink, Experiment, NamedResource, Provenance,
    Variable,
};
pub use observation::{
    AgentRef, Annotation, DataValue, ObservationRecord, ProvenanceRef, OA_COMMENTING,
};
