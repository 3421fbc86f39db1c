use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Open Annotation "commenting" motivation, used for row annotations
pub const OA_COMMENTING: &str = "http://www.w3.org/ns/oa#commenting";

/// A typed observation value, coerced from the cell text using the
/// variable's declared datatype
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    /// `xsd:integer`
    Integer(i64),
    /// `xsd:decimal`, `xsd:double`, `xsd:float`
    Decimal(f64),
    /// `xsd:boolean`
    Boolean(bool),
    /// `xsd:date`
    Date(NaiveDate),
    /// `xsd:dateTime`, kept as the validated source text
    DateTime(String),
    /// `xsd:string` and undeclared datatypes
    Text(String),
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Integer(v) => write!(f, "{}", v),
            DataValue::Decimal(v) => write!(f, "{}", v),
            DataValue::Boolean(v) => write!(f, "{}", v),
            DataValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            DataValue::DateTime(v) | DataValue::Text(v) => f.write_str(v),
        }
    }
}

/// An agent the observation was produced with, tagged with its root type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRef {
    /// Agent URI
    pub uri: String,
    /// Root device type of the agent, when known
    pub rdf_type: Option<String>,
}

/// Provenance reference carried by every observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRef {
    /// Provenance URI
    pub uri: String,
    /// Experiments the observation belongs to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub experiments: Vec<String>,
    /// Agents the observation was produced with
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub was_associated_with: Vec<AgentRef>,
}

/// A single observation: one valid data cell of an imported file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    /// Observed variable URI
    pub variable: String,
    /// Target of the observation, if any
    pub target: Option<String>,
    /// Observation instant
    pub date: DateTime<Utc>,
    /// UTC offset the date was expressed in (`Z` or `+HH:MM`)
    pub offset: String,
    /// Whether the source date carried a time component
    pub is_datetime: bool,
    /// Typed value
    pub value: DataValue,
    /// Optional raw values backing the observation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<Vec<DataValue>>,
    /// Provenance of the observation
    pub provenance: ProvenanceRef,
    /// Import batch the observation was inserted with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_uri: Option<String>,
    /// Insertion timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<DateTime<Utc>>,
}

impl ObservationRecord {
    /// Device backing the observation, if the provenance names one
    pub fn device(&self) -> Option<&str> {
        self.provenance
            .was_associated_with
            .first()
            .map(|agent| agent.uri.as_str())
    }
}

/// A free-text annotation attached to the target of a data row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Annotation text
    pub description: String,
    /// Motivation concept URI
    pub motivation: String,
    /// Annotated resources
    pub targets: Vec<String>,
    /// Publishing user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
}

impl Annotation {
    /// Create a comment whose target is not yet known
    pub fn comment(description: impl Into<String>, publisher: Option<&str>) -> Self {
        Self {
            description: description.into(),
            motivation: OA_COMMENTING.to_string(),
            targets: Vec::new(),
            publisher: publisher.map(str::to_string),
        }
    }
}
