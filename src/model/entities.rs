use serde::{Deserialize, Serialize};

/// An experiment observations can be attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Experiment {
    /// Experiment URI
    pub uri: String,
    /// Human-readable experiment name
    pub name: String,
}

/// A resource an observation is about: a scientific object, a facility or
/// any addressable URI
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamedResource {
    /// Resource URI
    pub uri: String,
    /// Resource name, when the store knows one
    #[serde(default)]
    pub name: Option<String>,
}

impl NamedResource {
    /// Create a resource with a URI and a name
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: Some(name.into()),
        }
    }
}

/// A sensing or actuating device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    /// Device URI
    pub uri: String,
    /// Device name
    pub name: String,
    /// Concrete ontology type of the device
    pub rdf_type: String,
}

/// A measured variable, the header of a value column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Variable URI
    pub uri: String,
    /// Variable name
    #[serde(default)]
    pub name: String,
    /// Declared XSD datatype URI
    #[serde(default)]
    pub datatype: Option<String>,
}

/// A provenance participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Agent URI (a device, an operator account, ...)
    pub uri: String,
    /// Ontology type of the agent, if declared
    #[serde(default)]
    pub rdf_type: Option<String>,
}

/// How, by whom and by what device a set of observations was produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Provenance URI
    pub uri: String,
    /// Provenance name
    #[serde(default)]
    pub name: String,
    /// Participants of the provenance
    #[serde(default)]
    pub agents: Vec<Agent>,
}

/// A device to variable association, created when an import links a device
/// to a variable it was not yet known to measure
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceVariableLink {
    /// Device URI
    pub device: String,
    /// Variable URI
    pub variable: String,
}

impl DeviceVariableLink {
    /// Create a new device to variable link
    pub fn new(device: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            variable: variable.into(),
        }
    }
}

/// Check that a token is an absolute URI: a scheme, a colon and a non-empty
/// remainder without whitespace.
pub fn is_valid_uri(token: &str) -> bool {
    let Some((scheme, rest)) = token.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let starts_alpha = chars.next().map_or(false, |c| c.is_ascii_alphabetic());
    starts_alpha
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && !rest.is_empty()
        && !token.chars().any(|c| c.is_whitespace() || c.is_control())
        && !token.contains(['<', '>', '"', '{', '}', '|', '\\', '^', '`'])
}
