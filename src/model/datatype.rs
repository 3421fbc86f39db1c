use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use super::date::parse_date;
use super::observation::DataValue;

/// XML Schema namespace used by full datatype URIs
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema#";

/// Declared datatype of a variable, as far as value coercion is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XsdDatatype {
    /// `xsd:integer` (and `int`, `long`)
    Integer,
    /// `xsd:decimal`, `xsd:double`, `xsd:float`
    Decimal,
    /// `xsd:boolean`
    Boolean,
    /// `xsd:date`
    Date,
    /// `xsd:dateTime`
    DateTime,
    /// `xsd:string` and anything unrecognised
    String,
}

/// A cell value that does not fit the declared datatype
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{value}' is not a valid {datatype:?}")]
pub struct DatatypeMismatch {
    /// The rejected text
    pub value: String,
    /// The expected datatype
    pub datatype: XsdDatatype,
}

impl XsdDatatype {
    /// Map a datatype URI, either prefixed (`xsd:integer`) or full
    /// (`http://www.w3.org/2001/XMLSchema#integer`), to a coercion rule
    pub fn from_uri(uri: &str) -> Self {
        let local = uri
            .strip_prefix(XSD_NAMESPACE)
            .or_else(|| uri.strip_prefix("xsd:"))
            .unwrap_or(uri);
        match local.to_ascii_lowercase().as_str() {
            "integer" | "int" | "long" => XsdDatatype::Integer,
            "decimal" | "double" | "float" => XsdDatatype::Decimal,
            "boolean" => XsdDatatype::Boolean,
            "date" => XsdDatatype::Date,
            "datetime" => XsdDatatype::DateTime,
            _ => XsdDatatype::String,
        }
    }

    /// Coerce cell text into a typed value.
    ///
    /// `xsd:dateTime` values are validated with the observation date parser,
    /// hence the offset argument.
    pub fn coerce(&self, raw: &str, default_offset: FixedOffset) -> Result<DataValue, DatatypeMismatch> {
        let value = raw.trim();
        let mismatch = || DatatypeMismatch {
            value: value.to_string(),
            datatype: *self,
        };

        match self {
            XsdDatatype::Integer => value.parse::<i64>().map(DataValue::Integer).map_err(|_| mismatch()),
            XsdDatatype::Decimal => match value.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(DataValue::Decimal(v)),
                _ => Err(mismatch()),
            },
            XsdDatatype::Boolean => {
                if value.eq_ignore_ascii_case("true") {
                    Ok(DataValue::Boolean(true))
                } else if value.eq_ignore_ascii_case("false") {
                    Ok(DataValue::Boolean(false))
                } else {
                    Err(mismatch())
                }
            }
            XsdDatatype::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(DataValue::Date)
                .map_err(|_| mismatch()),
            XsdDatatype::DateTime => match parse_date(value, default_offset) {
                Some(parsed) if parsed.is_datetime => Ok(DataValue::DateTime(value.to_string())),
                _ => Err(mismatch()),
            },
            XsdDatatype::String => Ok(DataValue::Text(value.to_string())),
        }
    }
}
