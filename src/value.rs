//! Property values - the typed values carried by entity properties
//!
//! A property is declared on a type with one of three value kinds
//! (`INT`, `DOUBLE`, `STRING`) and an instance supplies a value of
//! exactly that kind. Custom properties carry the same values but are
//! not constrained by any declaration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The declared kind of a property on a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    /// 64-bit signed integer
    Int,
    /// 64-bit float
    Double,
    /// UTF-8 string
    String,
}

impl PropertyType {
    /// Get the string representation of the property type
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Int => "int",
            PropertyType::Double => "double",
            PropertyType::String => "string",
        }
    }

    /// Get all property types
    pub fn all() -> &'static [PropertyType] {
        &[PropertyType::Int, PropertyType::Double, PropertyType::String]
    }

    /// Stable wire/storage code for this kind (stored in `TypeProperty.data_type`)
    pub(crate) fn code(&self) -> i64 {
        match self {
            PropertyType::Int => 1,
            PropertyType::Double => 2,
            PropertyType::String => 3,
        }
    }

    /// Reverse of [`PropertyType::code`]; `None` for unknown codes.
    pub(crate) fn from_code(code: i64) -> Option<PropertyType> {
        match code {
            1 => Some(PropertyType::Int),
            2 => Some(PropertyType::Double),
            3 => Some(PropertyType::String),
            _ => None,
        }
    }
}

impl FromStr for PropertyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "int" | "integer" => Ok(PropertyType::Int),
            "double" | "float" => Ok(PropertyType::Double),
            "string" | "text" => Ok(PropertyType::String),
            _ => Err(Error::InvalidArgument(format!("Unknown property type: {}", s))),
        }
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed property value; carries exactly one of the three kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyValue {
    Int(i64),
    Double(f64),
    String(String),
}

impl PropertyValue {
    /// The kind this value satisfies when matched against a declaration
    pub fn property_type(&self) -> PropertyType {
        match self {
            PropertyValue::Int(_) => PropertyType::Int,
            PropertyValue::Double(_) => PropertyType::Double,
            PropertyValue::String(_) => PropertyType::String,
        }
    }

    /// The integer value, if this is an `Int`
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The float value, if this is a `Double`
    pub fn as_double(&self) -> Option<f64> {
        match self {
            PropertyValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// The string value, if this is a `String`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}
