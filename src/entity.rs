//! Entity records - artifacts, executions, and contexts
//!
//! The three instance kinds differ only in their kind-specific field
//! (`uri` for artifacts, `name` for contexts, nothing for executions);
//! everything else is shared: a server-assigned id, a reference to a
//! registered type, declared properties validated against that type, and
//! free-form custom properties. The [`EntityRecord`] trait carries that
//! shared shape so the entity store is written once.

use crate::types::TypeKind;
use crate::value::PropertyValue;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Common access to the three entity structs.
///
/// `extra` is the kind-specific column: the artifact's uri or the context's
/// name. Executions have none.
pub trait EntityRecord: Clone {
    /// Which kind of entity (and which tables) this record targets
    const KIND: TypeKind;

    /// Rebuild a record from its stored parts
    fn from_parts(
        id: i64,
        type_id: i64,
        extra: Option<String>,
        properties: BTreeMap<String, PropertyValue>,
        custom_properties: BTreeMap<String, PropertyValue>,
    ) -> Self;

    /// The assigned id; 0 means "unset" and requests an insert
    fn id(&self) -> i64;

    /// The referenced type id; 0 means "unset"
    fn type_id(&self) -> i64;

    /// The kind-specific column value, if the kind has one
    fn extra(&self) -> Option<&str>;

    /// Declared properties, validated against the type
    fn properties(&self) -> &BTreeMap<String, PropertyValue>;

    /// Free-form properties, not constrained by the type
    fn custom_properties(&self) -> &BTreeMap<String, PropertyValue>;

    /// Kind-specific validation applied before any write
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// A data object produced or consumed by an execution, addressed by URI.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Artifact {
    /// Server-assigned id; 0 until stored
    pub id: i64,
    /// Id of the registered `ArtifactType`
    pub type_id: i64,
    /// Free-form location; `None` and `""` are equivalent ("unset")
    pub uri: Option<String>,
    /// Declared properties (must match the type)
    pub properties: BTreeMap<String, PropertyValue>,
    /// Free-form properties
    pub custom_properties: BTreeMap<String, PropertyValue>,
}

impl Artifact {
    /// Create a new artifact of the given type (id unset)
    pub fn new(type_id: i64) -> Self {
        Self {
            type_id,
            ..Default::default()
        }
    }

    /// Set the uri
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set a declared property
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Set a custom property
    pub fn with_custom_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.custom_properties.insert(name.into(), value.into());
        self
    }
}

impl EntityRecord for Artifact {
    const KIND: TypeKind = TypeKind::Artifact;

    fn from_parts(
        id: i64,
        type_id: i64,
        extra: Option<String>,
        properties: BTreeMap<String, PropertyValue>,
        custom_properties: BTreeMap<String, PropertyValue>,
    ) -> Self {
        Self {
            id,
            type_id,
            uri: extra,
            properties,
            custom_properties,
        }
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn type_id(&self) -> i64 {
        self.type_id
    }

    fn extra(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    fn custom_properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.custom_properties
    }
}

/// One run of a pipeline step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Execution {
    /// Server-assigned id; 0 until stored
    pub id: i64,
    /// Id of the registered `ExecutionType`
    pub type_id: i64,
    /// Declared properties (must match the type)
    pub properties: BTreeMap<String, PropertyValue>,
    /// Free-form properties
    pub custom_properties: BTreeMap<String, PropertyValue>,
}

impl Execution {
    /// Create a new execution of the given type (id unset)
    pub fn new(type_id: i64) -> Self {
        Self {
            type_id,
            ..Default::default()
        }
    }

    /// Set a declared property
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Set a custom property
    pub fn with_custom_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.custom_properties.insert(name.into(), value.into());
        self
    }
}

impl EntityRecord for Execution {
    const KIND: TypeKind = TypeKind::Execution;

    fn from_parts(
        id: i64,
        type_id: i64,
        _extra: Option<String>,
        properties: BTreeMap<String, PropertyValue>,
        custom_properties: BTreeMap<String, PropertyValue>,
    ) -> Self {
        Self {
            id,
            type_id,
            properties,
            custom_properties,
        }
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn type_id(&self) -> i64 {
        self.type_id
    }

    fn extra(&self) -> Option<&str> {
        None
    }

    fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    fn custom_properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.custom_properties
    }
}

/// A grouping (pipeline, run, experiment) that artifacts and executions
/// attach to. Its name is unique within its type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Context {
    /// Server-assigned id; 0 until stored
    pub id: i64,
    /// Id of the registered `ContextType`
    pub type_id: i64,
    /// Required name, unique within `type_id`
    pub name: String,
    /// Declared properties (must match the type)
    pub properties: BTreeMap<String, PropertyValue>,
    /// Free-form properties
    pub custom_properties: BTreeMap<String, PropertyValue>,
}

impl Context {
    /// Create a new context of the given type (id unset)
    pub fn new(type_id: i64, name: impl Into<String>) -> Self {
        Self {
            type_id,
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set a declared property
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Set a custom property
    pub fn with_custom_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.custom_properties.insert(name.into(), value.into());
        self
    }
}

impl EntityRecord for Context {
    const KIND: TypeKind = TypeKind::Context;

    fn from_parts(
        id: i64,
        type_id: i64,
        extra: Option<String>,
        properties: BTreeMap<String, PropertyValue>,
        custom_properties: BTreeMap<String, PropertyValue>,
    ) -> Self {
        Self {
            id,
            type_id,
            name: extra.unwrap_or_default(),
            properties,
            custom_properties,
        }
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn type_id(&self) -> i64 {
        self.type_id
    }

    fn extra(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    fn custom_properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.custom_properties
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidArgument(
                "context name must be specified".to_string(),
            ));
        }
        Ok(())
    }
}
