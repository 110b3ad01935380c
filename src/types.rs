//! Type records - the schema registry's unit of registration
//!
//! Three parallel type kinds share one shape: a server-assigned id, a name
//! unique within the kind, and a mapping of property names to value kinds.
//! The registry operates on the [`TypeRecord`] trait so one implementation
//! serves all three kinds; the structs only pin down which kind they are.

use crate::value::PropertyType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The three kinds of registrable types (and of the entities they describe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Artifact,
    Execution,
    Context,
}

impl TypeKind {
    /// Get the string representation of the type kind
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Artifact => "artifact",
            TypeKind::Execution => "execution",
            TypeKind::Context => "context",
        }
    }

    /// Get all type kinds
    pub fn all() -> &'static [TypeKind] {
        &[TypeKind::Artifact, TypeKind::Execution, TypeKind::Context]
    }

    /// Stable storage code (stored in `Type.type_kind`)
    pub(crate) fn code(&self) -> i64 {
        match self {
            TypeKind::Artifact => 1,
            TypeKind::Execution => 2,
            TypeKind::Context => 3,
        }
    }

    /// The table holding instances of this kind
    pub(crate) fn entity_table(&self) -> &'static str {
        match self {
            TypeKind::Artifact => "Artifact",
            TypeKind::Execution => "Execution",
            TypeKind::Context => "Context",
        }
    }

    /// The table holding instance properties of this kind
    pub(crate) fn property_table(&self) -> &'static str {
        match self {
            TypeKind::Artifact => "ArtifactProperty",
            TypeKind::Execution => "ExecutionProperty",
            TypeKind::Context => "ContextProperty",
        }
    }

    /// The foreign-key column of the property table
    pub(crate) fn property_fk(&self) -> &'static str {
        match self {
            TypeKind::Artifact => "artifact_id",
            TypeKind::Execution => "execution_id",
            TypeKind::Context => "context_id",
        }
    }

    /// The kind-specific column of the entity table, if any
    /// (`uri` for artifacts, `name` for contexts).
    pub(crate) fn extra_column(&self) -> Option<&'static str> {
        match self {
            TypeKind::Artifact => Some("uri"),
            TypeKind::Execution => None,
            TypeKind::Context => Some("name"),
        }
    }
}

impl std::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Common access to the three type structs, letting the registry be written
/// once and specialized per kind.
pub trait TypeRecord: Clone {
    /// Which kind this record registers
    const KIND: TypeKind;

    /// Rebuild a record from its stored parts
    fn from_parts(id: i64, name: String, properties: BTreeMap<String, PropertyType>) -> Self;

    /// The assigned id; 0 means "not yet assigned"
    fn id(&self) -> i64;

    /// The name, unique within the kind
    fn name(&self) -> &str;

    /// Declared properties: name -> value kind
    fn properties(&self) -> &BTreeMap<String, PropertyType>;
}

/// The schema of an artifact kind: declared property names and value kinds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArtifactType {
    /// Server-assigned id; 0 until registered
    pub id: i64,
    /// Name, unique among artifact types
    pub name: String,
    /// Declared properties
    pub properties: BTreeMap<String, PropertyType>,
}

impl ArtifactType {
    /// Create a new type to be registered (id unset)
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Declare a property
    pub fn with_property(mut self, name: impl Into<String>, ty: PropertyType) -> Self {
        self.properties.insert(name.into(), ty);
        self
    }
}

impl TypeRecord for ArtifactType {
    const KIND: TypeKind = TypeKind::Artifact;

    fn from_parts(id: i64, name: String, properties: BTreeMap<String, PropertyType>) -> Self {
        Self { id, name, properties }
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> &BTreeMap<String, PropertyType> {
        &self.properties
    }
}

/// The schema of an execution kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionType {
    pub id: i64,
    pub name: String,
    pub properties: BTreeMap<String, PropertyType>,
}

impl ExecutionType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, ty: PropertyType) -> Self {
        self.properties.insert(name.into(), ty);
        self
    }
}

impl TypeRecord for ExecutionType {
    const KIND: TypeKind = TypeKind::Execution;

    fn from_parts(id: i64, name: String, properties: BTreeMap<String, PropertyType>) -> Self {
        Self { id, name, properties }
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> &BTreeMap<String, PropertyType> {
        &self.properties
    }
}

/// The schema of a context kind (pipelines, runs, experiments).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContextType {
    pub id: i64,
    pub name: String,
    pub properties: BTreeMap<String, PropertyType>,
}

impl ContextType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, ty: PropertyType) -> Self {
        self.properties.insert(name.into(), ty);
        self
    }
}

impl TypeRecord for ContextType {
    const KIND: TypeKind = TypeKind::Context;

    fn from_parts(id: i64, name: String, properties: BTreeMap<String, PropertyType>) -> Self {
        Self { id, name, properties }
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> &BTreeMap<String, PropertyType> {
        &self.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_kind_codes_distinct() {
        let codes: Vec<i64> = TypeKind::all().iter().map(|k| k.code()).collect();
        let mut unique = codes.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(codes.len(), unique.len());
    }

    #[test]
    fn test_kind_tables() {
        assert_eq!(TypeKind::Artifact.entity_table(), "Artifact");
        assert_eq!(TypeKind::Artifact.extra_column(), Some("uri"));
        assert_eq!(TypeKind::Execution.extra_column(), None);
        assert_eq!(TypeKind::Context.extra_column(), Some("name"));
        assert_eq!(TypeKind::Context.property_fk(), "context_id");
    }

    #[test]
    fn test_type_builder() {
        let t = ArtifactType::new("model")
            .with_property("version", PropertyType::Int)
            .with_property("framework", PropertyType::String);

        assert_eq!(t.id, 0);
        assert_eq!(t.name, "model");
        assert_eq!(t.properties.len(), 2);
        assert_eq!(t.properties["version"], PropertyType::Int);
    }
}
