//! Request/response surface - the stable message format of the store
//!
//! Every public operation takes one request type and returns one response
//! type. All ids are 64-bit signed integers with 0 meaning "unset" on
//! input. The types are plain serde structs so the surface can be carried
//! over any transport without changing the store.

use crate::entity::{Artifact, Context, Execution};
use crate::event::{Association, Attribution, Event};
use crate::types::{ArtifactType, ContextType, ExecutionType};
use serde::{Deserialize, Serialize};

/// Migration behavior applied while connecting to a store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Run forward migrations automatically when the stored schema is
    /// older than the library's. Without it a version mismatch fails with
    /// a failed-precondition error.
    #[serde(default)]
    pub enable_upgrade_migration: bool,

    /// Run downgrade scripts to the given version, then fail the creation
    /// call with a cancelled status so the caller reconnects with a
    /// matching library.
    #[serde(default)]
    pub downgrade_to_schema_version: Option<i64>,
}

// ---------- Type registry ----------

/// Registers or evolves an artifact type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutArtifactTypeRequest {
    pub artifact_type: ArtifactType,
    /// Allow the request to declare properties the stored type lacks
    pub can_add_fields: bool,
    /// Require every stored property to appear in the request with the
    /// same kind
    pub all_fields_match: bool,
}

impl Default for PutArtifactTypeRequest {
    fn default() -> Self {
        Self {
            artifact_type: ArtifactType::default(),
            can_add_fields: false,
            all_fields_match: true,
        }
    }
}

impl PutArtifactTypeRequest {
    pub fn new(artifact_type: ArtifactType) -> Self {
        Self {
            artifact_type,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PutArtifactTypeResponse {
    pub type_id: i64,
}

/// Registers or evolves an execution type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutExecutionTypeRequest {
    pub execution_type: ExecutionType,
    pub can_add_fields: bool,
    pub all_fields_match: bool,
}

impl Default for PutExecutionTypeRequest {
    fn default() -> Self {
        Self {
            execution_type: ExecutionType::default(),
            can_add_fields: false,
            all_fields_match: true,
        }
    }
}

impl PutExecutionTypeRequest {
    pub fn new(execution_type: ExecutionType) -> Self {
        Self {
            execution_type,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PutExecutionTypeResponse {
    pub type_id: i64,
}

/// Registers or evolves a context type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutContextTypeRequest {
    pub context_type: ContextType,
    pub can_add_fields: bool,
    pub all_fields_match: bool,
}

impl Default for PutContextTypeRequest {
    fn default() -> Self {
        Self {
            context_type: ContextType::default(),
            can_add_fields: false,
            all_fields_match: true,
        }
    }
}

impl PutContextTypeRequest {
    pub fn new(context_type: ContextType) -> Self {
        Self {
            context_type,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PutContextTypeResponse {
    pub type_id: i64,
}

/// Registers a batch of types across all three kinds in one transaction.
/// Duplicate entries describing the same type resolve to the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutTypesRequest {
    pub artifact_types: Vec<ArtifactType>,
    pub execution_types: Vec<ExecutionType>,
    pub context_types: Vec<ContextType>,
    /// Applied to every entry in the batch
    pub can_add_fields: bool,
    /// Applied to every entry in the batch
    pub all_fields_match: bool,
}

impl Default for PutTypesRequest {
    fn default() -> Self {
        Self {
            artifact_types: Vec::new(),
            execution_types: Vec::new(),
            context_types: Vec::new(),
            can_add_fields: false,
            all_fields_match: true,
        }
    }
}

/// Assigned ids, index-aligned with the request vectors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PutTypesResponse {
    pub artifact_type_ids: Vec<i64>,
    pub execution_type_ids: Vec<i64>,
    pub context_type_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetArtifactTypeRequest {
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetArtifactTypeResponse {
    pub artifact_type: ArtifactType,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetExecutionTypeRequest {
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetExecutionTypeResponse {
    pub execution_type: ExecutionType,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetContextTypeRequest {
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetContextTypeResponse {
    pub context_type: ContextType,
}

/// Looks up types by id; missing ids are skipped, not errors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetArtifactTypesByIDRequest {
    pub type_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetArtifactTypesByIDResponse {
    pub artifact_types: Vec<ArtifactType>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetExecutionTypesByIDRequest {
    pub type_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetExecutionTypesByIDResponse {
    pub execution_types: Vec<ExecutionType>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetContextTypesByIDRequest {
    pub type_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetContextTypesByIDResponse {
    pub context_types: Vec<ContextType>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetArtifactTypesRequest {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetArtifactTypesResponse {
    pub artifact_types: Vec<ArtifactType>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetExecutionTypesRequest {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetExecutionTypesResponse {
    pub execution_types: Vec<ExecutionType>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetContextTypesRequest {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetContextTypesResponse {
    pub context_types: Vec<ContextType>,
}

// ---------- Entity store ----------

/// Inserts (id unset) or updates (id set) artifacts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PutArtifactsRequest {
    pub artifacts: Vec<Artifact>,
}

/// Final ids, index-aligned with the request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PutArtifactsResponse {
    pub artifact_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PutExecutionsRequest {
    pub executions: Vec<Execution>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PutExecutionsResponse {
    pub execution_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PutContextsRequest {
    pub contexts: Vec<Context>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PutContextsResponse {
    pub context_ids: Vec<i64>,
}

/// One artifact with the event that ties it to the surrounding execution.
/// Unset event endpoints are completed from the pair.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArtifactAndEvent {
    pub artifact: Artifact,
    pub event: Option<Event>,
}

impl ArtifactAndEvent {
    pub fn new(artifact: Artifact) -> Self {
        Self { artifact, event: None }
    }

    pub fn with_event(artifact: Artifact, event: Event) -> Self {
        Self {
            artifact,
            event: Some(event),
        }
    }
}

/// The composite operation: upsert one execution together with its
/// artifacts and their events, atomically.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PutExecutionRequest {
    pub execution: Execution,
    pub artifact_event_pairs: Vec<ArtifactAndEvent>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PutExecutionResponse {
    pub execution_id: i64,
    /// Index-aligned with `artifact_event_pairs`
    pub artifact_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetArtifactsByIDRequest {
    pub artifact_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetArtifactsByIDResponse {
    pub artifacts: Vec<Artifact>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetExecutionsByIDRequest {
    pub execution_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetExecutionsByIDResponse {
    pub executions: Vec<Execution>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetContextsByIDRequest {
    pub context_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetContextsByIDResponse {
    pub contexts: Vec<Context>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetArtifactsRequest {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetArtifactsResponse {
    pub artifacts: Vec<Artifact>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetExecutionsRequest {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetExecutionsResponse {
    pub executions: Vec<Execution>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetContextsRequest {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetContextsResponse {
    pub contexts: Vec<Context>,
}

/// All artifacts of the named type; an unknown type yields an empty list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetArtifactsByTypeRequest {
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetArtifactsByTypeResponse {
    pub artifacts: Vec<Artifact>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetExecutionsByTypeRequest {
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetExecutionsByTypeResponse {
    pub executions: Vec<Execution>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetContextsByTypeRequest {
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetContextsByTypeResponse {
    pub contexts: Vec<Context>,
}

/// Exact-match uri lookup; an empty `uri` matches artifacts whose uri is
/// empty or unset (the two are equivalent).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetArtifactsByURIRequest {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetArtifactsByURIResponse {
    pub artifacts: Vec<Artifact>,
}

// ---------- Relationship store ----------

/// Inserts events; endpoints must already exist. Events are not
/// deduplicated and cannot be modified once written.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PutEventsRequest {
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PutEventsResponse {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetEventsByArtifactIDsRequest {
    pub artifact_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetEventsByArtifactIDsResponse {
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetEventsByExecutionIDsRequest {
    pub execution_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetEventsByExecutionIDsResponse {
    pub events: Vec<Event>,
}

/// Inserts attributions and associations; re-inserting an existing pair is
/// a no-op.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PutAttributionsAndAssociationsRequest {
    pub attributions: Vec<Attribution>,
    pub associations: Vec<Association>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PutAttributionsAndAssociationsResponse {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetContextsByArtifactRequest {
    pub artifact_id: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetContextsByArtifactResponse {
    pub contexts: Vec<Context>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetContextsByExecutionRequest {
    pub execution_id: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetContextsByExecutionResponse {
    pub contexts: Vec<Context>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetArtifactsByContextRequest {
    pub context_id: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetArtifactsByContextResponse {
    pub artifacts: Vec<Artifact>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetExecutionsByContextRequest {
    pub context_id: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetExecutionsByContextResponse {
    pub executions: Vec<Execution>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_type_request_defaults() {
        // The wire contract requires all_fields_match unless a caller
        // explicitly relaxes it.
        let request = PutArtifactTypeRequest::default();
        assert!(request.all_fields_match);
        assert!(!request.can_add_fields);

        let request = PutTypesRequest::default();
        assert!(request.all_fields_match);
        assert!(!request.can_add_fields);
    }

    #[test]
    fn test_migration_options_toml_roundtrip() {
        let options = MigrationOptions {
            enable_upgrade_migration: true,
            downgrade_to_schema_version: Some(2),
        };
        let text = toml::to_string(&options).unwrap();
        let parsed: MigrationOptions = toml::from_str(&text).unwrap();
        assert_eq!(parsed, options);
    }
}
