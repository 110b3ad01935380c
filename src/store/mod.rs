//! Metadata store - the public operation surface
//!
//! [`MetadataStore`] routes each request to the type registry, entity
//! store, or relationship store, wrapping every operation in one
//! transaction: any component error rolls the whole request back and
//! partial effects are never visible.

pub mod entity_store;
pub mod executor;
pub mod migration;
pub mod relationship_store;
pub mod schema;
pub mod type_registry;

use crate::config::ConnectionConfig;
use crate::entity::{Artifact, Context, EntityRecord, Execution};
use crate::messages::*;
use crate::types::{ArtifactType, ContextType, ExecutionType, TypeRecord};
use crate::{Error, Result};
use executor::SqliteSource;
use rusqlite::Connection;
use tracing::debug;
use type_registry::PutTypeOptions;

/// A handle to one metadata store.
///
/// Operations take `&mut self` because each one claims the connection for
/// its transaction; concurrent callers open their own handles and the
/// backing engine arbitrates between them.
#[derive(Debug)]
pub struct MetadataStore {
    source: SqliteSource,
    enable_upgrade_migration: bool,
}

impl MetadataStore {
    /// Connect per the configuration and apply its migration options.
    ///
    /// When `downgrade_to_schema_version` is set, the downgrade runs and
    /// this call then fails with a cancelled status: the store no longer
    /// matches this library, so the caller must reconnect with one that
    /// does. Targets outside the known history are invalid-argument
    /// errors and leave the store untouched.
    pub fn create(config: &ConnectionConfig) -> Result<Self> {
        let mut source = SqliteSource::connect(config)?;
        if let Some(target) = config.migration.downgrade_to_schema_version {
            migration::downgrade(&mut source, target)?;
            return Err(Error::Cancelled(
                "Downgrade migration was performed.".to_string(),
            ));
        }
        debug!("metadata store handle created");
        Ok(Self {
            source,
            enable_upgrade_migration: config.migration.enable_upgrade_migration,
        })
    }

    /// Open a file-backed store, creating and initializing it on first use
    pub fn open(path: impl Into<std::path::PathBuf>) -> Result<Self> {
        let mut store = Self::create(&ConnectionConfig::with_database(path))?;
        store.init_metadata_store_if_not_exists()?;
        Ok(store)
    }

    /// Open an initialized in-memory store (for testing and scratch use)
    pub fn open_in_memory() -> Result<Self> {
        let mut store = Self::create(&ConnectionConfig::in_memory())?;
        store.init_metadata_store_if_not_exists()?;
        Ok(store)
    }

    /// Init mode: create the schema in an empty store, accept a current
    /// one, fail on anything else.
    pub fn init_metadata_store(&mut self) -> Result<()> {
        migration::init_metadata_store(&mut self.source)
    }

    /// Idempotent init: accepts an already compatible store, creates an
    /// empty one, and upgrades an older one when upgrade migration was
    /// enabled at creation.
    pub fn init_metadata_store_if_not_exists(&mut self) -> Result<()> {
        migration::init_metadata_store_if_not_exists(&mut self.source, self.enable_upgrade_migration)
    }

    // ========== Type Registry ==========

    fn put_single_type<T: TypeRecord>(
        &mut self,
        record: &T,
        can_add_fields: bool,
        all_fields_match: bool,
    ) -> Result<i64> {
        let options = PutTypeOptions {
            can_add_fields,
            all_fields_match,
        };
        let tx = self.source.transaction()?;
        let type_id = type_registry::put_type(&tx, record, &options)?;
        tx.commit()?;
        Ok(type_id)
    }

    fn get_single_type<T: TypeRecord>(&mut self, type_name: &str) -> Result<T> {
        let tx = self.source.transaction()?;
        let record = type_registry::get_type_by_name(&tx, type_name)?;
        tx.commit()?;
        record.ok_or_else(|| {
            Error::NotFound(format!("no {} type named '{}'", T::KIND, type_name))
        })
    }

    /// Register or evolve an artifact type; see the upsert rules on the
    /// type registry.
    pub fn put_artifact_type(
        &mut self,
        request: PutArtifactTypeRequest,
    ) -> Result<PutArtifactTypeResponse> {
        let type_id = self.put_single_type(
            &request.artifact_type,
            request.can_add_fields,
            request.all_fields_match,
        )?;
        Ok(PutArtifactTypeResponse { type_id })
    }

    pub fn put_execution_type(
        &mut self,
        request: PutExecutionTypeRequest,
    ) -> Result<PutExecutionTypeResponse> {
        let type_id = self.put_single_type(
            &request.execution_type,
            request.can_add_fields,
            request.all_fields_match,
        )?;
        Ok(PutExecutionTypeResponse { type_id })
    }

    pub fn put_context_type(
        &mut self,
        request: PutContextTypeRequest,
    ) -> Result<PutContextTypeResponse> {
        let type_id = self.put_single_type(
            &request.context_type,
            request.can_add_fields,
            request.all_fields_match,
        )?;
        Ok(PutContextTypeResponse { type_id })
    }

    /// Register a batch of types across all three kinds in one
    /// transaction. Duplicate entries resolve to the same id.
    pub fn put_types(&mut self, request: PutTypesRequest) -> Result<PutTypesResponse> {
        let options = PutTypeOptions {
            can_add_fields: request.can_add_fields,
            all_fields_match: request.all_fields_match,
        };
        let tx = self.source.transaction()?;
        let mut response = PutTypesResponse::default();
        for ty in &request.artifact_types {
            response
                .artifact_type_ids
                .push(type_registry::put_type(&tx, ty, &options)?);
        }
        for ty in &request.execution_types {
            response
                .execution_type_ids
                .push(type_registry::put_type(&tx, ty, &options)?);
        }
        for ty in &request.context_types {
            response
                .context_type_ids
                .push(type_registry::put_type(&tx, ty, &options)?);
        }
        tx.commit()?;
        Ok(response)
    }

    /// Look up an artifact type by name; not-found is an error here, not
    /// an empty response.
    pub fn get_artifact_type(
        &mut self,
        request: GetArtifactTypeRequest,
    ) -> Result<GetArtifactTypeResponse> {
        Ok(GetArtifactTypeResponse {
            artifact_type: self.get_single_type(&request.type_name)?,
        })
    }

    pub fn get_execution_type(
        &mut self,
        request: GetExecutionTypeRequest,
    ) -> Result<GetExecutionTypeResponse> {
        Ok(GetExecutionTypeResponse {
            execution_type: self.get_single_type(&request.type_name)?,
        })
    }

    pub fn get_context_type(
        &mut self,
        request: GetContextTypeRequest,
    ) -> Result<GetContextTypeResponse> {
        Ok(GetContextTypeResponse {
            context_type: self.get_single_type(&request.type_name)?,
        })
    }

    pub fn get_artifact_types_by_id(
        &mut self,
        request: GetArtifactTypesByIDRequest,
    ) -> Result<GetArtifactTypesByIDResponse> {
        let tx = self.source.transaction()?;
        let artifact_types = type_registry::get_types_by_id(&tx, &request.type_ids)?;
        tx.commit()?;
        Ok(GetArtifactTypesByIDResponse { artifact_types })
    }

    pub fn get_execution_types_by_id(
        &mut self,
        request: GetExecutionTypesByIDRequest,
    ) -> Result<GetExecutionTypesByIDResponse> {
        let tx = self.source.transaction()?;
        let execution_types = type_registry::get_types_by_id(&tx, &request.type_ids)?;
        tx.commit()?;
        Ok(GetExecutionTypesByIDResponse { execution_types })
    }

    pub fn get_context_types_by_id(
        &mut self,
        request: GetContextTypesByIDRequest,
    ) -> Result<GetContextTypesByIDResponse> {
        let tx = self.source.transaction()?;
        let context_types = type_registry::get_types_by_id(&tx, &request.type_ids)?;
        tx.commit()?;
        Ok(GetContextTypesByIDResponse { context_types })
    }

    pub fn get_artifact_types(
        &mut self,
        _request: GetArtifactTypesRequest,
    ) -> Result<GetArtifactTypesResponse> {
        let tx = self.source.transaction()?;
        let artifact_types: Vec<ArtifactType> = type_registry::get_all_types(&tx)?;
        tx.commit()?;
        Ok(GetArtifactTypesResponse { artifact_types })
    }

    pub fn get_execution_types(
        &mut self,
        _request: GetExecutionTypesRequest,
    ) -> Result<GetExecutionTypesResponse> {
        let tx = self.source.transaction()?;
        let execution_types: Vec<ExecutionType> = type_registry::get_all_types(&tx)?;
        tx.commit()?;
        Ok(GetExecutionTypesResponse { execution_types })
    }

    pub fn get_context_types(
        &mut self,
        _request: GetContextTypesRequest,
    ) -> Result<GetContextTypesResponse> {
        let tx = self.source.transaction()?;
        let context_types: Vec<ContextType> = type_registry::get_all_types(&tx)?;
        tx.commit()?;
        Ok(GetContextTypesResponse { context_types })
    }

    // ========== Entity Store ==========

    /// Insert (id unset) or update (id set) artifacts; returns final ids
    /// in input order. Updates merge properties and never remove any.
    pub fn put_artifacts(&mut self, request: PutArtifactsRequest) -> Result<PutArtifactsResponse> {
        let tx = self.source.transaction()?;
        let artifact_ids = entity_store::put_entities(&tx, &request.artifacts)?;
        tx.commit()?;
        Ok(PutArtifactsResponse { artifact_ids })
    }

    pub fn put_executions(
        &mut self,
        request: PutExecutionsRequest,
    ) -> Result<PutExecutionsResponse> {
        let tx = self.source.transaction()?;
        let execution_ids = entity_store::put_entities(&tx, &request.executions)?;
        tx.commit()?;
        Ok(PutExecutionsResponse { execution_ids })
    }

    pub fn put_contexts(&mut self, request: PutContextsRequest) -> Result<PutContextsResponse> {
        let tx = self.source.transaction()?;
        let context_ids = entity_store::put_entities(&tx, &request.contexts)?;
        tx.commit()?;
        Ok(PutContextsResponse { context_ids })
    }

    /// The composite operation: upsert the execution, upsert each paired
    /// artifact, complete and insert each pair's event - all or nothing.
    /// Unset event endpoints are filled from the surrounding pair.
    pub fn put_execution(&mut self, request: PutExecutionRequest) -> Result<PutExecutionResponse> {
        let tx = self.source.transaction()?;
        let execution_id = entity_store::put_entity(&tx, &request.execution)?;
        let mut artifact_ids = Vec::with_capacity(request.artifact_event_pairs.len());
        for pair in &request.artifact_event_pairs {
            let artifact_id = entity_store::put_entity(&tx, &pair.artifact)?;
            artifact_ids.push(artifact_id);
            if let Some(event) = &pair.event {
                let mut event = event.clone();
                if event.artifact_id == 0 {
                    event.artifact_id = artifact_id;
                }
                if event.execution_id == 0 {
                    event.execution_id = execution_id;
                }
                relationship_store::put_event(&tx, &event)?;
            }
        }
        tx.commit()?;
        Ok(PutExecutionResponse {
            execution_id,
            artifact_ids,
        })
    }

    fn get_by_id<T: EntityRecord>(&mut self, ids: &[i64]) -> Result<Vec<T>> {
        let tx = self.source.transaction()?;
        let entities = entity_store::get_entities_by_id(&tx, ids)?;
        tx.commit()?;
        Ok(entities)
    }

    fn get_all<T: EntityRecord>(&mut self) -> Result<Vec<T>> {
        let tx = self.source.transaction()?;
        let entities = entity_store::get_all_entities(&tx)?;
        tx.commit()?;
        Ok(entities)
    }

    fn get_by_type_name<T: EntityRecord>(&mut self, type_name: &str) -> Result<Vec<T>> {
        let tx = self.source.transaction()?;
        let entities = entity_store::get_entities_by_type_name(&tx, type_name)?;
        tx.commit()?;
        Ok(entities)
    }

    /// Look up artifacts by id; missing ids are skipped.
    pub fn get_artifacts_by_id(
        &mut self,
        request: GetArtifactsByIDRequest,
    ) -> Result<GetArtifactsByIDResponse> {
        Ok(GetArtifactsByIDResponse {
            artifacts: self.get_by_id(&request.artifact_ids)?,
        })
    }

    pub fn get_executions_by_id(
        &mut self,
        request: GetExecutionsByIDRequest,
    ) -> Result<GetExecutionsByIDResponse> {
        Ok(GetExecutionsByIDResponse {
            executions: self.get_by_id(&request.execution_ids)?,
        })
    }

    pub fn get_contexts_by_id(
        &mut self,
        request: GetContextsByIDRequest,
    ) -> Result<GetContextsByIDResponse> {
        Ok(GetContextsByIDResponse {
            contexts: self.get_by_id(&request.context_ids)?,
        })
    }

    pub fn get_artifacts(&mut self, _request: GetArtifactsRequest) -> Result<GetArtifactsResponse> {
        Ok(GetArtifactsResponse {
            artifacts: self.get_all()?,
        })
    }

    pub fn get_executions(
        &mut self,
        _request: GetExecutionsRequest,
    ) -> Result<GetExecutionsResponse> {
        Ok(GetExecutionsResponse {
            executions: self.get_all()?,
        })
    }

    pub fn get_contexts(&mut self, _request: GetContextsRequest) -> Result<GetContextsResponse> {
        Ok(GetContextsResponse {
            contexts: self.get_all()?,
        })
    }

    /// All artifacts of a named type; unknown types yield empty lists.
    pub fn get_artifacts_by_type(
        &mut self,
        request: GetArtifactsByTypeRequest,
    ) -> Result<GetArtifactsByTypeResponse> {
        Ok(GetArtifactsByTypeResponse {
            artifacts: self.get_by_type_name(&request.type_name)?,
        })
    }

    pub fn get_executions_by_type(
        &mut self,
        request: GetExecutionsByTypeRequest,
    ) -> Result<GetExecutionsByTypeResponse> {
        Ok(GetExecutionsByTypeResponse {
            executions: self.get_by_type_name(&request.type_name)?,
        })
    }

    pub fn get_contexts_by_type(
        &mut self,
        request: GetContextsByTypeRequest,
    ) -> Result<GetContextsByTypeResponse> {
        Ok(GetContextsByTypeResponse {
            contexts: self.get_by_type_name(&request.type_name)?,
        })
    }

    /// Exact-match uri lookup; an empty uri matches unset and empty alike.
    pub fn get_artifacts_by_uri(
        &mut self,
        request: GetArtifactsByURIRequest,
    ) -> Result<GetArtifactsByURIResponse> {
        let tx = self.source.transaction()?;
        let artifacts = entity_store::get_artifacts_by_uri(&tx, &request.uri)?;
        tx.commit()?;
        Ok(GetArtifactsByURIResponse { artifacts })
    }

    // ========== Relationship Store ==========

    /// Insert events; endpoints must exist. Missing timestamps are
    /// stamped with the current time.
    pub fn put_events(&mut self, request: PutEventsRequest) -> Result<PutEventsResponse> {
        let tx = self.source.transaction()?;
        relationship_store::put_events(&tx, &request.events)?;
        tx.commit()?;
        Ok(PutEventsResponse {})
    }

    pub fn get_events_by_artifact_ids(
        &mut self,
        request: GetEventsByArtifactIDsRequest,
    ) -> Result<GetEventsByArtifactIDsResponse> {
        let tx = self.source.transaction()?;
        let events = relationship_store::events_by_artifact_ids(&tx, &request.artifact_ids)?;
        tx.commit()?;
        Ok(GetEventsByArtifactIDsResponse { events })
    }

    pub fn get_events_by_execution_ids(
        &mut self,
        request: GetEventsByExecutionIDsRequest,
    ) -> Result<GetEventsByExecutionIDsResponse> {
        let tx = self.source.transaction()?;
        let events = relationship_store::events_by_execution_ids(&tx, &request.execution_ids)?;
        tx.commit()?;
        Ok(GetEventsByExecutionIDsResponse { events })
    }

    /// Insert attributions and associations; re-inserting an existing
    /// pair is a no-op.
    pub fn put_attributions_and_associations(
        &mut self,
        request: PutAttributionsAndAssociationsRequest,
    ) -> Result<PutAttributionsAndAssociationsResponse> {
        let tx = self.source.transaction()?;
        relationship_store::put_attributions_and_associations(
            &tx,
            &request.attributions,
            &request.associations,
        )?;
        tx.commit()?;
        Ok(PutAttributionsAndAssociationsResponse {})
    }

    fn contexts_for_ids(tx: &Connection, ids: &[i64]) -> Result<Vec<Context>> {
        entity_store::get_entities_by_id(tx, ids)
    }

    pub fn get_contexts_by_artifact(
        &mut self,
        request: GetContextsByArtifactRequest,
    ) -> Result<GetContextsByArtifactResponse> {
        let tx = self.source.transaction()?;
        let ids = relationship_store::context_ids_by_artifact(&tx, request.artifact_id)?;
        let contexts = Self::contexts_for_ids(&tx, &ids)?;
        tx.commit()?;
        Ok(GetContextsByArtifactResponse { contexts })
    }

    pub fn get_contexts_by_execution(
        &mut self,
        request: GetContextsByExecutionRequest,
    ) -> Result<GetContextsByExecutionResponse> {
        let tx = self.source.transaction()?;
        let ids = relationship_store::context_ids_by_execution(&tx, request.execution_id)?;
        let contexts = Self::contexts_for_ids(&tx, &ids)?;
        tx.commit()?;
        Ok(GetContextsByExecutionResponse { contexts })
    }

    pub fn get_artifacts_by_context(
        &mut self,
        request: GetArtifactsByContextRequest,
    ) -> Result<GetArtifactsByContextResponse> {
        let tx = self.source.transaction()?;
        let ids = relationship_store::artifact_ids_by_context(&tx, request.context_id)?;
        let artifacts: Vec<Artifact> = entity_store::get_entities_by_id(&tx, &ids)?;
        tx.commit()?;
        Ok(GetArtifactsByContextResponse { artifacts })
    }

    pub fn get_executions_by_context(
        &mut self,
        request: GetExecutionsByContextRequest,
    ) -> Result<GetExecutionsByContextResponse> {
        let tx = self.source.transaction()?;
        let ids = relationship_store::execution_ids_by_context(&tx, request.context_id)?;
        let executions: Vec<Execution> = entity_store::get_entities_by_id(&tx, &ids)?;
        tx.commit()?;
        Ok(GetExecutionsByContextResponse { executions })
    }
}
