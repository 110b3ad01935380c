//! Relationship store - events, attributions, associations
//!
//! Every relationship endpoint must reference an existing entity of the
//! expected kind at insert time. Events are append-only and never
//! deduplicated; attribution and association pairs are unique and
//! re-inserting one is a no-op.

use super::entity_store;
use super::executor::in_placeholders;
use crate::event::{Association, Attribution, Event, EventStep, EventType};
use crate::types::TypeKind;
use crate::{Error, Result};
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection};

/// Insert one event; returns its id. Stamps the current time when the
/// event carries none.
pub(crate) fn put_event(conn: &Connection, event: &Event) -> Result<i64> {
    if event.event_type == EventType::Unknown {
        return Err(Error::InvalidArgument(
            "event type must be specified".to_string(),
        ));
    }
    if !entity_store::entity_exists(conn, TypeKind::Artifact, event.artifact_id)? {
        return Err(Error::InvalidArgument(format!(
            "event references artifact {} which does not exist",
            event.artifact_id
        )));
    }
    if !entity_store::entity_exists(conn, TypeKind::Execution, event.execution_id)? {
        return Err(Error::InvalidArgument(format!(
            "event references execution {} which does not exist",
            event.execution_id
        )));
    }

    let stamped = event
        .milliseconds_since_epoch
        .unwrap_or_else(|| Utc::now().timestamp_millis());
    conn.execute(
        "INSERT INTO Event (artifact_id, execution_id, type, milliseconds_since_epoch) \
         VALUES (?1, ?2, ?3, ?4)",
        params![event.artifact_id, event.execution_id, event.event_type.code(), stamped],
    )?;
    let event_id = conn.last_insert_rowid();

    for step in &event.path {
        let (is_index, index, key) = match step {
            EventStep::Index(i) => (true, Some(*i), None),
            EventStep::Key(k) => (false, None, Some(k.as_str())),
        };
        conn.execute(
            "INSERT INTO EventPath (event_id, is_index_step, step_index, step_key) \
             VALUES (?1, ?2, ?3, ?4)",
            params![event_id, is_index, index, key],
        )?;
    }
    Ok(event_id)
}

/// Insert a batch of events.
pub(crate) fn put_events(conn: &Connection, events: &[Event]) -> Result<()> {
    for event in events {
        put_event(conn, event)?;
    }
    Ok(())
}

fn load_path(conn: &Connection, event_id: i64) -> Result<Vec<EventStep>> {
    let mut stmt = conn.prepare(
        "SELECT is_index_step, step_index, step_key FROM EventPath \
         WHERE event_id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt.query_map([event_id], |row| {
        let is_index: bool = row.get(0)?;
        let index: Option<i64> = row.get(1)?;
        let key: Option<String> = row.get(2)?;
        Ok((is_index, index, key))
    })?;

    let mut path = Vec::new();
    for row in rows {
        let step = match row? {
            (true, Some(index), _) => EventStep::Index(index),
            (false, _, Some(key)) => EventStep::Key(key),
            _ => {
                return Err(Error::Internal(format!(
                    "malformed path step on event {}",
                    event_id
                )))
            }
        };
        path.push(step);
    }
    Ok(path)
}

/// All events whose endpoint column is in the given id set, in insertion
/// order.
fn events_by_endpoint(conn: &Connection, column: &str, ids: &[i64]) -> Result<Vec<Event>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, artifact_id, execution_id, type, milliseconds_since_epoch \
         FROM Event WHERE {} IN ({}) ORDER BY id",
        column,
        in_placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
        let id: i64 = row.get(0)?;
        let artifact_id: i64 = row.get(1)?;
        let execution_id: i64 = row.get(2)?;
        let type_code: i64 = row.get(3)?;
        let ms: Option<i64> = row.get(4)?;
        Ok((id, artifact_id, execution_id, type_code, ms))
    })?;

    let headers: Vec<_> = rows.collect::<rusqlite::Result<_>>()?;
    let mut events = Vec::with_capacity(headers.len());
    for (id, artifact_id, execution_id, type_code, ms) in headers {
        let event_type = EventType::from_code(type_code).ok_or_else(|| {
            Error::Internal(format!("unknown event type code {} on event {}", type_code, id))
        })?;
        events.push(Event {
            id,
            artifact_id,
            execution_id,
            event_type,
            path: load_path(conn, id)?,
            milliseconds_since_epoch: ms,
        });
    }
    Ok(events)
}

pub(crate) fn events_by_artifact_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<Event>> {
    events_by_endpoint(conn, "artifact_id", ids)
}

pub(crate) fn events_by_execution_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<Event>> {
    events_by_endpoint(conn, "execution_id", ids)
}

/// Insert attribution and association pairs; existing pairs are left
/// untouched.
pub(crate) fn put_attributions_and_associations(
    conn: &Connection,
    attributions: &[Attribution],
    associations: &[Association],
) -> Result<()> {
    for attribution in attributions {
        if !entity_store::entity_exists(conn, TypeKind::Artifact, attribution.artifact_id)? {
            return Err(Error::InvalidArgument(format!(
                "attribution references artifact {} which does not exist",
                attribution.artifact_id
            )));
        }
        if !entity_store::entity_exists(conn, TypeKind::Context, attribution.context_id)? {
            return Err(Error::InvalidArgument(format!(
                "attribution references context {} which does not exist",
                attribution.context_id
            )));
        }
        conn.execute(
            "INSERT OR IGNORE INTO Attribution (context_id, artifact_id) VALUES (?1, ?2)",
            params![attribution.context_id, attribution.artifact_id],
        )?;
    }

    for association in associations {
        if !entity_store::entity_exists(conn, TypeKind::Execution, association.execution_id)? {
            return Err(Error::InvalidArgument(format!(
                "association references execution {} which does not exist",
                association.execution_id
            )));
        }
        if !entity_store::entity_exists(conn, TypeKind::Context, association.context_id)? {
            return Err(Error::InvalidArgument(format!(
                "association references context {} which does not exist",
                association.context_id
            )));
        }
        conn.execute(
            "INSERT OR IGNORE INTO Association (context_id, execution_id) VALUES (?1, ?2)",
            params![association.context_id, association.execution_id],
        )?;
    }
    Ok(())
}

fn ids_by_column(conn: &Connection, sql: &str, id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([id], |row| row.get(0))?;
    rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
}

/// Contexts an artifact is attributed to, in attribution order.
pub(crate) fn context_ids_by_artifact(conn: &Connection, artifact_id: i64) -> Result<Vec<i64>> {
    ids_by_column(
        conn,
        "SELECT context_id FROM Attribution WHERE artifact_id = ?1 ORDER BY id",
        artifact_id,
    )
}

/// Contexts an execution is associated with.
pub(crate) fn context_ids_by_execution(conn: &Connection, execution_id: i64) -> Result<Vec<i64>> {
    ids_by_column(
        conn,
        "SELECT context_id FROM Association WHERE execution_id = ?1 ORDER BY id",
        execution_id,
    )
}

/// Artifacts attributed to a context.
pub(crate) fn artifact_ids_by_context(conn: &Connection, context_id: i64) -> Result<Vec<i64>> {
    ids_by_column(
        conn,
        "SELECT artifact_id FROM Attribution WHERE context_id = ?1 ORDER BY id",
        context_id,
    )
}

/// Executions associated with a context.
pub(crate) fn execution_ids_by_context(conn: &Connection, context_id: i64) -> Result<Vec<i64>> {
    ids_by_column(
        conn,
        "SELECT execution_id FROM Association WHERE context_id = ?1 ORDER BY id",
        context_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Artifact, Context, Execution};
    use crate::store::entity_store::put_entity;
    use crate::store::executor::SqliteSource;
    use crate::store::migration;
    use crate::store::type_registry::{put_type, PutTypeOptions};
    use crate::types::{ArtifactType, ContextType, ExecutionType};

    const OPTIONS: PutTypeOptions = PutTypeOptions {
        can_add_fields: false,
        all_fields_match: true,
    };

    struct Fixture {
        source: SqliteSource,
        artifact_id: i64,
        execution_id: i64,
        context_id: i64,
    }

    fn fixture() -> Fixture {
        let mut source = SqliteSource::open_in_memory().unwrap();
        migration::init_metadata_store(&mut source).unwrap();
        let conn = source.connection();

        let artifact_type = put_type(conn, &ArtifactType::new("blob"), &OPTIONS).unwrap();
        let execution_type = put_type(conn, &ExecutionType::new("step"), &OPTIONS).unwrap();
        let context_type = put_type(conn, &ContextType::new("run"), &OPTIONS).unwrap();

        let artifact_id = put_entity(conn, &Artifact::new(artifact_type)).unwrap();
        let execution_id = put_entity(conn, &Execution::new(execution_type)).unwrap();
        let context_id = put_entity(conn, &Context::new(context_type, "run-1")).unwrap();

        Fixture {
            source,
            artifact_id,
            execution_id,
            context_id,
        }
    }

    #[test]
    fn test_put_event_and_get_by_both_endpoints() {
        let f = fixture();
        let conn = f.source.connection();

        let event = Event::new(f.artifact_id, f.execution_id, EventType::DeclaredOutput)
            .with_key_step("model")
            .with_index_step(0);
        put_event(conn, &event).unwrap();

        let by_artifact = events_by_artifact_ids(conn, &[f.artifact_id]).unwrap();
        assert_eq!(by_artifact.len(), 1);
        assert_eq!(by_artifact[0].execution_id, f.execution_id);
        assert_eq!(by_artifact[0].event_type, EventType::DeclaredOutput);
        assert_eq!(
            by_artifact[0].path,
            vec![EventStep::Key("model".to_string()), EventStep::Index(0)]
        );
        // the store stamped a time
        assert!(by_artifact[0].milliseconds_since_epoch.is_some());

        let by_execution = events_by_execution_ids(conn, &[f.execution_id]).unwrap();
        assert_eq!(by_execution.len(), 1);
        assert_eq!(by_execution[0].artifact_id, f.artifact_id);
    }

    #[test]
    fn test_event_keeps_caller_timestamp() {
        let f = fixture();
        let conn = f.source.connection();

        let event = Event::new(f.artifact_id, f.execution_id, EventType::Input).at(12345);
        put_event(conn, &event).unwrap();

        let events = events_by_artifact_ids(conn, &[f.artifact_id]).unwrap();
        assert_eq!(events[0].milliseconds_since_epoch, Some(12345));
    }

    #[test]
    fn test_event_validation() {
        let f = fixture();
        let conn = f.source.connection();

        let untyped = Event::new(f.artifact_id, f.execution_id, EventType::Unknown);
        assert!(matches!(
            put_event(conn, &untyped),
            Err(Error::InvalidArgument(_))
        ));

        let bad_artifact = Event::new(f.artifact_id + 99, f.execution_id, EventType::Input);
        assert!(matches!(
            put_event(conn, &bad_artifact),
            Err(Error::InvalidArgument(_))
        ));

        let bad_execution = Event::new(f.artifact_id, f.execution_id + 99, EventType::Input);
        assert!(matches!(
            put_event(conn, &bad_execution),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_events_are_not_deduplicated() {
        let f = fixture();
        let conn = f.source.connection();

        let event = Event::new(f.artifact_id, f.execution_id, EventType::Output).at(1);
        put_event(conn, &event).unwrap();
        put_event(conn, &event).unwrap();

        let events = events_by_artifact_ids(conn, &[f.artifact_id]).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_attribution_and_association_roundtrip() {
        let f = fixture();
        let conn = f.source.connection();

        put_attributions_and_associations(
            conn,
            &[Attribution::new(f.artifact_id, f.context_id)],
            &[Association::new(f.execution_id, f.context_id)],
        )
        .unwrap();

        assert_eq!(
            context_ids_by_artifact(conn, f.artifact_id).unwrap(),
            vec![f.context_id]
        );
        assert_eq!(
            context_ids_by_execution(conn, f.execution_id).unwrap(),
            vec![f.context_id]
        );
        assert_eq!(
            artifact_ids_by_context(conn, f.context_id).unwrap(),
            vec![f.artifact_id]
        );
        assert_eq!(
            execution_ids_by_context(conn, f.context_id).unwrap(),
            vec![f.execution_id]
        );
    }

    #[test]
    fn test_pair_reinsert_is_noop() {
        let f = fixture();
        let conn = f.source.connection();

        let attributions = [Attribution::new(f.artifact_id, f.context_id)];
        put_attributions_and_associations(conn, &attributions, &[]).unwrap();
        put_attributions_and_associations(conn, &attributions, &[]).unwrap();

        assert_eq!(
            artifact_ids_by_context(conn, f.context_id).unwrap(),
            vec![f.artifact_id]
        );
    }

    #[test]
    fn test_pair_endpoints_must_exist() {
        let f = fixture();
        let conn = f.source.connection();

        assert!(matches!(
            put_attributions_and_associations(
                conn,
                &[Attribution::new(f.artifact_id + 99, f.context_id)],
                &[],
            ),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            put_attributions_and_associations(
                conn,
                &[],
                &[Association::new(f.execution_id, f.context_id + 99)],
            ),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_events_empty_id_set() {
        let f = fixture();
        let conn = f.source.connection();
        assert!(events_by_artifact_ids(conn, &[]).unwrap().is_empty());
    }
}
