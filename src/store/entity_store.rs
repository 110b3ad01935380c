//! Entity store - artifacts, executions, contexts with typed properties
//!
//! One generic implementation serves the three entity kinds; the kind picks
//! the tables and the kind-specific column (`uri`, `name`, or none).
//! Writes are upserts: id 0 inserts, a set id updates. Updates replace the
//! kind-specific column and *merge* properties: a key omitted from the
//! request keeps its stored value, because the wire format cannot tell
//! "omitted" from "cleared". Nothing is ever deleted.

use super::type_registry;
use crate::entity::{Artifact, EntityRecord};
use crate::types::TypeKind;
use crate::value::{PropertyType, PropertyValue};
use crate::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

/// Upsert a batch, returning final ids in input order.
pub(crate) fn put_entities<T: EntityRecord>(conn: &Connection, entities: &[T]) -> Result<Vec<i64>> {
    entities.iter().map(|e| put_entity(conn, e)).collect()
}

/// Upsert one entity per the merge contract; returns its final id.
pub(crate) fn put_entity<T: EntityRecord>(conn: &Connection, entity: &T) -> Result<i64> {
    entity.validate()?;
    if entity.id() == 0 {
        insert_entity(conn, entity)
    } else {
        update_entity(conn, entity)
    }
}

fn insert_entity<T: EntityRecord>(conn: &Connection, entity: &T) -> Result<i64> {
    let kind = T::KIND;
    if entity.type_id() == 0 {
        return Err(Error::InvalidArgument(format!(
            "{} must reference a type to be created",
            kind
        )));
    }
    let declared = type_registry::declared_properties(conn, kind, entity.type_id())?;
    validate_properties(kind, entity, &declared)?;
    check_unique_name(conn, entity, None)?;

    let id = match kind.extra_column() {
        Some(column) => {
            let sql = format!(
                "INSERT INTO {} (type_id, {}) VALUES (?1, ?2)",
                kind.entity_table(),
                column
            );
            conn.execute(&sql, params![entity.type_id(), entity.extra()])?;
            conn.last_insert_rowid()
        }
        None => {
            let sql = format!("INSERT INTO {} (type_id) VALUES (?1)", kind.entity_table());
            conn.execute(&sql, [entity.type_id()])?;
            conn.last_insert_rowid()
        }
    };

    write_properties(conn, kind, id, entity.properties(), false)?;
    write_properties(conn, kind, id, entity.custom_properties(), true)?;
    Ok(id)
}

fn update_entity<T: EntityRecord>(conn: &Connection, entity: &T) -> Result<i64> {
    let kind = T::KIND;
    let sql = format!("SELECT type_id FROM {} WHERE id = ?1", kind.entity_table());
    let stored_type_id: Option<i64> = conn
        .query_row(&sql, [entity.id()], |row| row.get(0))
        .optional()?;
    let stored_type_id = stored_type_id
        .ok_or_else(|| Error::NotFound(format!("no {} with id {}", kind, entity.id())))?;
    if entity.type_id() != 0 && entity.type_id() != stored_type_id {
        return Err(Error::InvalidArgument(format!(
            "{} {} is of type {} and cannot change to type {}",
            kind,
            entity.id(),
            stored_type_id,
            entity.type_id()
        )));
    }

    let declared = type_registry::declared_properties(conn, kind, stored_type_id)?;
    validate_properties(kind, entity, &declared)?;
    check_unique_name(conn, entity, Some(stored_type_id))?;

    if let Some(column) = kind.extra_column() {
        let sql = format!(
            "UPDATE {} SET {} = ?1 WHERE id = ?2",
            kind.entity_table(),
            column
        );
        conn.execute(&sql, params![entity.extra(), entity.id()])?;
    }

    write_properties(conn, kind, entity.id(), entity.properties(), false)?;
    write_properties(conn, kind, entity.id(), entity.custom_properties(), true)?;
    Ok(entity.id())
}

/// Every declared property must exist on the type with the matching kind.
fn validate_properties<T: EntityRecord>(
    kind: TypeKind,
    entity: &T,
    declared: &BTreeMap<String, PropertyType>,
) -> Result<()> {
    for (name, value) in entity.properties() {
        match declared.get(name) {
            None => {
                return Err(Error::InvalidArgument(format!(
                    "property '{}' is not declared on the {} type",
                    name, kind
                )))
            }
            Some(ty) if *ty != value.property_type() => {
                return Err(Error::InvalidArgument(format!(
                    "property '{}' is declared as {} but the value is {}",
                    name,
                    ty,
                    value.property_type()
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Contexts carry a name unique within their type; other kinds skip this.
/// On update, `stored_type_id` is the type the row already belongs to.
fn check_unique_name<T: EntityRecord>(
    conn: &Connection,
    entity: &T,
    stored_type_id: Option<i64>,
) -> Result<()> {
    if T::KIND != TypeKind::Context {
        return Ok(());
    }
    let type_id = stored_type_id.unwrap_or_else(|| entity.type_id());
    let holder: Option<i64> = conn
        .query_row(
            "SELECT id FROM Context WHERE type_id = ?1 AND name = ?2",
            params![type_id, entity.extra()],
            |row| row.get(0),
        )
        .optional()?;
    match holder {
        Some(id) if id != entity.id() => Err(Error::AlreadyExists(format!(
            "context name '{}' is taken within type {}",
            entity.extra().unwrap_or_default(),
            type_id
        ))),
        _ => Ok(()),
    }
}

/// Merge-write one property map. `INSERT OR REPLACE` on the
/// `(entity, name, is_custom)` key updates provided values and keeps
/// stored rows for keys the request omits.
fn write_properties(
    conn: &Connection,
    kind: TypeKind,
    entity_id: i64,
    properties: &BTreeMap<String, PropertyValue>,
    is_custom: bool,
) -> Result<()> {
    if properties.is_empty() {
        return Ok(());
    }
    let sql = format!(
        "INSERT OR REPLACE INTO {} ({}, name, is_custom_property, int_value, double_value, string_value) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        kind.property_table(),
        kind.property_fk()
    );
    let mut stmt = conn.prepare(&sql)?;
    for (name, value) in properties {
        let (int_value, double_value, string_value) = split_value(value);
        stmt.execute(params![
            entity_id,
            name,
            is_custom,
            int_value,
            double_value,
            string_value
        ])?;
    }
    Ok(())
}

fn split_value(value: &PropertyValue) -> (Option<i64>, Option<f64>, Option<&str>) {
    match value {
        PropertyValue::Int(v) => (Some(*v), None, None),
        PropertyValue::Double(v) => (None, Some(*v), None),
        PropertyValue::String(v) => (None, None, Some(v.as_str())),
    }
}

fn join_value(
    int_value: Option<i64>,
    double_value: Option<f64>,
    string_value: Option<String>,
) -> Result<PropertyValue> {
    match (int_value, double_value, string_value) {
        (Some(v), None, None) => Ok(PropertyValue::Int(v)),
        (None, Some(v), None) => Ok(PropertyValue::Double(v)),
        (None, None, Some(v)) => Ok(PropertyValue::String(v)),
        _ => Err(Error::Internal(
            "property row does not hold exactly one value".to_string(),
        )),
    }
}

/// Load both property maps of one entity.
fn load_properties(
    conn: &Connection,
    kind: TypeKind,
    entity_id: i64,
) -> Result<(BTreeMap<String, PropertyValue>, BTreeMap<String, PropertyValue>)> {
    let sql = format!(
        "SELECT name, is_custom_property, int_value, double_value, string_value \
         FROM {} WHERE {} = ?1",
        kind.property_table(),
        kind.property_fk()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([entity_id], |row| {
        let name: String = row.get(0)?;
        let is_custom: bool = row.get(1)?;
        let int_value: Option<i64> = row.get(2)?;
        let double_value: Option<f64> = row.get(3)?;
        let string_value: Option<String> = row.get(4)?;
        Ok((name, is_custom, int_value, double_value, string_value))
    })?;

    let mut properties = BTreeMap::new();
    let mut custom_properties = BTreeMap::new();
    for row in rows {
        let (name, is_custom, int_value, double_value, string_value) = row?;
        let value = join_value(int_value, double_value, string_value)?;
        if is_custom {
            custom_properties.insert(name, value);
        } else {
            properties.insert(name, value);
        }
    }
    Ok((properties, custom_properties))
}

fn select_list(kind: TypeKind) -> String {
    match kind.extra_column() {
        Some(column) => format!("id, type_id, {}", column),
        None => "id, type_id".to_string(),
    }
}

fn row_header(kind: TypeKind, row: &Row<'_>) -> rusqlite::Result<(i64, i64, Option<String>)> {
    let id: i64 = row.get(0)?;
    let type_id: i64 = row.get(1)?;
    let extra: Option<String> = if kind.extra_column().is_some() {
        row.get(2)?
    } else {
        None
    };
    Ok((id, type_id, extra))
}

fn hydrate<T: EntityRecord>(
    conn: &Connection,
    headers: Vec<(i64, i64, Option<String>)>,
) -> Result<Vec<T>> {
    let mut result = Vec::with_capacity(headers.len());
    for (id, type_id, extra) in headers {
        let (properties, custom_properties) = load_properties(conn, T::KIND, id)?;
        result.push(T::from_parts(id, type_id, extra, properties, custom_properties));
    }
    Ok(result)
}

/// Look up entities by id, preserving request order and skipping missing
/// ids.
pub(crate) fn get_entities_by_id<T: EntityRecord>(conn: &Connection, ids: &[i64]) -> Result<Vec<T>> {
    let kind = T::KIND;
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?1",
        select_list(kind),
        kind.entity_table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut headers = Vec::new();
    for &id in ids {
        let header = stmt
            .query_row([id], |row| row_header(kind, row))
            .optional()?;
        if let Some(header) = header {
            headers.push(header);
        }
    }
    hydrate(conn, headers)
}

/// All entities of the kind, in insertion order.
pub(crate) fn get_all_entities<T: EntityRecord>(conn: &Connection) -> Result<Vec<T>> {
    let kind = T::KIND;
    let sql = format!(
        "SELECT {} FROM {} ORDER BY id",
        select_list(kind),
        kind.entity_table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| row_header(kind, row))?;
    let headers: Vec<_> = rows.collect::<rusqlite::Result<_>>()?;
    hydrate(conn, headers)
}

/// All entities of the named type; an unknown type name yields an empty
/// list, not an error.
pub(crate) fn get_entities_by_type_name<T: EntityRecord>(
    conn: &Connection,
    type_name: &str,
) -> Result<Vec<T>> {
    let kind = T::KIND;
    let type_id = match type_registry::type_id_by_name(conn, kind, type_name)? {
        Some(id) => id,
        None => return Ok(Vec::new()),
    };
    let sql = format!(
        "SELECT {} FROM {} WHERE type_id = ?1 ORDER BY id",
        select_list(kind),
        kind.entity_table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([type_id], |row| row_header(kind, row))?;
    let headers: Vec<_> = rows.collect::<rusqlite::Result<_>>()?;
    hydrate(conn, headers)
}

/// Exact-match uri lookup; an empty uri matches NULL and empty alike.
pub(crate) fn get_artifacts_by_uri(conn: &Connection, uri: &str) -> Result<Vec<Artifact>> {
    let kind = TypeKind::Artifact;
    let headers: Vec<_> = if uri.is_empty() {
        // Unset and empty uris are equivalent on the wire.
        let sql = format!(
            "SELECT {} FROM {} WHERE uri IS NULL OR uri = '' ORDER BY id",
            select_list(kind),
            kind.entity_table()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| row_header(kind, row))?;
        rows.collect::<rusqlite::Result<_>>()?
    } else {
        let sql = format!(
            "SELECT {} FROM {} WHERE uri = ?1 ORDER BY id",
            select_list(kind),
            kind.entity_table()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([uri], |row| row_header(kind, row))?;
        rows.collect::<rusqlite::Result<_>>()?
    };
    hydrate(conn, headers)
}

/// Whether an entity of the kind exists; used for referential-integrity
/// checks by the relationship store.
pub(crate) fn entity_exists(conn: &Connection, kind: TypeKind, id: i64) -> Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?1", kind.entity_table());
    let found: Option<i64> = conn.query_row(&sql, [id], |row| row.get(0)).optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Artifact, Context, Execution};
    use crate::store::executor::SqliteSource;
    use crate::store::migration;
    use crate::store::type_registry::{put_type, PutTypeOptions};
    use crate::types::{ArtifactType, ContextType, ExecutionType};

    const OPTIONS: PutTypeOptions = PutTypeOptions {
        can_add_fields: false,
        all_fields_match: true,
    };

    fn initialized_source() -> SqliteSource {
        let mut source = SqliteSource::open_in_memory().unwrap();
        migration::init_metadata_store(&mut source).unwrap();
        source
    }

    fn artifact_type(conn: &Connection) -> i64 {
        let ty = ArtifactType::new("dataset")
            .with_property("rows", PropertyType::Int)
            .with_property("source", PropertyType::String);
        put_type(conn, &ty, &OPTIONS).unwrap()
    }

    #[test]
    fn test_insert_and_get_by_id() {
        let source = initialized_source();
        let conn = source.connection();
        let type_id = artifact_type(conn);

        let artifact = Artifact::new(type_id)
            .with_uri("s3://data/train")
            .with_property("rows", 10_000i64)
            .with_custom_property("owner", "team-a");
        let id = put_entity(conn, &artifact).unwrap();
        assert!(id > 0);

        let stored: Vec<Artifact> = get_entities_by_id(conn, &[id]).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, id);
        assert_eq!(stored[0].type_id, type_id);
        assert_eq!(stored[0].uri.as_deref(), Some("s3://data/train"));
        assert_eq!(stored[0].properties["rows"], PropertyValue::Int(10_000));
        assert_eq!(
            stored[0].custom_properties["owner"],
            PropertyValue::String("team-a".to_string())
        );
    }

    #[test]
    fn test_insert_requires_known_type() {
        let source = initialized_source();
        let conn = source.connection();

        let untyped = Artifact::new(0);
        assert!(matches!(
            put_entity(conn, &untyped),
            Err(Error::InvalidArgument(_))
        ));

        let unknown = Artifact::new(999);
        assert!(matches!(
            put_entity(conn, &unknown),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_insert_rejects_wrong_kind_type() {
        let source = initialized_source();
        let conn = source.connection();
        let execution_type =
            put_type(conn, &ExecutionType::new("trainer"), &OPTIONS).unwrap();

        let artifact = Artifact::new(execution_type);
        assert!(matches!(
            put_entity(conn, &artifact),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_property_validation() {
        let source = initialized_source();
        let conn = source.connection();
        let type_id = artifact_type(conn);

        let undeclared = Artifact::new(type_id).with_property("missing", 1i64);
        assert!(matches!(
            put_entity(conn, &undeclared),
            Err(Error::InvalidArgument(_))
        ));

        let mismatched = Artifact::new(type_id).with_property("rows", "ten");
        assert!(matches!(
            put_entity(conn, &mismatched),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_update_merges_properties() {
        let source = initialized_source();
        let conn = source.connection();
        let type_id = artifact_type(conn);

        let artifact = Artifact::new(type_id)
            .with_uri("s3://data/train")
            .with_property("rows", 10i64)
            .with_property("source", "sensor");
        let id = put_entity(conn, &artifact).unwrap();

        // update rows only; source must survive the merge
        let mut update = Artifact::new(0).with_property("rows", 20i64);
        update.id = id;
        update.uri = Some("s3://data/train-v2".to_string());
        assert_eq!(put_entity(conn, &update).unwrap(), id);

        let stored: Vec<Artifact> = get_entities_by_id(conn, &[id]).unwrap();
        assert_eq!(stored[0].uri.as_deref(), Some("s3://data/train-v2"));
        assert_eq!(stored[0].properties["rows"], PropertyValue::Int(20));
        assert_eq!(
            stored[0].properties["source"],
            PropertyValue::String("sensor".to_string())
        );
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let source = initialized_source();
        let conn = source.connection();
        let type_id = artifact_type(conn);

        let mut ghost = Artifact::new(type_id);
        ghost.id = 777;
        assert!(matches!(put_entity(conn, &ghost), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_update_cannot_change_type() {
        let source = initialized_source();
        let conn = source.connection();
        let type_id = artifact_type(conn);
        let other_type = put_type(conn, &ArtifactType::new("model"), &OPTIONS).unwrap();

        let id = put_entity(conn, &Artifact::new(type_id)).unwrap();
        let mut moved = Artifact::new(other_type);
        moved.id = id;
        assert!(matches!(
            put_entity(conn, &moved),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_context_name_unique_within_type() {
        let source = initialized_source();
        let conn = source.connection();
        let type_id = put_type(conn, &ContextType::new("run"), &OPTIONS).unwrap();
        let other_type = put_type(conn, &ContextType::new("experiment"), &OPTIONS).unwrap();

        let id = put_entity(conn, &Context::new(type_id, "run-1")).unwrap();
        assert!(matches!(
            put_entity(conn, &Context::new(type_id, "run-1")),
            Err(Error::AlreadyExists(_))
        ));

        // same name under a different type is fine
        put_entity(conn, &Context::new(other_type, "run-1")).unwrap();

        // updating the holder itself is fine
        let mut update = Context::new(type_id, "run-1");
        update.id = id;
        assert_eq!(put_entity(conn, &update).unwrap(), id);
    }

    #[test]
    fn test_get_all_in_insertion_order() {
        let source = initialized_source();
        let conn = source.connection();
        let type_id = put_type(conn, &ExecutionType::new("step"), &OPTIONS).unwrap();

        let first = put_entity(conn, &Execution::new(type_id)).unwrap();
        let second = put_entity(conn, &Execution::new(type_id)).unwrap();

        let all: Vec<Execution> = get_all_entities(conn).unwrap();
        let ids: Vec<i64> = all.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn test_get_by_type_name_unknown_is_empty() {
        let source = initialized_source();
        let conn = source.connection();
        let result: Vec<Artifact> = get_entities_by_type_name(conn, "no_such_type").unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_artifacts_by_uri() {
        let source = initialized_source();
        let conn = source.connection();
        let type_id = put_type(conn, &ArtifactType::new("blob"), &OPTIONS).unwrap();

        for uri in [Some("u1"), Some("u2"), Some("u2"), None, None, None] {
            let mut artifact = Artifact::new(type_id);
            artifact.uri = uri.map(str::to_string);
            put_entity(conn, &artifact).unwrap();
        }

        assert_eq!(get_artifacts_by_uri(conn, "u1").unwrap().len(), 1);
        assert_eq!(get_artifacts_by_uri(conn, "u2").unwrap().len(), 2);
        assert_eq!(get_artifacts_by_uri(conn, "").unwrap().len(), 3);
        assert_eq!(get_artifacts_by_uri(conn, "unknown").unwrap().len(), 0);
    }

    #[test]
    fn test_entity_exists() {
        let source = initialized_source();
        let conn = source.connection();
        let type_id = put_type(conn, &ArtifactType::new("blob"), &OPTIONS).unwrap();
        let id = put_entity(conn, &Artifact::new(type_id)).unwrap();

        assert!(entity_exists(conn, TypeKind::Artifact, id).unwrap());
        assert!(!entity_exists(conn, TypeKind::Artifact, id + 50).unwrap());
    }
}
