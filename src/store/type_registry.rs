//! Type registry - registration and evolution of entity types
//!
//! One generic implementation serves the three type kinds; the kind picks
//! the `type_kind` discriminator and nothing else. Registration is an
//! upsert with compatibility rules: identical shapes are idempotent,
//! additions need `can_add_fields`, removals and kind changes are
//! conflicts.

use crate::types::{TypeKind, TypeRecord};
use crate::value::PropertyType;
use crate::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;

/// Compatibility options for a type upsert.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PutTypeOptions {
    /// Allow the request to declare properties the stored type lacks
    pub can_add_fields: bool,
    /// Require every stored property to appear in the request
    pub all_fields_match: bool,
}

/// Insert the type or reconcile it with the stored one; returns the id.
pub(crate) fn put_type<T: TypeRecord>(
    conn: &Connection,
    record: &T,
    options: &PutTypeOptions,
) -> Result<i64> {
    if record.name().is_empty() {
        return Err(Error::InvalidArgument(format!(
            "{} type name must be specified",
            T::KIND
        )));
    }

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM Type WHERE name = ?1 AND type_kind = ?2",
            params![record.name(), T::KIND.code()],
            |row| row.get(0),
        )
        .optional()?;

    let type_id = match existing {
        None => {
            conn.execute(
                "INSERT INTO Type (name, type_kind) VALUES (?1, ?2)",
                params![record.name(), T::KIND.code()],
            )?;
            let type_id = conn.last_insert_rowid();
            insert_properties(conn, type_id, record.properties())?;
            type_id
        }
        Some(type_id) => {
            let stored = load_properties(conn, type_id)?;
            reconcile(conn, type_id, record, &stored, options)?;
            type_id
        }
    };
    Ok(type_id)
}

/// Apply the upsert compatibility rules against the stored property set.
fn reconcile<T: TypeRecord>(
    conn: &Connection,
    type_id: i64,
    record: &T,
    stored: &BTreeMap<String, PropertyType>,
    options: &PutTypeOptions,
) -> Result<()> {
    for (name, requested) in record.properties() {
        if let Some(declared) = stored.get(name) {
            if declared != requested {
                return Err(Error::AlreadyExists(format!(
                    "{} type '{}' already declares property '{}' as {}",
                    T::KIND,
                    record.name(),
                    name,
                    declared
                )));
            }
        }
    }

    if options.all_fields_match {
        for name in stored.keys() {
            if !record.properties().contains_key(name) {
                return Err(Error::AlreadyExists(format!(
                    "{} type '{}' already exists with property '{}' missing from the request",
                    T::KIND,
                    record.name(),
                    name
                )));
            }
        }
    }

    let additions: BTreeMap<String, PropertyType> = record
        .properties()
        .iter()
        .filter(|(name, _)| !stored.contains_key(*name))
        .map(|(name, ty)| (name.clone(), *ty))
        .collect();
    if !additions.is_empty() {
        if !options.can_add_fields {
            return Err(Error::AlreadyExists(format!(
                "{} type '{}' already exists; set can_add_fields to add properties",
                T::KIND,
                record.name()
            )));
        }
        insert_properties(conn, type_id, &additions)?;
    }
    Ok(())
}

fn insert_properties(
    conn: &Connection,
    type_id: i64,
    properties: &BTreeMap<String, PropertyType>,
) -> Result<()> {
    for (name, ty) in properties {
        conn.execute(
            "INSERT INTO TypeProperty (type_id, name, data_type) VALUES (?1, ?2, ?3)",
            params![type_id, name, ty.code()],
        )?;
    }
    Ok(())
}

fn load_properties(conn: &Connection, type_id: i64) -> Result<BTreeMap<String, PropertyType>> {
    let mut stmt = conn.prepare("SELECT name, data_type FROM TypeProperty WHERE type_id = ?1")?;
    let rows = stmt.query_map([type_id], |row| {
        let name: String = row.get(0)?;
        let code: i64 = row.get(1)?;
        Ok((name, code))
    })?;

    let mut properties = BTreeMap::new();
    for row in rows {
        let (name, code) = row?;
        let ty = PropertyType::from_code(code).ok_or_else(|| {
            Error::Internal(format!("unknown property type code {} on type {}", code, type_id))
        })?;
        properties.insert(name, ty);
    }
    Ok(properties)
}

/// Look up one type by name; `None` if the kind has no such type.
pub(crate) fn get_type_by_name<T: TypeRecord>(conn: &Connection, name: &str) -> Result<Option<T>> {
    let id: Option<i64> = conn
        .query_row(
            "SELECT id FROM Type WHERE name = ?1 AND type_kind = ?2",
            params![name, T::KIND.code()],
            |row| row.get(0),
        )
        .optional()?;

    match id {
        None => Ok(None),
        Some(id) => {
            let properties = load_properties(conn, id)?;
            Ok(Some(T::from_parts(id, name.to_string(), properties)))
        }
    }
}

/// Resolve a type name to its id without loading properties.
pub(crate) fn type_id_by_name(
    conn: &Connection,
    kind: TypeKind,
    name: &str,
) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM Type WHERE name = ?1 AND type_kind = ?2",
        params![name, kind.code()],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

/// Look up types by id, preserving request order and skipping missing ids.
pub(crate) fn get_types_by_id<T: TypeRecord>(conn: &Connection, ids: &[i64]) -> Result<Vec<T>> {
    let mut result = Vec::new();
    for &id in ids {
        let name: Option<String> = conn
            .query_row(
                "SELECT name FROM Type WHERE id = ?1 AND type_kind = ?2",
                params![id, T::KIND.code()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(name) = name {
            let properties = load_properties(conn, id)?;
            result.push(T::from_parts(id, name, properties));
        }
    }
    Ok(result)
}

/// All types of the kind, in registration order.
pub(crate) fn get_all_types<T: TypeRecord>(conn: &Connection) -> Result<Vec<T>> {
    let mut stmt =
        conn.prepare("SELECT id, name FROM Type WHERE type_kind = ?1 ORDER BY id")?;
    let rows = stmt.query_map([T::KIND.code()], |row| {
        let id: i64 = row.get(0)?;
        let name: String = row.get(1)?;
        Ok((id, name))
    })?;

    let headers: Vec<(i64, String)> = rows.collect::<rusqlite::Result<_>>()?;
    let mut result = Vec::with_capacity(headers.len());
    for (id, name) in headers {
        let properties = load_properties(conn, id)?;
        result.push(T::from_parts(id, name, properties));
    }
    Ok(result)
}

/// The declared property set of a type id, checked to be of the expected
/// kind. Used by the entity store to validate instances.
pub(crate) fn declared_properties(
    conn: &Connection,
    kind: TypeKind,
    type_id: i64,
) -> Result<BTreeMap<String, PropertyType>> {
    let stored_kind: Option<i64> = conn
        .query_row("SELECT type_kind FROM Type WHERE id = ?1", [type_id], |row| row.get(0))
        .optional()?;
    match stored_kind {
        None => Err(Error::InvalidArgument(format!(
            "type_id {} does not reference a registered type",
            type_id
        ))),
        Some(code) if code != kind.code() => Err(Error::InvalidArgument(format!(
            "type_id {} is not an {} type",
            type_id, kind
        ))),
        Some(_) => load_properties(conn, type_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::migration;
    use crate::store::executor::SqliteSource;
    use crate::types::{ArtifactType, ContextType, ExecutionType};

    const DEFAULT: PutTypeOptions = PutTypeOptions {
        can_add_fields: false,
        all_fields_match: true,
    };

    fn initialized_source() -> SqliteSource {
        let mut source = SqliteSource::open_in_memory().unwrap();
        migration::init_metadata_store(&mut source).unwrap();
        source
    }

    #[test]
    fn test_put_and_get_by_name() {
        let source = initialized_source();
        let conn = source.connection();

        let ty = ArtifactType::new("dataset").with_property("rows", PropertyType::Int);
        let id = put_type(conn, &ty, &DEFAULT).unwrap();
        assert!(id > 0);

        let stored: ArtifactType = get_type_by_name(conn, "dataset").unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.name, "dataset");
        assert_eq!(stored.properties["rows"], PropertyType::Int);
    }

    #[test]
    fn test_put_without_name_rejected() {
        let source = initialized_source();
        let err = put_type(source.connection(), &ArtifactType::new(""), &DEFAULT).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_identical_put_is_idempotent() {
        let source = initialized_source();
        let conn = source.connection();

        let ty = ExecutionType::new("trainer").with_property("state", PropertyType::String);
        let first = put_type(conn, &ty, &DEFAULT).unwrap();
        let second = put_type(conn, &ty, &DEFAULT).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_kind_change_rejected() {
        let source = initialized_source();
        let conn = source.connection();

        let ty = ArtifactType::new("dataset").with_property("rows", PropertyType::Int);
        put_type(conn, &ty, &DEFAULT).unwrap();

        let changed = ArtifactType::new("dataset").with_property("rows", PropertyType::String);
        let err = put_type(conn, &changed, &DEFAULT).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn test_removal_rejected() {
        let source = initialized_source();
        let conn = source.connection();

        let ty = ArtifactType::new("dataset")
            .with_property("rows", PropertyType::Int)
            .with_property("source", PropertyType::String);
        put_type(conn, &ty, &DEFAULT).unwrap();

        let narrowed = ArtifactType::new("dataset").with_property("rows", PropertyType::Int);
        let err = put_type(conn, &narrowed, &DEFAULT).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn test_addition_needs_opt_in() {
        let source = initialized_source();
        let conn = source.connection();

        let ty = ArtifactType::new("dataset").with_property("rows", PropertyType::Int);
        let id = put_type(conn, &ty, &DEFAULT).unwrap();

        let widened = ArtifactType::new("dataset")
            .with_property("rows", PropertyType::Int)
            .with_property("source", PropertyType::String);
        let err = put_type(conn, &widened, &DEFAULT).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));

        let with_adds = PutTypeOptions {
            can_add_fields: true,
            all_fields_match: true,
        };
        let same_id = put_type(conn, &widened, &with_adds).unwrap();
        assert_eq!(same_id, id);

        let stored: ArtifactType = get_type_by_name(conn, "dataset").unwrap().unwrap();
        assert_eq!(stored.properties.len(), 2);
    }

    #[test]
    fn test_relaxed_all_fields_match_tolerates_subset() {
        let source = initialized_source();
        let conn = source.connection();

        let ty = ContextType::new("pipeline")
            .with_property("owner", PropertyType::String)
            .with_property("priority", PropertyType::Int);
        let id = put_type(conn, &ty, &DEFAULT).unwrap();

        let relaxed = PutTypeOptions {
            can_add_fields: false,
            all_fields_match: false,
        };
        let subset = ContextType::new("pipeline").with_property("owner", PropertyType::String);
        assert_eq!(put_type(conn, &subset, &relaxed).unwrap(), id);

        // kind changes stay conflicts even when relaxed
        let changed = ContextType::new("pipeline").with_property("owner", PropertyType::Int);
        assert!(matches!(
            put_type(conn, &changed, &relaxed),
            Err(Error::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_same_name_different_kinds_coexist() {
        let source = initialized_source();
        let conn = source.connection();

        let artifact_id =
            put_type(conn, &ArtifactType::new("shared_name"), &DEFAULT).unwrap();
        let execution_id =
            put_type(conn, &ExecutionType::new("shared_name"), &DEFAULT).unwrap();
        assert_ne!(artifact_id, execution_id);
    }

    #[test]
    fn test_get_by_id_skips_missing() {
        let source = initialized_source();
        let conn = source.connection();

        let id = put_type(conn, &ArtifactType::new("only"), &DEFAULT).unwrap();
        let types: Vec<ArtifactType> = get_types_by_id(conn, &[id, id + 100]).unwrap();
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].id, id);
    }

    #[test]
    fn test_get_all_in_registration_order() {
        let source = initialized_source();
        let conn = source.connection();

        put_type(conn, &ArtifactType::new("first"), &DEFAULT).unwrap();
        put_type(conn, &ArtifactType::new("second"), &DEFAULT).unwrap();

        let types: Vec<ArtifactType> = get_all_types(conn).unwrap();
        let names: Vec<&str> = types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }
}
