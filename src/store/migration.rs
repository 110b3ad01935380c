//! Schema manager - probe, initialize, upgrade, downgrade
//!
//! Owns the single `MLMDEnv` row. Initialization writes the library
//! version; upgrades walk the script history one step per transaction,
//! writing the version row last in each step; downgrades walk it in
//! reverse inside one transaction. Only this module mutates the version
//! row.

use super::executor::SqliteSource;
use super::schema::{self, LIBRARY_SCHEMA_VERSION};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

/// What a fresh look at the backing store found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SchemaProbe {
    /// No tables at all
    Empty,
    /// Tables exist; version 0 is the legacy layout without a version row
    Version(i64),
}

/// Inspect the backing store without modifying it.
pub(crate) fn probe(conn: &Connection) -> Result<SchemaProbe> {
    let tables: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    if tables == 0 {
        return Ok(SchemaProbe::Empty);
    }

    let has_env: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'MLMDEnv'",
        [],
        |row| row.get(0),
    )?;
    if has_env == 0 {
        // Legacy layout: tables but no version row.
        return Ok(SchemaProbe::Version(0));
    }

    let version: Option<i64> = conn
        .query_row("SELECT schema_version FROM MLMDEnv", [], |row| row.get(0))
        .optional()?;
    match version {
        Some(v) => Ok(SchemaProbe::Version(v)),
        None => Err(Error::Internal(
            "MLMDEnv exists but holds no schema version".to_string(),
        )),
    }
}

fn write_schema_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute("DELETE FROM MLMDEnv", [])?;
    conn.execute(
        "INSERT INTO MLMDEnv (schema_version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Create every table of the head layout and stamp the library version.
/// Runs in one transaction.
fn create_head_schema(source: &mut SqliteSource) -> Result<()> {
    let tx = source.transaction()?;
    for stmt in schema::head_statements() {
        tx.execute(stmt, [])?;
    }
    write_schema_version(&tx, LIBRARY_SCHEMA_VERSION)?;
    tx.commit()?;
    info!(version = LIBRARY_SCHEMA_VERSION, "initialized metadata store schema");
    Ok(())
}

/// Init mode: create an empty store, accept a current one, reject anything
/// else.
pub(crate) fn init_metadata_store(source: &mut SqliteSource) -> Result<()> {
    match probe(source.connection())? {
        SchemaProbe::Empty => create_head_schema(source),
        SchemaProbe::Version(v) if v == LIBRARY_SCHEMA_VERSION => Ok(()),
        SchemaProbe::Version(v) => Err(Error::FailedPrecondition(format!(
            "store is at schema version {} but the library expects {}",
            v, LIBRARY_SCHEMA_VERSION
        ))),
    }
}

/// Init-if-not-exists mode: idempotent; optionally brings an older store
/// forward.
pub(crate) fn init_metadata_store_if_not_exists(
    source: &mut SqliteSource,
    enable_upgrade_migration: bool,
) -> Result<()> {
    match probe(source.connection())? {
        SchemaProbe::Empty => create_head_schema(source),
        SchemaProbe::Version(v) if v == LIBRARY_SCHEMA_VERSION => Ok(()),
        SchemaProbe::Version(v) if v > LIBRARY_SCHEMA_VERSION => {
            Err(Error::FailedPrecondition(format!(
                "store is at schema version {} which is newer than the library's {}",
                v, LIBRARY_SCHEMA_VERSION
            )))
        }
        SchemaProbe::Version(v) => {
            if !enable_upgrade_migration {
                return Err(Error::FailedPrecondition(format!(
                    "store is at schema version {} but the library expects {}; \
                     upgrade migration is not enabled",
                    v, LIBRARY_SCHEMA_VERSION
                )));
            }
            upgrade(source, v)
        }
    }
}

/// Walk the upgrade scripts from `stored` up to the library version, one
/// transaction per step, writing the version row last in each step.
pub(crate) fn upgrade(source: &mut SqliteSource, stored: i64) -> Result<()> {
    for from in stored..LIBRARY_SCHEMA_VERSION {
        let tx = source.transaction()?;
        for stmt in schema::upgrade_statements(from) {
            tx.execute(stmt, [])?;
        }
        write_schema_version(&tx, from + 1)?;
        tx.commit()?;
        debug!(from, to = from + 1, "applied schema upgrade step");
    }
    info!(
        from = stored,
        to = LIBRARY_SCHEMA_VERSION,
        "upgraded metadata store schema"
    );
    Ok(())
}

/// Walk the downgrade scripts from the stored version down to `target`
/// inside one transaction. The store is left at `target`; the caller is
/// expected to abandon the handle afterwards.
pub(crate) fn downgrade(source: &mut SqliteSource, target: i64) -> Result<()> {
    if !(0..=LIBRARY_SCHEMA_VERSION).contains(&target) {
        return Err(Error::InvalidArgument(format!(
            "cannot downgrade to schema version {}; valid targets are 0..={}",
            target, LIBRARY_SCHEMA_VERSION
        )));
    }

    // An empty store is brought to the head layout first so the downgrade
    // walks a known history.
    if probe(source.connection())? == SchemaProbe::Empty {
        create_head_schema(source)?;
    }

    let stored = match probe(source.connection())? {
        SchemaProbe::Version(v) => v,
        SchemaProbe::Empty => unreachable!("store was just initialized"),
    };
    if stored > LIBRARY_SCHEMA_VERSION {
        return Err(Error::FailedPrecondition(format!(
            "store is at schema version {} which is newer than the library's {}; \
             use a library that knows that version to downgrade",
            stored, LIBRARY_SCHEMA_VERSION
        )));
    }

    if stored > target {
        let tx = source.transaction()?;
        for from in (target + 1..=stored).rev() {
            for stmt in schema::downgrade_statements(from) {
                tx.execute(stmt, [])?;
            }
            // v0 has no MLMDEnv to record a version in.
            if from - 1 > 0 {
                write_schema_version(&tx, from - 1)?;
            }
        }
        tx.commit()?;
        info!(from = stored, to = target, "downgraded metadata store schema");
    }
    Ok(())
}
