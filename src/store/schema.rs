//! Database schema definitions and version history
//!
//! The physical layout is versioned. `LIBRARY_SCHEMA_VERSION` is the layout
//! this build reads and writes; older stores are brought forward one step
//! at a time by the upgrade scripts, and `downgrade` scripts walk the same
//! history in reverse. Enumerated history:
//!
//! - v0: legacy layout - types, artifacts, executions, and events exist but
//!   there is no `MLMDEnv` version row
//! - v1: adds `MLMDEnv(schema_version)`
//! - v2: adds `EventPath`
//! - v3: adds `Context` and `ContextProperty`
//! - v4: adds `Attribution` and `Association`
//!
//! Downgrades that drop tables (4->3, 3->2, 2->1) are lossy: the dropped
//! rows are gone and a later upgrade recreates empty tables.

/// The schema version this library reads and writes.
pub const LIBRARY_SCHEMA_VERSION: i64 = 4;

/// Core tables present since the legacy (v0) layout.
const CORE_STATEMENTS: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS Type (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    type_kind INTEGER NOT NULL,
    UNIQUE(name, type_kind)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS TypeProperty (
    type_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    data_type INTEGER NOT NULL,
    PRIMARY KEY (type_id, name)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS Artifact (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type_id INTEGER NOT NULL,
    uri TEXT
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS ArtifactProperty (
    artifact_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    is_custom_property INTEGER NOT NULL,
    int_value INTEGER,
    double_value REAL,
    string_value TEXT,
    PRIMARY KEY (artifact_id, name, is_custom_property)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS Execution (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type_id INTEGER NOT NULL
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS ExecutionProperty (
    execution_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    is_custom_property INTEGER NOT NULL,
    int_value INTEGER,
    double_value REAL,
    string_value TEXT,
    PRIMARY KEY (execution_id, name, is_custom_property)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS Event (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    artifact_id INTEGER NOT NULL,
    execution_id INTEGER NOT NULL,
    type INTEGER NOT NULL,
    milliseconds_since_epoch INTEGER
)
"#,
    "CREATE INDEX IF NOT EXISTS idx_artifact_type ON Artifact(type_id)",
    "CREATE INDEX IF NOT EXISTS idx_artifact_uri ON Artifact(uri)",
    "CREATE INDEX IF NOT EXISTS idx_execution_type ON Execution(type_id)",
    "CREATE INDEX IF NOT EXISTS idx_event_artifact ON Event(artifact_id)",
    "CREATE INDEX IF NOT EXISTS idx_event_execution ON Event(execution_id)",
];

/// v0 -> v1: the version row. The migration runner writes the version value
/// itself, after the step's DDL.
const UPGRADE_V1: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS MLMDEnv (
    schema_version INTEGER PRIMARY KEY
)
"#,
];

/// v1 -> v2: event paths.
const UPGRADE_V2: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS EventPath (
    event_id INTEGER NOT NULL,
    is_index_step INTEGER NOT NULL,
    step_index INTEGER,
    step_key TEXT
)
"#,
    "CREATE INDEX IF NOT EXISTS idx_eventpath_event ON EventPath(event_id)",
];

/// v2 -> v3: contexts.
const UPGRADE_V3: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS Context (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    UNIQUE(type_id, name)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS ContextProperty (
    context_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    is_custom_property INTEGER NOT NULL,
    int_value INTEGER,
    double_value REAL,
    string_value TEXT,
    PRIMARY KEY (context_id, name, is_custom_property)
)
"#,
    "CREATE INDEX IF NOT EXISTS idx_context_type ON Context(type_id)",
];

/// v3 -> v4: attributions and associations.
const UPGRADE_V4: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS Attribution (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    context_id INTEGER NOT NULL,
    artifact_id INTEGER NOT NULL,
    UNIQUE(context_id, artifact_id)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS Association (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    context_id INTEGER NOT NULL,
    execution_id INTEGER NOT NULL,
    UNIQUE(context_id, execution_id)
)
"#,
    "CREATE INDEX IF NOT EXISTS idx_attribution_artifact ON Attribution(artifact_id)",
    "CREATE INDEX IF NOT EXISTS idx_association_execution ON Association(execution_id)",
];

// Downgrades drop what the matching upgrade added. Lossy where noted in the
// module docs.
const DOWNGRADE_V1: &[&str] = &["DROP TABLE IF EXISTS MLMDEnv"];
const DOWNGRADE_V2: &[&str] = &["DROP TABLE IF EXISTS EventPath"];
const DOWNGRADE_V3: &[&str] = &[
    "DROP TABLE IF EXISTS ContextProperty",
    "DROP TABLE IF EXISTS Context",
];
const DOWNGRADE_V4: &[&str] = &[
    "DROP TABLE IF EXISTS Association",
    "DROP TABLE IF EXISTS Attribution",
];

/// All statements creating a fresh store at `LIBRARY_SCHEMA_VERSION`.
/// The version row itself is inserted by the schema manager.
pub fn head_statements() -> Vec<&'static str> {
    let mut stmts: Vec<&'static str> = CORE_STATEMENTS.to_vec();
    for from in 0..LIBRARY_SCHEMA_VERSION {
        stmts.extend(upgrade_statements(from).iter().copied());
    }
    stmts
}

/// The script taking the layout from `from` to `from + 1`.
///
/// # Panics
/// Panics if `from` is outside the enumerated history; the schema manager
/// validates versions before asking for scripts.
pub fn upgrade_statements(from: i64) -> &'static [&'static str] {
    match from {
        0 => UPGRADE_V1,
        1 => UPGRADE_V2,
        2 => UPGRADE_V3,
        3 => UPGRADE_V4,
        _ => panic!("no upgrade script from schema version {}", from),
    }
}

/// The script taking the layout from `from` to `from - 1`.
///
/// # Panics
/// Panics if `from` is outside the enumerated history.
pub fn downgrade_statements(from: i64) -> &'static [&'static str] {
    match from {
        1 => DOWNGRADE_V1,
        2 => DOWNGRADE_V2,
        3 => DOWNGRADE_V3,
        4 => DOWNGRADE_V4,
        _ => panic!("no downgrade script from schema version {}", from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_cover_full_history() {
        for from in 0..LIBRARY_SCHEMA_VERSION {
            assert!(!upgrade_statements(from).is_empty());
        }
        for from in 1..=LIBRARY_SCHEMA_VERSION {
            assert!(!downgrade_statements(from).is_empty());
        }
    }

    #[test]
    fn test_head_includes_every_table() {
        let head = head_statements().join("\n");
        for table in [
            "Type", "TypeProperty", "Artifact", "ArtifactProperty", "Execution",
            "ExecutionProperty", "Event", "EventPath", "Context", "ContextProperty",
            "Attribution", "Association", "MLMDEnv",
        ] {
            assert!(
                head.contains(&format!("CREATE TABLE IF NOT EXISTS {}", table)),
                "missing table {}",
                table
            );
        }
    }
}
