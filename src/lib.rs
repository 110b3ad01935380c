//! # Mltrace - ML Pipeline Metadata Store
//!
//! Embedded, transactional metadata store for machine-learning pipelines.
//!
//! Mltrace records:
//! - The *types* of artifacts, executions, and contexts (a schema registry
//!   with compatibility rules)
//! - The *instances* of those entities, with typed and free-form properties
//! - The *relationships* between them: events (artifact <-> execution),
//!   attributions (artifact <-> context), associations (execution <-> context)
//!
//! Every public operation is atomic: it runs inside a single transaction on
//! the backing SQLite store and either commits or rolls back as a unit. The
//! on-disk layout is versioned and upgradable; see [`store::schema`] for the
//! enumerated history.

pub mod config;
pub mod entity;
pub mod event;
pub mod messages;
pub mod store;
pub mod types;
pub mod value;

// Re-exports for convenient access
pub use entity::{Artifact, Context, Execution};
pub use event::{Association, Attribution, Event, EventStep, EventType};
pub use messages::MigrationOptions;
pub use store::MetadataStore;
pub use types::{ArtifactType, ContextType, ExecutionType, TypeKind};
pub use value::{PropertyType, PropertyValue};

/// Result type alias for mltrace operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for mltrace operations.
///
/// The variants mirror the status taxonomy of the request/response surface:
/// component-level failures map onto exactly one of these kinds, and an
/// error inside a request always aborts that request's transaction.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required field is missing or a supplied value is out of range
    /// (e.g. a type without a name, a bad migration target).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A single-item lookup by name or id resolved to nothing.
    /// List operations return empty results instead of this error.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A type was re-registered with an incompatible shape, or a context
    /// name collided within its type.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The stored schema version is incompatible with this library and no
    /// migration was authorized.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// The store was intentionally left in a state the current library can
    /// no longer serve (downgrade migration); the caller must reconnect.
    #[error("{0}")]
    Cancelled(String),

    /// Backing-store failure not covered by the kinds above.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Inconsistent on-disk state (e.g. a property row with no value set).
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
