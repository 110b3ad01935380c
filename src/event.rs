//! Lineage relationships - events, attributions, associations
//!
//! Three relationship kinds connect the entity kinds:
//! - `Event`: a typed, timestamped link between an artifact and an execution
//! - `Attribution`: an artifact belongs to a context
//! - `Association`: an execution belongs to a context
//!
//! Events are append-only and are not deduplicated; attributions and
//! associations are unordered pairs and re-inserting one is a no-op.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The direction and declaration status of an artifact/execution link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Unspecified; rejected on insert
    Unknown,
    /// The artifact is a declared output of the execution
    DeclaredOutput,
    /// The artifact is a declared input of the execution
    DeclaredInput,
    /// The artifact was read by the execution
    Input,
    /// The artifact was produced by the execution
    Output,
}

impl Default for EventType {
    fn default() -> Self {
        EventType::Unknown
    }
}

impl EventType {
    /// Get the string representation of the event type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Unknown => "unknown",
            EventType::DeclaredOutput => "declared_output",
            EventType::DeclaredInput => "declared_input",
            EventType::Input => "input",
            EventType::Output => "output",
        }
    }

    /// Get all event types
    pub fn all() -> &'static [EventType] {
        &[
            EventType::Unknown,
            EventType::DeclaredOutput,
            EventType::DeclaredInput,
            EventType::Input,
            EventType::Output,
        ]
    }

    /// Stable storage code (stored in `Event.type`)
    pub(crate) fn code(&self) -> i64 {
        match self {
            EventType::Unknown => 0,
            EventType::DeclaredOutput => 1,
            EventType::DeclaredInput => 2,
            EventType::Input => 3,
            EventType::Output => 4,
        }
    }

    /// Reverse of [`EventType::code`]; `None` for unknown codes.
    pub(crate) fn from_code(code: i64) -> Option<EventType> {
        match code {
            0 => Some(EventType::Unknown),
            1 => Some(EventType::DeclaredOutput),
            2 => Some(EventType::DeclaredInput),
            3 => Some(EventType::Input),
            4 => Some(EventType::Output),
            _ => None,
        }
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "unknown" => Ok(EventType::Unknown),
            "declared_output" => Ok(EventType::DeclaredOutput),
            "declared_input" => Ok(EventType::DeclaredInput),
            "input" => Ok(EventType::Input),
            "output" => Ok(EventType::Output),
            _ => Err(Error::InvalidArgument(format!("Unknown event type: {}", s))),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One step of an event path: where within the execution's signature the
/// artifact was used (a positional index or a named key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStep {
    Index(i64),
    Key(String),
}

/// A typed link between an artifact and an execution.
///
/// Within a composite `PutExecution`, `artifact_id`/`execution_id` may be
/// left unset (0) and are completed from the surrounding pair.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Event {
    /// Server-assigned id; 0 until stored
    pub id: i64,
    /// The artifact endpoint; must exist at insert time
    pub artifact_id: i64,
    /// The execution endpoint; must exist at insert time
    pub execution_id: i64,
    /// Direction/declaration of the link; must not be `Unknown`
    pub event_type: EventType,
    /// Optional path of the artifact within the execution's signature
    pub path: Vec<EventStep>,
    /// Event time in milliseconds since the epoch; stamped by the store
    /// when unset
    pub milliseconds_since_epoch: Option<i64>,
}

impl Event {
    /// Create a new event linking an artifact to an execution
    pub fn new(artifact_id: i64, execution_id: i64, event_type: EventType) -> Self {
        Self {
            artifact_id,
            execution_id,
            event_type,
            ..Default::default()
        }
    }

    /// Create an event with both endpoints unset, for use inside a
    /// composite `PutExecution` pair
    pub fn of_type(event_type: EventType) -> Self {
        Self {
            event_type,
            ..Default::default()
        }
    }

    /// Append an index step to the path
    pub fn with_index_step(mut self, index: i64) -> Self {
        self.path.push(EventStep::Index(index));
        self
    }

    /// Append a key step to the path
    pub fn with_key_step(mut self, key: impl Into<String>) -> Self {
        self.path.push(EventStep::Key(key.into()));
        self
    }

    /// Set the event time
    pub fn at(mut self, milliseconds_since_epoch: i64) -> Self {
        self.milliseconds_since_epoch = Some(milliseconds_since_epoch);
        self
    }
}

/// A link stating that an artifact belongs to a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Attribution {
    pub artifact_id: i64,
    pub context_id: i64,
}

impl Attribution {
    pub fn new(artifact_id: i64, context_id: i64) -> Self {
        Self { artifact_id, context_id }
    }
}

/// A link stating that an execution belongs to a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Association {
    pub execution_id: i64,
    pub context_id: i64,
}

impl Association {
    pub fn new(execution_id: i64, context_id: i64) -> Self {
        Self { execution_id, context_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_roundtrip() {
        for ty in EventType::all() {
            let s = ty.as_str();
            let parsed: EventType = s.parse().unwrap();
            assert_eq!(*ty, parsed);
            assert_eq!(EventType::from_code(ty.code()), Some(*ty));
        }
    }

    #[test]
    fn test_event_builder() {
        let event = Event::new(7, 9, EventType::Output)
            .with_key_step("model")
            .with_index_step(0)
            .at(1234);

        assert_eq!(event.artifact_id, 7);
        assert_eq!(event.execution_id, 9);
        assert_eq!(
            event.path,
            vec![EventStep::Key("model".to_string()), EventStep::Index(0)]
        );
        assert_eq!(event.milliseconds_since_epoch, Some(1234));
    }

    #[test]
    fn test_unset_endpoints_default_to_zero() {
        let event = Event::of_type(EventType::DeclaredInput);
        assert_eq!(event.artifact_id, 0);
        assert_eq!(event.execution_id, 0);
        assert!(event.milliseconds_since_epoch.is_none());
    }
}
