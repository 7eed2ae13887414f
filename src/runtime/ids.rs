//! Identifiers for objects, actors, interactions and affordances
//!
//! Every cross-reference in the runtime is one of these ids rather than a
//! pointer: the `Runtime` arena owns the canonical values and lookups that
//! miss report "gone" instead of dangling.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a world object; actors are objects too
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub Uuid);

impl ObjectId {
    /// Create a new random ObjectId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Interaction identifier
///
/// Allocated monotonically by the runtime, so ordering by id is ordering by
/// creation. The id is the last component of every priority tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl TaskId {
    /// The id following this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "si#{}", self.0)
    }
}

/// Interaction group; members of one group never block each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u64);

/// Affordance identifier (tuning key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AffordanceId(pub String);

impl AffordanceId {
    /// Create a new affordance id
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AffordanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle returned when registering a change watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_order_by_creation() {
        let first = TaskId(1);
        let second = first.next();
        assert!(first < second);
        assert_eq!(second.to_string(), "si#2");
    }

    #[test]
    fn test_object_ids_are_unique() {
        assert_ne!(ObjectId::new(), ObjectId::new());
    }
}
