//! Unique identifier types for entities and operations.

use crate::error::{OpsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Length of the legacy object-id hex encoding.
const LEGACY_OBJECT_ID_LEN: usize = 24;

/// A unique identifier for entities.
///
/// Client-generated ids are UUIDv4 rendered as 32 lowercase hex characters.
/// Caller-supplied ids are kept verbatim once they parse as a UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

/// Operations are correlated with server responses by ids of the same shape.
pub type OperationId = EntityId;

impl EntityId {
    /// Create a new random ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accept a caller-supplied identifier if it is in the canonical form
    pub fn validate_or_accept(candidate: &str) -> Result<Self> {
        if is_legacy_object_id(candidate) {
            return Err(OpsError::invalid_identifier(
                candidate,
                "legacy object id encoding is not supported anymore",
            ));
        }
        Uuid::parse_str(candidate)
            .map_err(|e| OpsError::invalid_identifier(candidate, e.to_string()))?;
        Ok(Self(candidate.to_string()))
    }

    /// Get the identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the identifier string
    pub fn into_string(self) -> String {
        self.0
    }
}

/// Generate a fresh entity identifier
pub fn new_id() -> EntityId {
    EntityId::new()
}

/// Accept a caller-supplied identifier, see [`EntityId::validate_or_accept`]
pub fn validate_or_accept(candidate: &str) -> Result<EntityId> {
    EntityId::validate_or_accept(candidate)
}

/// Use the given id if any, otherwise generate one
pub(crate) fn create_or_accept(candidate: Option<&str>) -> Result<EntityId> {
    match candidate {
        Some(candidate) => EntityId::validate_or_accept(candidate),
        None => Ok(EntityId::new()),
    }
}

fn is_legacy_object_id(candidate: &str) -> bool {
    candidate.len() == LEGACY_OBJECT_ID_LEN && candidate.chars().all(|c| c.is_ascii_hexdigit())
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntityId {
    type Error = OpsError;

    fn try_from(value: String) -> Result<Self> {
        Self::validate_or_accept(&value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl std::str::FromStr for EntityId {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::validate_or_accept(s)
    }
}
