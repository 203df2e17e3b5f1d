//! Interface to the server the operations are sent to.

use crate::error::Result;
use crate::types::{Document, EntityKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Raw answer of a REST call: HTTP status and decoded JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestResponse {
    pub status: u16,
    pub data: Option<Value>,
}

impl RestResponse {
    pub fn new(status: u16, data: Option<Value>) -> Self {
        Self { status, data }
    }

    /// Value of `detail` in the body, the way the server reports errors
    pub fn detail(&self) -> Option<String> {
        self.data
            .as_ref()
            .and_then(|data| data.get("detail"))
            .and_then(Value::as_str)
            .filter(|detail| !detail.is_empty())
            .map(str::to_string)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Project anatomy preset used to initialize new projects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnatomyPreset {
    #[serde(default)]
    pub templates: Value,
    #[serde(default)]
    pub roots: Value,
    #[serde(default)]
    pub folder_types: Vec<Document>,
    #[serde(default)]
    pub task_types: Vec<Document>,
    #[serde(default)]
    pub attributes: Document,
}

/// Connection to the server.
///
/// Implementations own transport, authentication and any retry policy; the
/// operations layer issues each call exactly once.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get a project by name, `None` if it does not exist
    async fn get_project(&self, name: &str, fields: Option<&[&str]>) -> Result<Option<Document>>;

    /// Get an anatomy preset by name, or the primary preset
    async fn get_project_anatomy_preset(&self, name: Option<&str>) -> Result<AnatomyPreset>;

    /// Names of the attributes defined for an entity type
    async fn get_attributes_for_type(&self, entity_type: &str) -> Result<HashSet<String>>;

    /// Get an entity in its server shape, `None` if it does not exist
    async fn get_entity(
        &self,
        project_name: &str,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<Option<Document>>;

    async fn post(&self, path: &str, body: Value) -> Result<RestResponse>;

    async fn put(&self, path: &str, body: Value) -> Result<RestResponse>;

    async fn delete(&self, path: &str) -> Result<RestResponse>;
}
