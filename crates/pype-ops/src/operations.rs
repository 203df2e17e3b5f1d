//! Create, update and delete operations and their wire form.

use crate::adapter::{CreateAdapter, CreateContext, UpdateAdapter, UpdateContext};
use crate::diff::{DiffMap, FieldValue, to_wire_map};
use crate::error::{OpsError, Result};
use crate::id::{EntityId, OperationId};
use crate::session::OperationsSession;
use crate::types::{Document, EntityKind, OperationKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One instruction of a batch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireOp {
    pub id: String,
    #[serde(rename = "type")]
    pub operation_type: OperationKind,
    pub entity_type: EntityKind,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Document>,
}

/// Operation creating an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOperation {
    id: OperationId,
    project_name: String,
    entity_kind: EntityKind,
    entity_id: EntityId,
    data: Document,
}

/// A create operation together with the payloads of tasks that must be
/// created right after it.
///
/// Register it with `OperationsSession::add_prepared_create`; registering
/// only `operation` leaves the tasks out.
#[derive(Debug, Clone)]
pub struct PreparedCreate {
    pub operation: CreateOperation,
    pub nested_tasks: Vec<Document>,
}

impl CreateOperation {
    /// Build a create operation, converting the payload into server shape.
    ///
    /// Lookups needed by the conversion go through `session`. Tasks embedded
    /// in a folder payload are stripped and returned with `name` and
    /// `folderId` filled in.
    pub async fn prepare(
        session: &OperationsSession,
        project_name: &str,
        kind: EntityKind,
        payload: Document,
    ) -> Result<PreparedCreate> {
        let adapter = CreateAdapter::for_kind(kind)?;
        let payload = canonicalize_document(payload)?;

        let project = if adapter.needs_project() {
            session.get_project(project_name).await?
        } else {
            None
        };
        let attributes = session.attributes_for(adapter.target()).await?;
        let ctx = CreateContext {
            project: project.as_ref(),
            attributes: &attributes,
        };
        let converted = adapter.convert(payload, &ctx)?;

        let mut data = converted.payload;
        let existing = data
            .get("id")
            .and_then(Value::as_str)
            .map(EntityId::validate_or_accept)
            .transpose()?;
        let entity_id = match existing {
            Some(id) => id,
            None => {
                let id = EntityId::new();
                data.insert("id".into(), Value::String(id.to_string()));
                id
            }
        };

        let nested_tasks = converted
            .tasks
            .into_iter()
            .map(|(name, mut task)| {
                task.insert("name".into(), Value::String(name));
                task.insert("folderId".into(), Value::String(entity_id.to_string()));
                task
            })
            .collect();

        Ok(PreparedCreate {
            operation: Self {
                id: OperationId::new(),
                project_name: project_name.to_string(),
                entity_kind: adapter.target(),
                entity_id,
                data,
            },
            nested_tasks,
        })
    }

    pub fn id(&self) -> &OperationId {
        &self.id
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn entity_kind(&self) -> EntityKind {
        self.entity_kind
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Converted payload that will be sent
    pub fn data(&self) -> &Document {
        &self.data
    }

    pub fn to_wire_operation(&self) -> WireOp {
        WireOp {
            id: self.id.to_string(),
            operation_type: OperationKind::Create,
            entity_type: self.entity_kind,
            entity_id: self.entity_id.to_string(),
            data: Some(self.data.clone()),
        }
    }
}

/// Operation updating fields of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOperation {
    id: OperationId,
    project_name: String,
    entity_kind: EntityKind,
    entity_id: EntityId,
    changes: DiffMap,
}

impl UpdateOperation {
    /// Build an update operation from a diff in legacy field names.
    ///
    /// Only the first level of `changes` is interpreted. The current entity is
    /// fetched through `session` when the conversion needs it.
    pub async fn prepare(
        session: &OperationsSession,
        project_name: &str,
        kind: EntityKind,
        entity_id: &str,
        changes: DiffMap,
    ) -> Result<Self> {
        let adapter = UpdateAdapter::for_kind(kind)?;
        let entity_id = EntityId::validate_or_accept(entity_id)?;
        let changes = canonicalize_changes(changes)?;

        let converted = if changes.is_empty() {
            changes
        } else {
            let current = if adapter.needs_current(&changes) {
                let current = session
                    .get_entity(project_name, adapter.target(), entity_id.as_str())
                    .await?;
                Some(current.ok_or_else(|| OpsError::EntityNotFound {
                    project: project_name.to_string(),
                    kind: adapter.target().to_string(),
                    id: entity_id.to_string(),
                })?)
            } else {
                None
            };
            let attributes = session.attributes_for(adapter.target()).await?;
            let ctx = UpdateContext {
                current: current.as_ref(),
                attributes: &attributes,
            };
            adapter.convert(changes, &ctx)?
        };

        Ok(Self {
            id: OperationId::new(),
            project_name: project_name.to_string(),
            entity_kind: adapter.target(),
            entity_id,
            changes: converted,
        })
    }

    pub fn id(&self) -> &OperationId {
        &self.id
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn entity_kind(&self) -> EntityKind {
        self.entity_kind
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Converted changes that will be sent
    pub fn changes(&self) -> &DiffMap {
        &self.changes
    }

    /// Wire instruction, `None` when there is nothing to change
    pub fn to_wire_operation(&self) -> Option<WireOp> {
        if self.changes.is_empty() {
            return None;
        }
        Some(WireOp {
            id: self.id.to_string(),
            operation_type: OperationKind::Update,
            entity_type: self.entity_kind,
            entity_id: self.entity_id.to_string(),
            data: Some(to_wire_map(self.changes.clone())),
        })
    }
}

/// Operation deleting an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOperation {
    id: OperationId,
    project_name: String,
    entity_kind: EntityKind,
    entity_id: EntityId,
}

impl DeleteOperation {
    pub fn new(project_name: &str, kind: EntityKind, entity_id: &str) -> Result<Self> {
        Ok(Self {
            id: OperationId::new(),
            project_name: project_name.to_string(),
            entity_kind: kind.server_kind(),
            entity_id: EntityId::validate_or_accept(entity_id)?,
        })
    }

    pub fn id(&self) -> &OperationId {
        &self.id
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn entity_kind(&self) -> EntityKind {
        self.entity_kind
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn to_wire_operation(&self) -> WireOp {
        WireOp {
            id: self.id.to_string(),
            operation_type: OperationKind::Delete,
            entity_type: self.entity_kind,
            entity_id: self.entity_id.to_string(),
            data: None,
        }
    }
}

/// Any pending operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create(CreateOperation),
    Update(UpdateOperation),
    Delete(DeleteOperation),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create(_) => OperationKind::Create,
            Self::Update(_) => OperationKind::Update,
            Self::Delete(_) => OperationKind::Delete,
        }
    }

    pub fn id(&self) -> &OperationId {
        match self {
            Self::Create(op) => op.id(),
            Self::Update(op) => op.id(),
            Self::Delete(op) => op.id(),
        }
    }

    pub fn project_name(&self) -> &str {
        match self {
            Self::Create(op) => op.project_name(),
            Self::Update(op) => op.project_name(),
            Self::Delete(op) => op.project_name(),
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Self::Create(op) => op.entity_kind(),
            Self::Update(op) => op.entity_kind(),
            Self::Delete(op) => op.entity_kind(),
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        match self {
            Self::Create(op) => op.entity_id(),
            Self::Update(op) => op.entity_id(),
            Self::Delete(op) => op.entity_id(),
        }
    }

    pub fn to_wire_operation(&self) -> Option<WireOp> {
        match self {
            Self::Create(op) => Some(op.to_wire_operation()),
            Self::Update(op) => op.to_wire_operation(),
            Self::Delete(op) => Some(op.to_wire_operation()),
        }
    }
}

/// Check that a payload round-trips through the wire encoding.
///
/// Extended-JSON dates (`{"$date": ...}`) become integer epoch seconds.
/// Legacy object ids (`{"$oid": ...}`) cannot be sent and fail.
pub fn canonicalize_payload(value: Value) -> Result<Value> {
    canonicalize_at(value, "$")
}

fn canonicalize_document(doc: Document) -> Result<Document> {
    doc.into_iter()
        .map(|(key, value)| {
            let path = format!("$.{}", key);
            Ok((key, canonicalize_at(value, &path)?))
        })
        .collect()
}

fn canonicalize_changes(changes: DiffMap) -> Result<DiffMap> {
    changes
        .into_iter()
        .map(|(key, change)| {
            let change = match change {
                FieldValue::Set(value) => {
                    FieldValue::Set(canonicalize_at(value, &format!("$.{}", key))?)
                }
                FieldValue::Remove => FieldValue::Remove,
            };
            Ok((key, change))
        })
        .collect()
}

fn canonicalize_at(value: Value, path: &str) -> Result<Value> {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if map.contains_key("$oid") {
                    return Err(OpsError::non_serializable(
                        path,
                        "Type of 'ObjectId' is not supported anymore",
                    ));
                }
                if let Some(date) = map.get("$date") {
                    return date_to_timestamp(date, path);
                }
            }
            map.into_iter()
                .map(|(key, value)| {
                    let child = format!("{}.{}", path, key);
                    Ok((key, canonicalize_at(value, &child)?))
                })
                .collect::<Result<Document>>()
                .map(Value::Object)
        }
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, value)| canonicalize_at(value, &format!("{}[{}]", path, index)))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

fn date_to_timestamp(date: &Value, path: &str) -> Result<Value> {
    let millis = match date {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        Value::Object(inner) => inner
            .get("$numberLong")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<i64>().ok()),
        _ => None,
    };
    millis
        .map(|ms| Value::from(ms.div_euclid(1000)))
        .ok_or_else(|| OpsError::non_serializable(path, format!("unreadable date value {}", date)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delete_renames_asset() {
        let id = EntityId::new();
        let op = DeleteOperation::new("demo", EntityKind::Asset, id.as_str()).unwrap();
        let wire = serde_json::to_value(op.to_wire_operation()).unwrap();
        assert_eq!(wire["entityType"], "folder");
        assert_eq!(wire["type"], "delete");
        assert_eq!(wire["entityId"], id.as_str());
        assert!(wire.get("data").is_none());
    }

    #[test]
    fn test_delete_rejects_bad_id() {
        assert!(DeleteOperation::new("demo", EntityKind::Subset, "nope").is_err());
    }

    #[test]
    fn test_canonicalize_dates() {
        let value = json!({
            "a": {"$date": "2023-01-01T00:00:10Z"},
            "b": [{"$date": 1672531210999i64}],
            "c": {"$date": {"$numberLong": "1000"}}
        });
        let out = canonicalize_payload(value).unwrap();
        assert_eq!(out, json!({"a": 1672531210, "b": [1672531210], "c": 1}));
    }

    #[test]
    fn test_canonicalize_rejects_object_id() {
        let err = canonicalize_payload(json!({"data": {"ids": [{"$oid": "5f2b7c9e8a1d4e3f2a1b0c9d"}]}}))
            .unwrap_err();
        match err {
            OpsError::NonSerializablePayload { path, .. } => assert_eq!(path, "$.data.ids[0]"),
            other => panic!("unexpected error {other}"),
        }
    }
}
