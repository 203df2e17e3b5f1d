//! Operations session: collects operations and commits them in batches.
//!
//! Operations are kept in registration order. An operation registered as
//! nested under another operation id waits in a side-table and is moved into
//! the pending list right after that operation is accepted. Commit sends one
//! batch per project and fails on the first operation the server rejected.
//! Batches already sent are not rolled back.

use crate::connection::Connection;
use crate::diff::DiffMap;
use crate::error::{OpsError, Result};
use crate::id::{EntityId, OperationId};
use crate::operations::{
    CreateOperation, DeleteOperation, Operation, PreparedCreate, UpdateOperation, WireOp,
};
use crate::types::{Document, EntityKind, OperationKind};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identifiers of a registered operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    pub operation_id: OperationId,
    pub operation_kind: OperationKind,
    pub project_name: String,
    pub entity_kind: EntityKind,
    pub entity_id: EntityId,
}

impl From<&Operation> for OperationHandle {
    fn from(operation: &Operation) -> Self {
        Self {
            operation_id: operation.id().clone(),
            operation_kind: operation.kind(),
            project_name: operation.project_name().to_string(),
            entity_kind: operation.entity_kind(),
            entity_id: operation.entity_id().clone(),
        }
    }
}

#[derive(Debug, Default)]
struct PendingState {
    operations: Vec<Operation>,
    nested: HashMap<OperationId, Vec<Operation>>,
}

impl PendingState {
    fn register(&mut self, operation: Operation, nested_of: Option<&OperationId>) {
        match nested_of {
            Some(parent) => {
                debug!(
                    operation = %operation.id(),
                    parent = %parent,
                    "Deferring nested operation"
                );
                self.nested.entry(parent.clone()).or_default().push(operation);
            }
            None => self.accept(operation),
        }
    }

    /// Append to the pending list, then everything that waited for it.
    fn accept(&mut self, operation: Operation) {
        let id = operation.id().clone();
        self.operations.push(operation);
        if let Some(children) = self.nested.remove(&id) {
            for child in children {
                self.accept(child);
            }
        }
    }
}

/// Unit of work over a server connection.
pub struct OperationsSession {
    con: Arc<dyn Connection>,
    state: Mutex<PendingState>,
    project_cache: DashMap<String, Option<Document>>,
    attribute_cache: DashMap<EntityKind, Arc<HashSet<String>>>,
}

impl OperationsSession {
    pub fn new(con: Arc<dyn Connection>) -> Self {
        Self {
            con,
            state: Mutex::new(PendingState::default()),
            project_cache: DashMap::new(),
            attribute_cache: DashMap::new(),
        }
    }

    /// Get a project document, cached for the lifetime of the session.
    ///
    /// Returns a copy, so callers cannot alter the cached document.
    pub async fn get_project(&self, project_name: &str) -> Result<Option<Document>> {
        if let Some(cached) = self.project_cache.get(project_name) {
            return Ok(cached.value().clone());
        }
        let project = self.con.get_project(project_name, None).await?;
        self.project_cache
            .insert(project_name.to_string(), project.clone());
        Ok(project)
    }

    /// Attribute names defined for an entity kind, cached per session
    pub async fn attributes_for(&self, kind: EntityKind) -> Result<Arc<HashSet<String>>> {
        let kind = kind.server_kind();
        if let Some(cached) = self.attribute_cache.get(&kind) {
            return Ok(Arc::clone(cached.value()));
        }
        let attributes = Arc::new(self.con.get_attributes_for_type(kind.as_str()).await?);
        self.attribute_cache.insert(kind, Arc::clone(&attributes));
        Ok(attributes)
    }

    /// Current server-side shape of an entity
    pub async fn get_entity(
        &self,
        project_name: &str,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<Option<Document>> {
        self.con
            .get_entity(project_name, kind.server_kind(), entity_id)
            .await
    }

    /// Register creation of an entity.
    ///
    /// Hero versions are never created through operations; the request is
    /// ignored and `None` returned. Tasks embedded in a folder payload are
    /// registered as nested operations of the folder.
    pub async fn create_entity(
        &self,
        project_name: &str,
        kind: EntityKind,
        payload: Document,
        nested_of: Option<&OperationId>,
    ) -> Result<Option<OperationHandle>> {
        if kind == EntityKind::HeroVersion {
            debug!(project = project_name, "Ignoring hero version create request");
            return Ok(None);
        }

        let prepared = CreateOperation::prepare(self, project_name, kind, payload).await?;
        let handle = self.add_prepared_create(prepared, nested_of).await?;
        debug!(
            project = project_name,
            kind = %handle.entity_kind,
            entity = %handle.entity_id,
            "Registered create operation"
        );
        Ok(Some(handle))
    }

    /// Register a prepared create together with the tasks it carries.
    ///
    /// The tasks are prepared here and wait for the create under its
    /// operation id, so they are sent right after it.
    pub async fn add_prepared_create(
        &self,
        prepared: PreparedCreate,
        nested_of: Option<&OperationId>,
    ) -> Result<OperationHandle> {
        let project_name = prepared.operation.project_name().to_string();
        let mut tasks = Vec::with_capacity(prepared.nested_tasks.len());
        for task in prepared.nested_tasks {
            let task = CreateOperation::prepare(self, &project_name, EntityKind::Task, task).await?;
            tasks.push(Operation::Create(task.operation));
        }

        let operation = Operation::Create(prepared.operation);
        let handle = OperationHandle::from(&operation);
        {
            let mut state = self.state.lock();
            for task in tasks {
                state.register(task, Some(&handle.operation_id));
            }
            state.register(operation, nested_of);
        }
        Ok(handle)
    }

    /// Register an update of an entity from a diff in legacy field names
    pub async fn update_entity(
        &self,
        project_name: &str,
        kind: EntityKind,
        entity_id: &str,
        changes: DiffMap,
        nested_of: Option<&OperationId>,
    ) -> Result<OperationHandle> {
        let operation =
            UpdateOperation::prepare(self, project_name, kind, entity_id, changes).await?;
        Ok(self.register(Operation::Update(operation), nested_of))
    }

    /// Register deletion of an entity
    pub fn delete_entity(
        &self,
        project_name: &str,
        kind: EntityKind,
        entity_id: &str,
        nested_of: Option<&OperationId>,
    ) -> Result<OperationHandle> {
        let operation = DeleteOperation::new(project_name, kind, entity_id)?;
        Ok(self.register(Operation::Delete(operation), nested_of))
    }

    /// Register an operation built outside the session.
    ///
    /// Lets dependents be registered under an operation id before the
    /// operation itself is added. Use [`Self::add_prepared_create`] for a
    /// [`PreparedCreate`] so its nested tasks are not dropped.
    pub fn add_operation(
        &self,
        operation: Operation,
        nested_of: Option<&OperationId>,
    ) -> OperationHandle {
        self.register(operation, nested_of)
    }

    fn register(&self, operation: Operation, nested_of: Option<&OperationId>) -> OperationHandle {
        let handle = OperationHandle::from(&operation);
        self.state.lock().register(operation, nested_of);
        debug!(
            project = %handle.project_name,
            operation = %handle.operation_kind,
            kind = %handle.entity_kind,
            entity = %handle.entity_id,
            "Registered operation"
        );
        handle
    }

    /// Copy of the operations that the next commit would send
    pub fn pending_operations(&self) -> Vec<Operation> {
        self.state.lock().operations.clone()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().operations.len()
    }

    /// Number of operations still waiting for their parent operation
    pub fn nested_len(&self) -> usize {
        self.state.lock().nested.values().map(Vec::len).sum()
    }

    /// Send all pending operations.
    ///
    /// The pending list is swapped out before anything is sent, so operations
    /// registered meanwhile go to the next commit. One request is sent per
    /// project; responses are checked after all requests were sent.
    pub async fn commit(&self) -> Result<()> {
        let operations = std::mem::take(&mut self.state.lock().operations);
        if operations.is_empty() {
            debug!("Nothing to commit");
            return Ok(());
        }

        let mut by_project: Vec<(String, Vec<Operation>)> = Vec::new();
        for operation in operations {
            match by_project
                .iter_mut()
                .find(|(project, _)| project == operation.project_name())
            {
                Some((_, group)) => group.push(operation),
                None => by_project.push((operation.project_name().to_string(), vec![operation])),
            }
        }

        let mut body_by_id: HashMap<String, WireOp> = HashMap::new();
        let mut results = Vec::new();
        for (project_name, group) in by_project {
            let bodies: Vec<WireOp> = group
                .iter()
                .filter_map(Operation::to_wire_operation)
                .collect();
            if bodies.is_empty() {
                debug!(project = %project_name, "Skipping project without changes");
                continue;
            }
            for body in &bodies {
                body_by_id.insert(body.id.clone(), body.clone());
            }

            info!(
                project = %project_name,
                operations = bodies.len(),
                "Committing operations"
            );
            let response = self
                .con
                .post(
                    &format!("projects/{}/operations", project_name),
                    json!({
                        "operations": bodies,
                        "canFail": false,
                    }),
                )
                .await?;
            results.push(response.data.unwrap_or(Value::Null));
        }

        for result in &results {
            check_batch_result(result, &body_by_id)?;
        }
        Ok(())
    }
}

fn check_batch_result(result: &Value, body_by_id: &HashMap<String, WireOp>) -> Result<()> {
    if result.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }

    let Some(op_results) = result.get("operations").and_then(Value::as_array) else {
        warn!(response = %result, "Batch failed without per-operation results");
        return Err(OpsError::failed_operations(format!(
            "Operation failed. Content: {}",
            result
        )));
    };

    for op_result in op_results {
        if op_result.get("success").and_then(Value::as_bool) == Some(true) {
            continue;
        }
        let operation_id = op_result
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let payload = match body_by_id.get(&operation_id) {
            Some(body) => serde_json::to_string_pretty(body)?,
            None => "<unknown operation>".to_string(),
        };
        let error = match op_result.get("error") {
            Some(Value::String(error)) => error.clone(),
            Some(Value::Null) | None => "Unknown error".to_string(),
            Some(other) => other.to_string(),
        };
        warn!(operation = %operation_id, error = %error, "Operation rejected by server");
        return Err(OpsError::FailedOperations {
            message: format!(
                "Operation \"{}\" failed with data:\n{}\nError: {}.",
                operation_id, payload, error
            ),
            operation_id: Some(operation_id),
        });
    }

    Err(OpsError::failed_operations(format!(
        "Operation failed. Content: {}",
        result
    )))
}
