// Mock server connection for testing

#![allow(dead_code)]

use async_trait::async_trait;
use pype_ops::{AnatomyPreset, Connection, Document, EntityKind, RestResponse, Result};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

/// A request the mock received
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: &'static str,
    pub path: String,
    pub body: Option<Value>,
}

/// Mock connection with canned lookups and recorded calls
#[derive(Debug, Clone, Default)]
pub struct MockConnection {
    projects: Arc<Mutex<HashMap<String, Document>>>,
    preset: Arc<Mutex<AnatomyPreset>>,
    attributes: Arc<Mutex<HashMap<String, HashSet<String>>>>,
    entities: Arc<Mutex<HashMap<String, Document>>>,
    post_responses: Arc<Mutex<VecDeque<RestResponse>>>,
    put_response: Arc<Mutex<Option<RestResponse>>>,
    delete_response: Arc<Mutex<Option<RestResponse>>>,
    call_history: Arc<Mutex<Vec<Call>>>,
    post_gate: Arc<Mutex<Option<PostGate>>>,
}

/// Holds POST requests open until released
#[derive(Debug, Clone, Default)]
pub struct PostGate {
    /// Notified when a POST reaches the gate
    pub reached: Arc<Notify>,
    /// Notify to let one waiting POST answer
    pub release: Arc<Notify>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> Arc<dyn Connection> {
        Arc::new(self.clone())
    }

    pub async fn with_project(&self, project: Value) {
        let project = into_document(project);
        let name = project["name"].as_str().unwrap_or_default().to_string();
        self.projects.lock().await.insert(name, project);
    }

    pub async fn with_preset(&self, preset: AnatomyPreset) {
        *self.preset.lock().await = preset;
    }

    pub async fn with_attributes(&self, entity_type: &str, names: &[&str]) {
        self.attributes.lock().await.insert(
            entity_type.to_string(),
            names.iter().map(|name| name.to_string()).collect(),
        );
    }

    pub async fn with_entity(&self, project: &str, kind: EntityKind, entity: Value) {
        let entity = into_document(entity);
        let id = entity["id"].as_str().unwrap_or_default().to_string();
        self.entities
            .lock()
            .await
            .insert(entity_key(project, kind, &id), entity);
    }

    /// Queue a response for the next POST; unqueued POSTs succeed
    pub async fn expect_post(&self, response: RestResponse) {
        self.post_responses.lock().await.push_back(response);
    }

    pub async fn expect_put(&self, response: RestResponse) {
        *self.put_response.lock().await = Some(response);
    }

    pub async fn expect_delete(&self, response: RestResponse) {
        *self.delete_response.lock().await = Some(response);
    }

    /// Make every following POST wait at the returned gate
    pub async fn gate_posts(&self) -> PostGate {
        let gate = PostGate::default();
        *self.post_gate.lock().await = Some(gate.clone());
        gate
    }

    pub async fn get_call_history(&self) -> Vec<Call> {
        self.call_history.lock().await.clone()
    }

    pub async fn calls_to(&self, method: &str) -> Vec<Call> {
        self.call_history
            .lock()
            .await
            .iter()
            .filter(|call| call.method == method)
            .cloned()
            .collect()
    }

    async fn record(&self, method: &'static str, path: String, body: Option<Value>) {
        self.call_history
            .lock()
            .await
            .push(Call { method, path, body });
    }
}

pub fn into_document(value: Value) -> Document {
    match value {
        Value::Object(document) => document,
        other => panic!("expected an object, got {}", other),
    }
}

fn entity_key(project: &str, kind: EntityKind, id: &str) -> String {
    format!("{}/{}/{}", project, kind.plural(), id)
}

#[async_trait]
impl Connection for MockConnection {
    async fn get_project(&self, name: &str, fields: Option<&[&str]>) -> Result<Option<Document>> {
        let fields = fields.map(|fields| json!(fields));
        self.record("GET", format!("projects/{}", name), fields)
            .await;
        Ok(self.projects.lock().await.get(name).cloned())
    }

    async fn get_project_anatomy_preset(&self, name: Option<&str>) -> Result<AnatomyPreset> {
        self.record(
            "GET",
            format!("anatomy/presets/{}", name.unwrap_or("_")),
            None,
        )
        .await;
        Ok(self.preset.lock().await.clone())
    }

    async fn get_attributes_for_type(&self, entity_type: &str) -> Result<HashSet<String>> {
        self.record("GET", format!("attributes?scope={}", entity_type), None)
            .await;
        Ok(self
            .attributes
            .lock()
            .await
            .get(entity_type)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_entity(
        &self,
        project_name: &str,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<Option<Document>> {
        let key = entity_key(project_name, kind, entity_id);
        self.record("GET", format!("projects/{}", key), None).await;
        Ok(self.entities.lock().await.get(&key).cloned())
    }

    async fn post(&self, path: &str, body: Value) -> Result<RestResponse> {
        self.record("POST", path.to_string(), Some(body)).await;
        let gate = self.post_gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }
        Ok(self
            .post_responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| RestResponse::new(200, Some(json!({"success": true})))))
    }

    async fn put(&self, path: &str, body: Value) -> Result<RestResponse> {
        self.record("PUT", path.to_string(), Some(body.clone())).await;
        let response = self
            .put_response
            .lock()
            .await
            .clone()
            .unwrap_or_else(|| RestResponse::new(201, None));

        // A created project becomes visible to later lookups
        if let Some(name) = path.strip_prefix("projects/").filter(|name| !name.contains('/')) {
            if response.status == 201 {
                let mut project = into_document(body);
                project.insert("name".to_string(), Value::String(name.to_string()));
                self.projects.lock().await.insert(name.to_string(), project);
            }
        }
        Ok(response)
    }

    async fn delete(&self, path: &str) -> Result<RestResponse> {
        self.record("DELETE", path.to_string(), None).await;
        Ok(self
            .delete_response
            .lock()
            .await
            .clone()
            .unwrap_or_else(|| RestResponse::new(204, None)))
    }
}
