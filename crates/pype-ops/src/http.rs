//! REST connection to the server over HTTP.

use crate::config::ClientConfig;
use crate::connection::{AnatomyPreset, Connection, RestResponse};
use crate::error::{OpsError, Result};
use crate::types::{Document, EntityKind};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

const API_KEY_HEADER: &str = "x-api-key";

/// [`Connection`] backed by the server REST API
#[derive(Clone)]
pub struct HttpConnection {
    client: HttpClient,
    base_url: String,
}

impl HttpConnection {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.server.api_key {
            let mut value = HeaderValue::from_str(api_key)
                .map_err(|e| OpsError::config(format!("Invalid api key: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(API_KEY_HEADER, value);
        }

        let client = HttpClient::builder()
            .timeout(Duration::from_secs(config.server.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/api/", config.server.url.trim_end_matches('/')),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET a JSON document, `None` on 404
    async fn get_optional(&self, path: &str, query: &[(&str, String)]) -> Result<Option<Value>> {
        let url = self.url(path);
        debug!("GET {}", url);

        let response = self.client.get(&url).query(query).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::into_rest_response(response).await?;
        if !response.is_success() {
            return Err(OpsError::connection(format!(
                "GET {} failed with status {}: {}",
                path,
                response.status,
                response
                    .detail()
                    .unwrap_or_else(|| "Unknown details".to_string())
            )));
        }
        Ok(response.data)
    }

    async fn get_required(&self, path: &str) -> Result<Value> {
        self.get_optional(path, &[])
            .await?
            .ok_or_else(|| OpsError::connection(format!("GET {} returned 404", path)))
    }

    async fn into_rest_response(response: Response) -> Result<RestResponse> {
        let status = response.status().as_u16();
        let text = response.text().await?;
        let data = if text.trim().is_empty() {
            None
        } else {
            match serde_json::from_str(&text) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(status, "Response body is not JSON: {}", e);
                    Some(Value::String(text))
                }
            }
        };
        Ok(RestResponse::new(status, data))
    }
}

fn into_document(value: Value, what: &str) -> Result<Document> {
    match value {
        Value::Object(document) => Ok(document),
        other => Err(OpsError::connection(format!(
            "Expected {} to be an object, got {}",
            what, other
        ))),
    }
}

/// Names of attributes whose scope contains the entity type.
///
/// Accepts both `{"attributes": [...]}` and a bare list.
fn attribute_names(value: &Value, entity_type: &str) -> HashSet<String> {
    let items = value
        .get("attributes")
        .unwrap_or(value)
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default();

    items
        .iter()
        .filter(|attr| {
            attr.get("scope")
                .and_then(Value::as_array)
                .is_some_and(|scope| scope.iter().any(|s| s.as_str() == Some(entity_type)))
        })
        .filter_map(|attr| attr.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl Connection for HttpConnection {
    async fn get_project(&self, name: &str, fields: Option<&[&str]>) -> Result<Option<Document>> {
        let query: Vec<(&str, String)> = fields
            .map(|fields| vec![("fields", fields.join(","))])
            .unwrap_or_default();
        self.get_optional(&format!("projects/{}", name), &query)
            .await?
            .map(|value| into_document(value, "project"))
            .transpose()
    }

    async fn get_project_anatomy_preset(&self, name: Option<&str>) -> Result<AnatomyPreset> {
        let preset_name = match name {
            Some(name) => name.to_string(),
            None => {
                let presets = self.get_required("anatomy/presets").await?;
                presets
                    .get("presets")
                    .and_then(Value::as_array)
                    .and_then(|presets| {
                        presets.iter().find(|preset| {
                            preset.get("primary").and_then(Value::as_bool) == Some(true)
                        })
                    })
                    .and_then(|preset| preset.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("_")
                    .to_string()
            }
        };
        debug!(preset = %preset_name, "Fetching anatomy preset");
        let preset = self
            .get_required(&format!("anatomy/presets/{}", preset_name))
            .await?;
        Ok(serde_json::from_value(preset)?)
    }

    async fn get_attributes_for_type(&self, entity_type: &str) -> Result<HashSet<String>> {
        let attributes = self.get_required("attributes").await?;
        Ok(attribute_names(&attributes, entity_type))
    }

    async fn get_entity(
        &self,
        project_name: &str,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<Option<Document>> {
        let path = format!("projects/{}/{}/{}", project_name, kind.plural(), entity_id);
        self.get_optional(&path, &[])
            .await?
            .map(|value| into_document(value, kind.as_str()))
            .transpose()
    }

    async fn post(&self, path: &str, body: Value) -> Result<RestResponse> {
        let url = self.url(path);
        debug!("POST {}", url);
        let response = self.client.post(&url).json(&body).send().await?;
        Self::into_rest_response(response).await
    }

    async fn put(&self, path: &str, body: Value) -> Result<RestResponse> {
        let url = self.url(path);
        debug!("PUT {}", url);
        let response = self.client.put(&url).json(&body).send().await?;
        Self::into_rest_response(response).await
    }

    async fn delete(&self, path: &str) -> Result<RestResponse> {
        let url = self.url(path);
        debug!("DELETE {}", url);
        let response = self.client.delete(&url).send().await?;
        Self::into_rest_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_url() {
        let mut config = ClientConfig::default();
        config.server.url = "https://ayon.example.com/".to_string();
        config.server.api_key = Some("secret".to_string());
        let con = HttpConnection::new(&config).unwrap();
        assert_eq!(con.base_url(), "https://ayon.example.com/api/");
        assert_eq!(
            con.url("/projects/demo"),
            "https://ayon.example.com/api/projects/demo"
        );
    }

    #[test]
    fn test_attribute_names_by_scope() {
        let response = json!({"attributes": [
            {"name": "fps", "scope": ["project", "folder", "version"]},
            {"name": "frameStart", "scope": ["folder"]},
            {"name": "comment", "scope": ["version"]},
            {"scope": ["folder"]}
        ]});
        let names = attribute_names(&response, "folder");
        assert_eq!(names.len(), 2);
        assert!(names.contains("fps"));
        assert!(names.contains("frameStart"));

        let bare = json!([{"name": "fps", "scope": ["subset"]}]);
        assert!(attribute_names(&bare, "subset").contains("fps"));
    }

    #[test]
    fn test_into_document_rejects_non_objects() {
        assert!(into_document(json!({"name": "demo"}), "project").is_ok());
        assert!(into_document(json!([1, 2]), "project").is_err());
    }
}
