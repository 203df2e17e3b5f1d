//! Project creation and deletion.

use crate::connection::{Connection, RestResponse};
use crate::error::{OpsError, Result};
use crate::types::Document;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::OnceLock;
use tracing::{info, warn};

pub const PROJECT_NAME_ALLOWED_SYMBOLS: &str = "a-zA-Z0-9_";

fn project_name_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(&format!("^[{}]+$", PROJECT_NAME_ALLOWED_SYMBOLS))
            .expect("Invalid regex pattern")
    })
}

/// Check that a project name only contains allowed symbols
pub fn validate_project_name(name: &str) -> Result<()> {
    if project_name_regex().is_match(name) {
        Ok(())
    } else {
        Err(OpsError::InvalidProjectName(name.to_string()))
    }
}

/// Reshape a list of named objects into a map keyed by their names.
fn named_list_to_map(items: Vec<Document>, what: &str) -> Document {
    let mut out = Document::new();
    for mut item in items {
        match item.remove("name") {
            Some(Value::String(name)) => {
                out.insert(name, Value::Object(item));
            }
            _ => warn!(kind = what, "Skipping preset entry without a name"),
        }
    }
    out
}

fn failure_detail(response: &RestResponse) -> String {
    response
        .detail()
        .unwrap_or_else(|| format!("Unknown details ({})", response.status))
}

/// Create a project from an anatomy preset.
///
/// The project name must be unique and contain only allowed symbols. The
/// preset (or the primary one) provides templates, roots, folder types, task
/// types and default attributes. Returns the created project document.
pub async fn create_project(
    con: &dyn Connection,
    project_name: &str,
    project_code: &str,
    library_project: bool,
    preset_name: Option<&str>,
) -> Result<Document> {
    if con.get_project(project_name, Some(&["name"][..])).await?.is_some() {
        return Err(OpsError::DuplicateProject(project_name.to_string()));
    }
    validate_project_name(project_name)?;

    let preset = con.get_project_anatomy_preset(preset_name).await?;
    let folder_types = named_list_to_map(preset.folder_types, "folder type");
    let task_types = named_list_to_map(preset.task_types, "task type");

    let response = con
        .put(
            &format!("projects/{}", project_name),
            json!({
                "code": project_code,
                "library": library_project,
                "config": {
                    "templates": preset.templates,
                    "roots": preset.roots,
                },
                "attrib": preset.attributes,
                "folderTypes": folder_types,
                "taskTypes": task_types,
            }),
        )
        .await?;
    if response.status != 201 {
        return Err(OpsError::ProjectCreationFailed {
            project: project_name.to_string(),
            detail: failure_detail(&response),
        });
    }

    info!(project = project_name, code = project_code, "Created project");
    con.get_project(project_name, None)
        .await?
        .ok_or_else(|| OpsError::ProjectNotFound(project_name.to_string()))
}

/// Delete an existing project
pub async fn delete_project(con: &dyn Connection, project_name: &str) -> Result<()> {
    if con.get_project(project_name, Some(&["name"][..])).await?.is_none() {
        return Err(OpsError::ProjectNotFound(project_name.to_string()));
    }

    let response = con.delete(&format!("projects/{}", project_name)).await?;
    if response.status != 204 {
        return Err(OpsError::ProjectDeletionFailed {
            project: project_name.to_string(),
            detail: failure_detail(&response),
        });
    }
    info!(project = project_name, "Deleted project");
    Ok(())
}
