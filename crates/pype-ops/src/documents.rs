//! Builders for canonical entity documents.
//!
//! Each builder stamps the identifier, entity-kind tag, schema tag and parent
//! linkage of one entity kind. Payload maps are taken by value, so a built
//! document never shares state with the caller. Only identifier validation
//! can fail.

use crate::error::Result;
use crate::id::create_or_accept;
use crate::types::{Document, EntityKind};
use serde_json::{Value, json};

fn skeleton(kind: EntityKind, entity_id: Option<&str>) -> Result<Document> {
    let mut doc = Document::new();
    doc.insert("_id".into(), Value::String(create_or_accept(entity_id)?.into_string()));
    doc.insert("type".into(), Value::String(kind.as_str().to_string()));
    if let Some(schema) = kind.current_schema() {
        doc.insert("schema".into(), Value::String(schema.to_string()));
    }
    Ok(doc)
}

fn parent_ref(id: &str) -> Result<Value> {
    Ok(Value::String(create_or_accept(Some(id))?.into_string()))
}

/// Create skeleton of a project document.
///
/// `code` is stored into `data.code`; `config` carries roots, templates and
/// other anatomy data.
pub fn new_project_document(
    name: &str,
    code: &str,
    config: Value,
    data: Option<Document>,
    entity_id: Option<&str>,
) -> Result<Document> {
    let mut data = data.unwrap_or_default();
    data.insert("code".into(), Value::String(code.to_string()));

    let mut doc = skeleton(EntityKind::Project, entity_id)?;
    doc.insert("name".into(), Value::String(name.to_string()));
    doc.insert("data".into(), Value::Object(data));
    doc.insert("config".into(), config);
    Ok(doc)
}

/// Create skeleton of an asset document.
///
/// `parent_id` is the id of the parent asset (stored as `data.visualParent`),
/// `parents` the names of all ancestor assets.
pub fn new_asset_document(
    name: &str,
    project_id: &str,
    parent_id: Option<&str>,
    parents: Vec<String>,
    data: Option<Document>,
    entity_id: Option<&str>,
) -> Result<Document> {
    let mut data = data.unwrap_or_default();
    let visual_parent = match parent_id {
        Some(parent_id) => parent_ref(parent_id)?,
        None => Value::Null,
    };
    data.insert("visualParent".into(), visual_parent);
    data.insert("parents".into(), json!(parents));

    let mut doc = skeleton(EntityKind::Asset, entity_id)?;
    doc.insert("name".into(), Value::String(name.to_string()));
    doc.insert("parent".into(), Value::String(project_id.to_string()));
    doc.insert("data".into(), Value::Object(data));
    Ok(doc)
}

/// Create skeleton of a subset document.
pub fn new_subset_document(
    name: &str,
    family: &str,
    asset_id: &str,
    data: Option<Document>,
    entity_id: Option<&str>,
) -> Result<Document> {
    let mut data = data.unwrap_or_default();
    data.insert("family".into(), Value::String(family.to_string()));

    let mut doc = skeleton(EntityKind::Subset, entity_id)?;
    doc.insert("name".into(), Value::String(name.to_string()));
    doc.insert("data".into(), Value::Object(data));
    doc.insert("parent".into(), parent_ref(asset_id)?);
    Ok(doc)
}

/// Create skeleton of a version document. `version` is unique under the subset.
pub fn new_version_document(
    version: i64,
    subset_id: &str,
    data: Option<Document>,
    entity_id: Option<&str>,
) -> Result<Document> {
    let mut doc = skeleton(EntityKind::Version, entity_id)?;
    doc.insert("name".into(), json!(version));
    doc.insert("parent".into(), parent_ref(subset_id)?);
    doc.insert("data".into(), Value::Object(data.unwrap_or_default()));
    Ok(doc)
}

/// Create skeleton of a hero version document pointing at `version_id`.
pub fn new_hero_version_document(
    version_id: &str,
    subset_id: &str,
    data: Option<Document>,
    entity_id: Option<&str>,
) -> Result<Document> {
    let mut doc = skeleton(EntityKind::HeroVersion, entity_id)?;
    doc.insert("version_id".into(), parent_ref(version_id)?);
    doc.insert("parent".into(), parent_ref(subset_id)?);
    doc.insert("data".into(), Value::Object(data.unwrap_or_default()));
    Ok(doc)
}

/// Create skeleton of a representation document.
///
/// `context` is imprinted as a top-level shortcut used to fill templates.
pub fn new_representation_document(
    name: &str,
    version_id: &str,
    context: Document,
    data: Option<Document>,
    entity_id: Option<&str>,
) -> Result<Document> {
    let mut doc = skeleton(EntityKind::Representation, entity_id)?;
    doc.insert("parent".into(), parent_ref(version_id)?);
    doc.insert("name".into(), Value::String(name.to_string()));
    doc.insert("data".into(), Value::Object(data.unwrap_or_default()));
    doc.insert("context".into(), Value::Object(context));
    Ok(doc)
}

/// Create skeleton of a thumbnail document.
pub fn new_thumbnail_document(data: Option<Document>, entity_id: Option<&str>) -> Result<Document> {
    let mut doc = skeleton(EntityKind::Thumbnail, entity_id)?;
    doc.insert("data".into(), Value::Object(data.unwrap_or_default()));
    Ok(doc)
}

/// Create skeleton of a workfile info document.
///
/// Workfile documents are used primarily for artist notes; `files` are
/// rootless paths related to the workfile.
pub fn new_workfile_info_document(
    filename: &str,
    asset_id: &str,
    task_name: &str,
    files: Vec<String>,
    data: Option<Document>,
    entity_id: Option<&str>,
) -> Result<Document> {
    let mut doc = skeleton(EntityKind::WorkfileInfo, entity_id)?;
    doc.insert("parent".into(), parent_ref(asset_id)?);
    doc.insert("task_name".into(), Value::String(task_name.to_string()));
    doc.insert("filename".into(), Value::String(filename.to_string()));
    doc.insert("data".into(), Value::Object(data.unwrap_or_default()));
    doc.insert("files".into(), json!(files));
    Ok(doc)
}
