//! Conversion of legacy document shapes into server entity shapes.
//!
//! Every entity kind resolves once into a [`CreateAdapter`] or
//! [`UpdateAdapter`] holding the conversion function for that kind. The
//! adapters are pure; lookups they depend on (project document, attribute
//! names, current entity) are fetched by the caller and passed in a context.

use crate::diff::{DiffMap, FieldValue};
use crate::error::{OpsError, Result};
use crate::id::validate_or_accept;
use crate::types::{Document, EntityKind};
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

/// Legacy data keys that have no counterpart on the server.
const BOOKKEEPING_KEYS: &[&str] = &[
    "visualParent",
    "parents",
    "thumbnail_id",
    "inputLinks",
    "avalon_mongo_id",
    "tasks",
];

/// Top-level legacy keys that never reach the server.
const IMMUTABLE_KEYS: &[&str] = &["_id", "type", "schema"];

/// Lookups available to create conversions.
#[derive(Debug, Clone, Copy)]
pub struct CreateContext<'a> {
    pub project: Option<&'a Document>,
    pub attributes: &'a HashSet<String>,
}

/// Result of a create conversion.
#[derive(Debug, Clone, Default)]
pub struct Converted {
    /// Payload in server shape
    pub payload: Document,
    /// Tasks embedded in a folder payload, keyed by task name
    pub tasks: Vec<(String, Document)>,
}

type CreateFn = fn(Document, &CreateContext<'_>) -> Result<Converted>;

/// Create conversion for one entity kind.
#[derive(Debug, Clone, Copy)]
pub struct CreateAdapter {
    target: EntityKind,
    needs_project: bool,
    convert: CreateFn,
}

impl CreateAdapter {
    /// Resolve the adapter of a kind
    pub fn for_kind(kind: EntityKind) -> Result<Self> {
        let (needs_project, convert): (bool, CreateFn) = match kind {
            EntityKind::Project => {
                return Err(OpsError::unsupported(
                    "Project cannot be created using operations",
                ));
            }
            EntityKind::HeroVersion => {
                return Err(OpsError::unsupported(
                    "Hero version cannot be created using operations",
                ));
            }
            EntityKind::Asset | EntityKind::Folder => (true, convert_create_folder),
            EntityKind::Task => (true, convert_create_task),
            EntityKind::Subset => (false, convert_create_subset),
            EntityKind::Version => (false, convert_create_version),
            EntityKind::Representation => (false, convert_create_representation),
            EntityKind::Thumbnail | EntityKind::WorkfileInfo => {
                return Err(unhandled(kind));
            }
        };
        Ok(Self {
            target: kind.server_kind(),
            needs_project,
            convert,
        })
    }

    /// Kind the converted payload is sent as
    pub fn target(&self) -> EntityKind {
        self.target
    }

    /// Whether the conversion needs the project document
    pub fn needs_project(&self) -> bool {
        self.needs_project
    }

    pub fn convert(&self, payload: Document, ctx: &CreateContext<'_>) -> Result<Converted> {
        (self.convert)(payload, ctx)
    }
}

/// Lookups available to update conversions.
#[derive(Debug, Clone, Copy)]
pub struct UpdateContext<'a> {
    /// Current entity in server shape, fetched only when the diff touches data
    pub current: Option<&'a Document>,
    pub attributes: &'a HashSet<String>,
}

/// Field mapping of an update conversion.
#[derive(Debug)]
struct UpdateShape {
    name_field: &'static str,
    parent_field: &'static str,
    /// Legacy `data` keys promoted to top-level server fields
    promoted: &'static [(&'static str, &'static str)],
    /// Top-level legacy `context` lives in server `data.context`
    context_in_data: bool,
}

const SUBSET_SHAPE: UpdateShape = UpdateShape {
    name_field: "name",
    parent_field: "folderId",
    promoted: &[("family", "family")],
    context_in_data: false,
};

const VERSION_SHAPE: UpdateShape = UpdateShape {
    name_field: "version",
    parent_field: "subsetId",
    promoted: &[("author", "author"), ("thumbnail_id", "thumbnailId")],
    context_in_data: false,
};

const REPRESENTATION_SHAPE: UpdateShape = UpdateShape {
    name_field: "name",
    parent_field: "versionId",
    promoted: &[],
    context_in_data: true,
};

/// Update conversion for one entity kind.
#[derive(Debug, Clone, Copy)]
pub struct UpdateAdapter {
    target: EntityKind,
    shape: &'static UpdateShape,
}

impl UpdateAdapter {
    /// Resolve the adapter of a kind
    pub fn for_kind(kind: EntityKind) -> Result<Self> {
        let shape = match kind {
            EntityKind::Project => {
                return Err(OpsError::unsupported(
                    "Project cannot be updated using operations",
                ));
            }
            EntityKind::Asset | EntityKind::Folder => {
                return Err(OpsError::not_implemented(
                    "Update operations for assets are not implemented yet",
                ));
            }
            EntityKind::Subset => &SUBSET_SHAPE,
            EntityKind::Version => &VERSION_SHAPE,
            EntityKind::Representation => &REPRESENTATION_SHAPE,
            EntityKind::Task
            | EntityKind::HeroVersion
            | EntityKind::Thumbnail
            | EntityKind::WorkfileInfo => return Err(unhandled(kind)),
        };
        Ok(Self {
            target: kind.server_kind(),
            shape,
        })
    }

    pub fn target(&self) -> EntityKind {
        self.target
    }

    /// Whether converting `changes` needs the current server entity
    pub fn needs_current(&self, changes: &DiffMap) -> bool {
        changes.contains_key("data") || (self.shape.context_in_data && changes.contains_key("context"))
    }

    pub fn convert(&self, changes: DiffMap, ctx: &UpdateContext<'_>) -> Result<DiffMap> {
        convert_update(self.shape, changes, ctx)
    }
}

fn unhandled(kind: EntityKind) -> OpsError {
    OpsError::unsupported(format!("Unhandled entity type \"{}\"", kind))
}

fn take_string(payload: &mut Document, key: &str, kind: EntityKind) -> Result<String> {
    match payload.remove(key) {
        Some(Value::String(value)) => Ok(value),
        _ => Err(OpsError::invalid_payload(format!(
            "{} payload is missing string field \"{}\"",
            kind, key
        ))),
    }
}

fn take_object(payload: &mut Document, key: &str) -> Document {
    match payload.remove(key) {
        Some(Value::Object(map)) => map,
        _ => Document::new(),
    }
}

/// Move the legacy `_id` (or an already present `id`) into the server `id`.
fn take_entity_id(payload: &mut Document) -> Result<Option<Value>> {
    let raw = payload.remove("_id").or_else(|| payload.remove("id"));
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(Value::String(validate_or_accept(&id)?.into_string()))),
        Some(other) => Err(OpsError::invalid_identifier(
            other.to_string(),
            "identifier must be a string",
        )),
    }
}

/// Split legacy data into server attributes and free-form data.
fn split_attributes(data: Document, attributes: &HashSet<String>) -> (Document, Document) {
    let mut attrib = Document::new();
    let mut rest = Document::new();
    for (key, value) in data {
        if BOOKKEEPING_KEYS.contains(&key.as_str()) {
            continue;
        }
        if attributes.contains(&key) {
            if !value.is_null() {
                attrib.insert(key, value);
            }
        } else {
            rest.insert(key, value);
        }
    }
    (attrib, rest)
}

fn insert_non_empty(payload: &mut Document, key: &str, map: Document) {
    if !map.is_empty() {
        payload.insert(key.to_string(), Value::Object(map));
    }
}

fn convert_create_folder(mut payload: Document, ctx: &CreateContext<'_>) -> Result<Converted> {
    let mut folder = Document::new();
    if let Some(id) = take_entity_id(&mut payload)? {
        folder.insert("id".into(), id);
    }
    folder.insert("name".into(), Value::String(take_string(&mut payload, "name", EntityKind::Folder)?));

    let mut data = take_object(&mut payload, "data");
    let parent_id = data.remove("visualParent").unwrap_or(Value::Null);
    let parent_id = match parent_id {
        Value::Null => parent_id,
        Value::String(id) => Value::String(validate_or_accept(&id)?.into_string()),
        other => {
            return Err(OpsError::invalid_identifier(
                other.to_string(),
                "visualParent must be a string",
            ));
        }
    };
    folder.insert("parentId".into(), parent_id);

    let folder_type = data.remove("folderType").or_else(|| payload.remove("folderType"));
    if let Some(folder_type) = folder_type.as_ref().and_then(Value::as_str) {
        let known = ctx
            .project
            .map(|project| named_types(project, "folderTypes"))
            .unwrap_or_default();
        if known.is_empty() || known.iter().any(|t| t == folder_type) {
            folder.insert("folderType".into(), Value::String(folder_type.to_string()));
        } else {
            warn!(folder_type, "Folder type is not defined on project, leaving it unset");
        }
    }

    let tasks = match data.remove("tasks") {
        Some(Value::Object(tasks)) => tasks
            .into_iter()
            .map(|(name, task)| {
                let task = match task {
                    Value::Object(task) => task,
                    _ => Document::new(),
                };
                (name, task)
            })
            .collect(),
        _ => Vec::new(),
    };

    let (attrib, data) = split_attributes(data, ctx.attributes);
    insert_non_empty(&mut folder, "attrib", attrib);
    insert_non_empty(&mut folder, "data", data);
    Ok(Converted {
        payload: folder,
        tasks,
    })
}

/// Names of the folder or task types a project defines, in definition order.
fn named_types(project: &Document, key: &str) -> Vec<String> {
    match project.get(key) {
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(|t| t.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect(),
        Some(Value::Object(types)) => types.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

fn convert_create_task(mut payload: Document, ctx: &CreateContext<'_>) -> Result<Converted> {
    let project = ctx
        .project
        .ok_or_else(|| OpsError::invalid_payload("Task creation requires the project document"))?;
    let project_name = project.get("name").and_then(Value::as_str).unwrap_or_default();
    let task_types = named_types(project, "taskTypes");
    let Some(first_type) = task_types.first() else {
        return Err(OpsError::invalid_payload(format!(
            "Project \"{}\" does not have any task types",
            project_name
        )));
    };

    let requested = payload
        .remove("taskType")
        .or_else(|| payload.remove("type"))
        .and_then(|value| value.as_str().map(str::to_string));
    let task_type = match requested {
        Some(task_type) if task_types.contains(&task_type) => task_type,
        other => {
            warn!(
                project = project_name,
                requested = ?other,
                fallback = %first_type,
                "Unknown task type, using first project task type"
            );
            first_type.clone()
        }
    };

    let mut task = Document::new();
    if let Some(id) = take_entity_id(&mut payload)? {
        task.insert("id".into(), id);
    }
    task.insert("name".into(), Value::String(take_string(&mut payload, "name", EntityKind::Task)?));
    task.insert("taskType".into(), Value::String(task_type));
    let folder_id = take_string(&mut payload, "folderId", EntityKind::Task)?;
    task.insert("folderId".into(), Value::String(validate_or_accept(&folder_id)?.into_string()));

    let data = take_object(&mut payload, "data");
    let (attrib, data) = split_attributes(data, ctx.attributes);
    insert_non_empty(&mut task, "attrib", attrib);
    insert_non_empty(&mut task, "data", data);
    Ok(Converted {
        payload: task,
        tasks: Vec::new(),
    })
}

fn convert_create_subset(mut payload: Document, ctx: &CreateContext<'_>) -> Result<Converted> {
    let mut subset = Document::new();
    if let Some(id) = take_entity_id(&mut payload)? {
        subset.insert("id".into(), id);
    }
    subset.insert("name".into(), Value::String(take_string(&mut payload, "name", EntityKind::Subset)?));

    let mut data = take_object(&mut payload, "data");
    let families = data.remove("families");
    let family = data.remove("family").filter(|f| !f.is_null()).or_else(|| {
        families
            .as_ref()
            .and_then(Value::as_array)
            .and_then(|families| families.first().cloned())
    });
    if let Some(family) = family {
        subset.insert("family".into(), family);
    }

    let parent = take_string(&mut payload, "parent", EntityKind::Subset)?;
    subset.insert("folderId".into(), Value::String(validate_or_accept(&parent)?.into_string()));

    let (attrib, data) = split_attributes(data, ctx.attributes);
    insert_non_empty(&mut subset, "attrib", attrib);
    insert_non_empty(&mut subset, "data", data);
    Ok(Converted {
        payload: subset,
        tasks: Vec::new(),
    })
}

fn convert_create_version(mut payload: Document, ctx: &CreateContext<'_>) -> Result<Converted> {
    let mut version = Document::new();
    if let Some(id) = take_entity_id(&mut payload)? {
        version.insert("id".into(), id);
    }
    match payload.remove("name") {
        Some(number @ Value::Number(_)) => {
            version.insert("version".into(), number);
        }
        _ => {
            return Err(OpsError::invalid_payload(
                "version payload is missing numeric field \"name\"",
            ));
        }
    }

    let parent = take_string(&mut payload, "parent", EntityKind::Version)?;
    version.insert("subsetId".into(), Value::String(validate_or_accept(&parent)?.into_string()));

    let mut data = take_object(&mut payload, "data");
    for (legacy, target) in VERSION_SHAPE.promoted {
        if let Some(value) = data.remove(*legacy).filter(|v| !v.is_null()) {
            version.insert((*target).to_string(), value);
        }
    }

    let (attrib, data) = split_attributes(data, ctx.attributes);
    insert_non_empty(&mut version, "attrib", attrib);
    insert_non_empty(&mut version, "data", data);
    Ok(Converted {
        payload: version,
        tasks: Vec::new(),
    })
}

/// Convert legacy representation files (`_id`, `path`, `size`, `hash`, `sites`).
fn convert_files(files: Value) -> Value {
    let Value::Array(files) = files else {
        return Value::Array(Vec::new());
    };
    Value::Array(
        files
            .into_iter()
            .map(|file| {
                let Value::Object(mut file) = file else {
                    return file;
                };
                let mut converted = Document::new();
                if let Some(id) = file.remove("_id").or_else(|| file.remove("id")) {
                    converted.insert("id".into(), id);
                }
                for key in ["path", "size", "hash"] {
                    if let Some(value) = file.remove(key) {
                        converted.insert(key.to_string(), value);
                    }
                }
                Value::Object(converted)
            })
            .collect(),
    )
}

fn convert_create_representation(mut payload: Document, ctx: &CreateContext<'_>) -> Result<Converted> {
    let mut repre = Document::new();
    if let Some(id) = take_entity_id(&mut payload)? {
        repre.insert("id".into(), id);
    }
    repre.insert(
        "name".into(),
        Value::String(take_string(&mut payload, "name", EntityKind::Representation)?),
    );
    let parent = take_string(&mut payload, "parent", EntityKind::Representation)?;
    repre.insert("versionId".into(), Value::String(validate_or_accept(&parent)?.into_string()));
    repre.insert("files".into(), convert_files(payload.remove("files").unwrap_or(Value::Null)));

    let data = take_object(&mut payload, "data");
    let context = payload.remove("context").unwrap_or_else(|| Value::Object(Document::new()));
    let (attrib, mut data) = split_attributes(data, ctx.attributes);
    data.insert("context".into(), context);
    insert_non_empty(&mut repre, "attrib", attrib);
    repre.insert("data".into(), Value::Object(data));
    Ok(Converted {
        payload: repre,
        tasks: Vec::new(),
    })
}

fn current_map<'a>(current: Option<&'a Document>, key: &str) -> Option<&'a Document> {
    current.and_then(|c| c.get(key)).and_then(Value::as_object)
}

fn convert_update(shape: &UpdateShape, changes: DiffMap, ctx: &UpdateContext<'_>) -> Result<DiffMap> {
    let mut converted = DiffMap::new();
    let mut data_change: Option<Document> = None;
    let mut context_change: Option<Value> = None;

    for (key, change) in changes {
        match key.as_str() {
            k if IMMUTABLE_KEYS.contains(&k) => {}
            "name" => {
                converted.insert(shape.name_field.to_string(), change);
            }
            "parent" => {
                let change = match change {
                    FieldValue::Set(Value::String(id)) => {
                        FieldValue::Set(Value::String(validate_or_accept(&id)?.into_string()))
                    }
                    other => other,
                };
                converted.insert(shape.parent_field.to_string(), change);
            }
            "data" => {
                let data = match change {
                    FieldValue::Set(Value::Object(map)) => map,
                    FieldValue::Set(Value::Null) | FieldValue::Remove => Document::new(),
                    FieldValue::Set(other) => {
                        return Err(OpsError::invalid_payload(format!(
                            "update of \"data\" must be an object, got {}",
                            other
                        )));
                    }
                };
                data_change = Some(data);
            }
            "context" if shape.context_in_data => {
                context_change = Some(change.into_wire());
            }
            "files" if shape.context_in_data => {
                let files = change.into_wire();
                converted.insert("files".into(), FieldValue::Set(convert_files(files)));
            }
            _ => {
                converted.insert(key, change);
            }
        }
    }

    if data_change.is_none() && context_change.is_none() {
        return Ok(converted);
    }

    let current_attrib = current_map(ctx.current, "attrib");
    let current_data = current_map(ctx.current, "data");

    let mut new_data = match data_change {
        Some(mut data) => {
            for (legacy, target) in shape.promoted {
                match data.remove(*legacy) {
                    Some(value) if !value.is_null() => {
                        converted.insert((*target).to_string(), FieldValue::Set(value));
                    }
                    _ => {
                        let had_value = ctx
                            .current
                            .and_then(|c| c.get(*target))
                            .is_some_and(|v| !v.is_null());
                        if had_value {
                            converted.insert((*target).to_string(), FieldValue::Remove);
                        }
                    }
                }
            }

            let (attrib, data) = split_attributes(data, ctx.attributes);
            let mut attrib_update = attrib;
            if let Some(current_attrib) = current_attrib {
                for key in current_attrib.keys() {
                    if ctx.attributes.contains(key) && !attrib_update.contains_key(key) {
                        attrib_update.insert(key.clone(), Value::Null);
                    }
                }
            }
            if !attrib_update.is_empty() {
                converted.insert("attrib".into(), FieldValue::Set(Value::Object(attrib_update)));
            }
            data
        }
        None => current_data.cloned().unwrap_or_default(),
    };

    if shape.context_in_data {
        let context = match context_change {
            Some(context) => context,
            None => current_data
                .and_then(|d| d.get("context"))
                .cloned()
                .unwrap_or(Value::Null),
        };
        if !context.is_null() {
            new_data.insert("context".into(), context);
        }
    }

    if let Some(current_data) = current_data {
        for key in current_data.keys() {
            if !new_data.contains_key(key) {
                new_data.insert(key.clone(), Value::Null);
            }
        }
    }
    converted.insert("data".into(), FieldValue::Set(Value::Object(new_data)));
    Ok(converted)
}
