//! Shared types: entity kinds, operation kinds and documents.

use crate::error::OpsError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical in-memory representation of an entity.
pub type Document = serde_json::Map<String, serde_json::Value>;

pub const CURRENT_PROJECT_SCHEMA: &str = "openpype:project-3.0";
pub const CURRENT_ASSET_DOC_SCHEMA: &str = "openpype:asset-3.0";
pub const CURRENT_SUBSET_SCHEMA: &str = "openpype:subset-3.0";
pub const CURRENT_VERSION_SCHEMA: &str = "openpype:version-3.0";
pub const CURRENT_HERO_VERSION_SCHEMA: &str = "openpype:hero_version-1.0";
pub const CURRENT_REPRESENTATION_SCHEMA: &str = "openpype:representation-2.0";
pub const CURRENT_THUMBNAIL_SCHEMA: &str = "openpype:thumbnail-1.0";
pub const CURRENT_WORKFILE_INFO_SCHEMA: &str = "openpype:workfile-1.0";

/// Kind of an entity in the production hierarchy.
///
/// `Asset` is the legacy name of `Folder`; both parse, and operations
/// targeting the server rename it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntityKind {
    Project,
    Asset,
    Folder,
    Task,
    Subset,
    Version,
    HeroVersion,
    Representation,
    Thumbnail,
    WorkfileInfo,
}

impl EntityKind {
    pub const ALL: [EntityKind; 10] = [
        Self::Project,
        Self::Asset,
        Self::Folder,
        Self::Task,
        Self::Subset,
        Self::Version,
        Self::HeroVersion,
        Self::Representation,
        Self::Thumbnail,
        Self::WorkfileInfo,
    ];

    /// Name used in documents and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Asset => "asset",
            Self::Folder => "folder",
            Self::Task => "task",
            Self::Subset => "subset",
            Self::Version => "version",
            Self::HeroVersion => "hero_version",
            Self::Representation => "representation",
            Self::Thumbnail => "thumbnail",
            Self::WorkfileInfo => "workfile",
        }
    }

    /// Kind as the server knows it (legacy names resolved)
    pub fn server_kind(&self) -> Self {
        match self {
            Self::Asset => Self::Folder,
            other => *other,
        }
    }

    /// Plural path segment of the kind's REST collection
    pub fn plural(&self) -> &'static str {
        match self.server_kind() {
            Self::Project => "projects",
            Self::Folder | Self::Asset => "folders",
            Self::Task => "tasks",
            Self::Subset => "subsets",
            Self::Version => "versions",
            Self::HeroVersion => "hero_versions",
            Self::Representation => "representations",
            Self::Thumbnail => "thumbnails",
            Self::WorkfileInfo => "workfiles",
        }
    }

    /// Schema tag stamped on newly built documents of this kind
    pub fn current_schema(&self) -> Option<&'static str> {
        match self {
            Self::Project => Some(CURRENT_PROJECT_SCHEMA),
            Self::Asset | Self::Folder => Some(CURRENT_ASSET_DOC_SCHEMA),
            Self::Subset => Some(CURRENT_SUBSET_SCHEMA),
            Self::Version => Some(CURRENT_VERSION_SCHEMA),
            Self::HeroVersion => Some(CURRENT_HERO_VERSION_SCHEMA),
            Self::Representation => Some(CURRENT_REPRESENTATION_SCHEMA),
            Self::Thumbnail => Some(CURRENT_THUMBNAIL_SCHEMA),
            Self::WorkfileInfo => Some(CURRENT_WORKFILE_INFO_SCHEMA),
            Self::Task => None,
        }
    }

    /// Kind of the entity referenced by this kind's `parent` field
    pub fn parent_kind(&self) -> Option<Self> {
        match self {
            Self::Project | Self::Thumbnail => None,
            Self::Asset | Self::Folder => Some(Self::Project),
            Self::Task | Self::Subset | Self::WorkfileInfo => Some(Self::Asset),
            Self::Version | Self::HeroVersion => Some(Self::Subset),
            Self::Representation => Some(Self::Version),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(Self::Project),
            "asset" => Ok(Self::Asset),
            "folder" => Ok(Self::Folder),
            "task" => Ok(Self::Task),
            "subset" => Ok(Self::Subset),
            "version" => Ok(Self::Version),
            "hero_version" => Ok(Self::HeroVersion),
            "representation" => Ok(Self::Representation),
            "thumbnail" => Ok(Self::Thumbnail),
            "workfile" | "workfile_info" => Ok(Self::WorkfileInfo),
            other => Err(OpsError::unsupported(format!(
                "Unhandled entity type \"{}\"",
                other
            ))),
        }
    }
}

impl TryFrom<String> for EntityKind {
    type Error = OpsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityKind> for String {
    fn from(kind: EntityKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Kind of mutation an operation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
