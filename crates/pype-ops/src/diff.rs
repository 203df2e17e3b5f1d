//! Shallow update diffs between two documents.
//!
//! Only top-level keys are compared. Nested values are compared as whole
//! values, so a single differing nested key replaces the whole top-level value.

use crate::types::Document;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Value of a field in an update.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Set the field to the value
    Set(Value),
    /// Remove the field from the stored entity
    Remove,
}

impl FieldValue {
    /// Representation sent to the server, where `null` removes a field
    pub fn into_wire(self) -> Value {
        match self {
            Self::Set(value) => value,
            Self::Remove => Value::Null,
        }
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, Self::Remove)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Set(value) => value.serialize(serializer),
            Self::Remove => serializer.serialize_none(),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Set(value)
    }
}

/// Changes keyed by top-level field name.
pub type DiffMap = BTreeMap<String, FieldValue>;

/// Compare two documents and prepare update data.
///
/// Every field of `new` missing from or different in `old` is set. With
/// `replace`, fields of `old` missing from `new` are removed. An empty
/// result means the documents are identical at the top level.
pub fn diff(old: &Document, new: &Document, replace: bool) -> DiffMap {
    let mut changes = DiffMap::new();
    for (key, value) in new {
        if old.get(key) != Some(value) {
            changes.insert(key.clone(), FieldValue::Set(value.clone()));
        }
    }

    if replace {
        for key in old.keys() {
            if !new.contains_key(key) {
                changes.insert(key.clone(), FieldValue::Remove);
            }
        }
    }
    changes
}

/// Apply update data to a document, returning the updated copy.
pub fn apply_diff(old: &Document, changes: &DiffMap) -> Document {
    let mut doc = old.clone();
    for (key, change) in changes {
        match change {
            FieldValue::Set(value) => {
                doc.insert(key.clone(), value.clone());
            }
            FieldValue::Remove => {
                doc.remove(key);
            }
        }
    }
    doc
}

/// Convert a diff into its wire map, translating removals to `null`.
pub fn to_wire_map(changes: DiffMap) -> serde_json::Map<String, Value> {
    changes
        .into_iter()
        .map(|(key, change)| (key, change.into_wire()))
        .collect()
}

/// Parse a wire map back into a diff, where `null` means removal.
pub fn from_wire_map(map: serde_json::Map<String, Value>) -> DiffMap {
    map.into_iter()
        .map(|(key, value)| {
            let change = if value.is_null() {
                FieldValue::Remove
            } else {
                FieldValue::Set(value)
            };
            (key, change)
        })
        .collect()
}
