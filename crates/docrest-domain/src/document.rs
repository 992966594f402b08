//! Wire types for documents, collection listings and callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The JSON-shaped property bag of a document.
pub type Properties = serde_json::Map<String, Value>;

/// A document stored in a collection.
///
/// Timestamps are server-assigned; clients never supply them on write paths.
/// All fields default so that partial payloads (a PUT body without
/// timestamps, say) deserialize cleanly — the id is then validated by the
/// request pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: String,
    #[serde(
        rename = "creationDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(
        rename = "lastModificationDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modification_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: Properties,
}

/// An ordered page of documents from one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Collection {
    pub id: String,
    pub features: Vec<Document>,
}

/// The authenticated caller.
///
/// An empty `id` denotes the anonymous caller. Only authenticators construct
/// users; everything else treats them as read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl User {
    pub fn is_anonymous(&self) -> bool {
        self.id.is_empty()
    }
}

/// Deep map-union of `patch` into `existing`.
///
/// Where both sides carry a map at the same key the merge recurses;
/// otherwise the patch value replaces the existing one. Scalars, arrays and
/// nulls are never merged structurally, and keys absent from the patch keep
/// their original values.
pub fn merge_properties(existing: &Properties, patch: &Properties) -> Properties {
    let mut merged = Properties::new();

    for (key, value) in existing {
        match patch.get(key) {
            Some(Value::Object(patch_child)) => {
                if let Value::Object(existing_child) = value {
                    merged.insert(
                        key.clone(),
                        Value::Object(merge_properties(existing_child, patch_child)),
                    );
                } else {
                    merged.insert(key.clone(), Value::Object(patch_child.clone()));
                }
            }
            Some(patched) => {
                merged.insert(key.clone(), patched.clone());
            }
            None => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    for (key, value) in patch {
        if !existing.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        }
    }

    merged
}
