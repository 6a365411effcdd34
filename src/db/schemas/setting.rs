//! Dynamic settings schema
//!
//! Name/value overrides consulted at distribution time, e.g. a global cap
//! for a specific entitlement. Falls back to the instance's stored cap when
//! absent.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for settings
pub const SETTING_COLLECTION: &str = "settings";

/// A named numeric override with last-editor bookkeeping
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SettingDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Setting key, unique (e.g. "beerLimit")
    pub name: String,

    /// Numeric value
    pub value: i64,

    /// Username of the last editor
    #[serde(default)]
    pub updated_by: String,
}

impl SettingDoc {
    pub fn new(name: &str, value: i64, updated_by: &str) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            name: name.to_string(),
            value,
            updated_by: updated_by.to_string(),
        }
    }
}

impl IntoIndexes for SettingDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "name": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("setting_name_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for SettingDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
