//! Entitlement template catalog schema
//!
//! Templates define which entitlements exist. They are never deleted, only
//! deactivated; deactivation does not retract instances already attached to
//! participants.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for entitlement templates
pub const TEMPLATE_COLLECTION: &str = "entitlement_templates";

/// Catalog definition of a distributable entitlement
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TemplateDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Display name, unique case-insensitively
    pub name: String,

    /// Lowercased name, carries the unique index
    pub name_lower: String,

    /// Category (meal, beverage, merchandise, ...)
    pub category: String,

    /// Countable entitlements can be granted unit by unit up to the cap;
    /// non-countable ones are granted once, to full cap
    pub countable: bool,

    /// Default cap copied onto new instances (subject to setting overrides)
    pub default_max: i64,

    /// Auto-attach to players at registration
    #[serde(default)]
    pub default_for_players: bool,

    /// Auto-attach to non-player participants at registration
    #[serde(default)]
    pub default_for_participants: bool,

    /// Deactivated templates are not attachable but keep existing instances
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl TemplateDoc {
    pub fn new(
        name: &str,
        category: &str,
        countable: bool,
        default_max: i64,
        default_for_players: bool,
        default_for_participants: bool,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            name: name.trim().to_string(),
            name_lower: name.trim().to_lowercase(),
            category: category.to_string(),
            countable,
            default_max,
            default_for_players,
            default_for_participants,
            is_active: true,
        }
    }
}

impl IntoIndexes for TemplateDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "name_lower": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("template_name_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for TemplateDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
