//! Document metadata envelope
//!
//! Creation/update timestamps plus the soft-deletion marker every Turnstile
//! document carries. Nothing is ever physically removed from a collection.

use bson::DateTime;
use serde::{Deserialize, Serialize};

/// Envelope carried by every document
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Metadata {
    /// When the document was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,

    /// When the document was last written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    /// Soft-deletion marker; filtered out of every read
    #[serde(default)]
    pub is_deleted: bool,

    /// When the document was soft-deleted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime>,
}

impl Metadata {
    /// Fresh envelope stamped with the current instant
    pub fn new() -> Self {
        Self {
            created_at: Some(DateTime::now()),
            updated_at: Some(DateTime::now()),
            is_deleted: false,
            deleted_at: None,
        }
    }
}
