//! Database schemas for Turnstile
//!
//! Defines MongoDB document structures for staff, participants, templates,
//! groups, and settings.

mod group;
mod metadata;
mod participant;
mod setting;
mod staff;
mod template;

pub use group::{GroupDistribution, GroupDoc, GroupMember, GROUP_COLLECTION};
pub use metadata::Metadata;
pub use participant::{
    EntitlementAction, EntitlementEvent, EntitlementInstance, ParticipantDoc, TypeChange,
    PARTICIPANT_COLLECTION,
};
pub use setting::{SettingDoc, SETTING_COLLECTION};
pub use staff::{StaffDoc, STAFF_COLLECTION};
pub use template::{TemplateDoc, TEMPLATE_COLLECTION};
