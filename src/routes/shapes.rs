//! Wire-format views of stored documents
//!
//! Documents keep BSON-friendly field names; responses use camelCase and
//! RFC 3339 timestamps.

use bson::DateTime;
use serde::Serialize;

use crate::db::schemas::{
    EntitlementAction, EntitlementEvent, EntitlementInstance, GroupDoc, ParticipantDoc,
    SettingDoc, TemplateDoc,
};

pub fn timestamp(dt: &DateTime) -> String {
    dt.to_chrono().to_rfc3339()
}

fn opt_timestamp(dt: &Option<DateTime>) -> Option<String> {
    dt.as_ref().map(timestamp)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementView {
    pub name: String,
    pub category: String,
    pub countable: bool,
    pub max_count: i64,
    pub given: i64,
    pub given_at: Vec<String>,
    pub given_by: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undone_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undone_at: Option<String>,
    pub last_undone_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryView {
    pub entitlement: String,
    pub action: &'static str,
    pub count: i64,
    pub actor: String,
    pub at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResponse {
    pub participant_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub is_player: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_preference: Option<String>,
    pub is_present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub present_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marked_by: Option<String>,
    pub entitlements: Vec<EntitlementView>,
    pub groups: Vec<String>,
    pub history: Vec<HistoryView>,
}

pub fn entitlement_to_view(e: &EntitlementInstance) -> EntitlementView {
    EntitlementView {
        name: e.name.clone(),
        category: e.category.clone(),
        countable: e.countable,
        max_count: e.max_count,
        given: e.given,
        given_at: e.given_at.iter().map(timestamp).collect(),
        given_by: e.given_by.clone(),
        undone_by: e.undone_by.clone(),
        undone_at: opt_timestamp(&e.undone_at),
        last_undone_count: e.last_undone_count,
    }
}

pub fn history_to_view(h: &EntitlementEvent) -> HistoryView {
    HistoryView {
        entitlement: h.entitlement.clone(),
        action: match h.action {
            EntitlementAction::Distributed => "distributed",
            EntitlementAction::Undone => "undone",
        },
        count: h.count,
        actor: h.actor.clone(),
        at: timestamp(&h.at),
    }
}

pub fn participant_to_response(p: &ParticipantDoc) -> ParticipantResponse {
    ParticipantResponse {
        participant_id: p.participant_id.clone(),
        name: p.name.clone(),
        email: p.email.clone(),
        phone: p.phone.clone(),
        is_player: p.is_player,
        food_preference: p.food_preference.clone(),
        is_present: p.is_present,
        present_at: opt_timestamp(&p.present_at),
        marked_by: p.marked_by.clone(),
        entitlements: p.entitlements.iter().map(entitlement_to_view).collect(),
        groups: p.groups.clone(),
        history: p.entitlement_history.iter().map(history_to_view).collect(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateResponse {
    pub name: String,
    pub category: String,
    pub countable: bool,
    pub default_max: i64,
    pub default_for_players: bool,
    pub default_for_participants: bool,
    pub is_active: bool,
}

pub fn template_to_response(t: &TemplateDoc) -> TemplateResponse {
    TemplateResponse {
        name: t.name.clone(),
        category: t.category.clone(),
        countable: t.countable,
        default_max: t.default_max,
        default_for_players: t.default_for_players,
        default_for_participants: t.default_for_participants,
        is_active: t.is_active,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMemberView {
    pub participant_id: String,
    pub added_by: String,
    pub added_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDistributionView {
    pub entitlement: String,
    pub count: i64,
    pub actor: String,
    pub at: String,
    pub undone: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResponse {
    pub name: String,
    pub color: String,
    pub group_type: String,
    pub members: Vec<GroupMemberView>,
    pub distributions: Vec<GroupDistributionView>,
}

pub fn group_to_response(g: &GroupDoc) -> GroupResponse {
    GroupResponse {
        name: g.name.clone(),
        color: g.color.clone(),
        group_type: g.group_type.clone(),
        members: g
            .members
            .iter()
            .map(|m| GroupMemberView {
                participant_id: m.participant_id.clone(),
                added_by: m.added_by.clone(),
                added_at: timestamp(&m.added_at),
            })
            .collect(),
        distributions: g
            .distributions
            .iter()
            .map(|d| GroupDistributionView {
                entitlement: d.entitlement.clone(),
                count: d.count,
                actor: d.actor.clone(),
                at: timestamp(&d.at),
                undone: d.undone,
            })
            .collect(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingResponse {
    pub name: String,
    pub value: i64,
    pub updated_by: String,
}

pub fn setting_to_response(s: &SettingDoc) -> SettingResponse {
    SettingResponse {
        name: s.name.clone(),
        value: s.value,
        updated_by: s.updated_by.clone(),
    }
}
