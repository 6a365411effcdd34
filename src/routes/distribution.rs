//! Distribution and undo routes
//!
//! - POST /distribute            - Grant to one participant
//! - POST /distribute/undo       - Reverse grants for one participant
//! - POST /distribute/bulk       - Grant to an explicit id list
//! - POST /distribute/group      - Grant to every member of a group
//! - POST /distribute/group/undo - Reverse a group's last open distribution
//!
//! Bulk and group operations are best-effort: each target is processed
//! independently and per-target failures are collected as strings, never
//! aborting the batch.

use bson::{doc, DateTime};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::db::schemas::GroupDistribution;
use crate::ledger::{self, CapOverrides, Rejection};
use crate::routes::guard::require_capability;
use crate::routes::respond::{
    error_response, json_response, not_found, parse_json_body, BoxBody,
};
use crate::routes::shapes::{participant_to_response, ParticipantResponse};
use crate::server::AppState;

/// Historical fixed type tokens still accepted on the bulk path. Translated
/// once, here at the boundary, to entitlement names.
const LEGACY_TYPES: &[&str] = &[
    "breakfast",
    "lunch",
    "beer",
    "eveningMeal",
    "specialBeverage",
    "specialMeal",
];

/// Translate a legacy type token to an entitlement name. Instance lookup is
/// case-insensitive downstream, so the token doubles as the name.
pub fn legacy_entitlement_name(token: &str) -> Option<&str> {
    LEGACY_TYPES
        .iter()
        .find(|t| t.eq_ignore_ascii_case(token))
        .copied()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributeRequest {
    pub participant_id: String,
    pub entitlement: String,
    #[serde(default = "default_count")]
    pub count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDistributeRequest {
    pub participant_ids: Vec<String>,
    /// Entitlement name
    #[serde(default)]
    pub entitlement: Option<String>,
    /// Legacy type token, kept for old clients
    #[serde(default, rename = "type")]
    pub legacy_type: Option<String>,
    #[serde(default = "default_count")]
    pub count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDistributeRequest {
    pub group: String,
    pub entitlement: String,
    #[serde(default = "default_count")]
    pub count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupUndoRequest {
    pub group: String,
    pub entitlement: String,
}

fn default_count() -> i64 {
    1
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantView {
    pub entitlement: String,
    pub count: i64,
    pub given: i64,
    pub cap: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributeResponse {
    pub participant: ParticipantResponse,
    pub granted: GrantView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoResponse {
    pub participant: ParticipantResponse,
    pub undone: i64,
    pub given: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutResponse {
    pub succeeded: Vec<String>,
    pub errors: Vec<String>,
}

/// Handle /distribute/* requests
pub async fn handle(req: Request<Incoming>, state: Arc<AppState>, path: &str) -> Response<BoxBody> {
    let method = req.method().clone();

    match (method, path) {
        (Method::POST, "/distribute") => handle_distribute(req, state).await,
        (Method::POST, "/distribute/undo") => handle_undo(req, state).await,
        (Method::POST, "/distribute/bulk") => handle_bulk(req, state).await,
        (Method::POST, "/distribute/group") => handle_group(req, state).await,
        (Method::POST, "/distribute/group/undo") => handle_group_undo(req, state).await,
        _ => not_found(path),
    }
}

/// Render a ledger rejection as an HTTP failure. A missing instance is a
/// not-found; the rest are business-rule conflicts.
fn rejection_response(rejection: Rejection) -> Response<BoxBody> {
    let status = match rejection {
        Rejection::UnknownEntitlement { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::CONFLICT,
    };
    error_response(status, &rejection.to_string(), None)
}

/// POST /distribute
async fn handle_distribute(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let staff = match require_capability(&req, &state, |p| p.can_distribute_food, "distribute").await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let body: DistributeRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    if body.count < 1 {
        return error_response(StatusCode::BAD_REQUEST, "Count must be positive", None);
    }

    let participants = match state.participants().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let mut participant = match participants
        .find_one(doc! { "participant_id": &body.participant_id })
        .await
    {
        Ok(Some(p)) => p,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Participant not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let overrides = match state.cap_overrides().await {
        Ok(o) => o,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let granted = match ledger::distribute(
        &mut participant,
        &body.entitlement,
        body.count,
        staff.username(),
        &overrides,
    ) {
        Ok(g) => g,
        Err(rejection) => return rejection_response(rejection),
    };

    if let Err(e) = participants
        .replace_one(doc! { "participant_id": &body.participant_id }, participant.clone())
        .await
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    info!(
        "{} x{} distributed to {} by {}",
        granted.entitlement, granted.count, participant.participant_id, staff.username()
    );

    json_response(
        StatusCode::OK,
        &DistributeResponse {
            granted: GrantView {
                entitlement: granted.entitlement,
                count: granted.count,
                given: granted.given,
                cap: granted.cap,
            },
            participant: participant_to_response(&participant),
        },
    )
}

/// POST /distribute/undo
async fn handle_undo(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let staff = match require_capability(&req, &state, |p| p.can_undo_actions, "undo actions").await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let body: DistributeRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    if body.count < 1 {
        return error_response(StatusCode::BAD_REQUEST, "Count must be positive", None);
    }

    let participants = match state.participants().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let mut participant = match participants
        .find_one(doc! { "participant_id": &body.participant_id })
        .await
    {
        Ok(Some(p)) => p,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Participant not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let undone = match ledger::undo(
        &mut participant,
        &body.entitlement,
        body.count,
        staff.username(),
    ) {
        Ok(u) => u,
        Err(rejection) => return rejection_response(rejection),
    };

    if let Err(e) = participants
        .replace_one(doc! { "participant_id": &body.participant_id }, participant.clone())
        .await
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    info!(
        "{} x{} undone for {} by {}",
        undone.entitlement, undone.count, participant.participant_id, staff.username()
    );

    json_response(
        StatusCode::OK,
        &UndoResponse {
            undone: undone.count,
            given: undone.given,
            participant: participant_to_response(&participant),
        },
    )
}

/// Fan a distribution out over participant ids, persisting each success.
/// Returns the per-target success and error lists.
async fn fan_out_distribute(
    state: &AppState,
    ids: &[String],
    entitlement: &str,
    count: i64,
    actor: &str,
    overrides: &CapOverrides,
) -> Result<FanOutResponse, Response<BoxBody>> {
    let participants = match state.participants().await {
        Ok(c) => c,
        Err(e) => {
            return Err(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                &e.to_string(),
                None,
            ))
        }
    };

    let mut succeeded = Vec::new();
    let mut errors = Vec::new();

    for id in ids {
        let mut participant = match participants.find_one(doc! { "participant_id": id }).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                errors.push(format!("{}: not found", id));
                continue;
            }
            Err(e) => {
                errors.push(format!("{}: {}", id, e));
                continue;
            }
        };

        match ledger::distribute(&mut participant, entitlement, count, actor, overrides) {
            Ok(_) => {
                if let Err(e) = participants
                    .replace_one(doc! { "participant_id": id }, participant)
                    .await
                {
                    errors.push(format!("{}: {}", id, e));
                } else {
                    succeeded.push(id.clone());
                }
            }
            Err(rejection) => errors.push(rejection.to_string()),
        }
    }

    Ok(FanOutResponse { succeeded, errors })
}

/// POST /distribute/bulk
async fn handle_bulk(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let staff = match require_capability(&req, &state, |p| p.can_distribute_food, "distribute").await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let body: BulkDistributeRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    if body.participant_ids.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No participants given", None);
    }
    if body.count < 1 {
        return error_response(StatusCode::BAD_REQUEST, "Count must be positive", None);
    }

    // Either an entitlement name or a legacy type token
    let entitlement = match (&body.entitlement, &body.legacy_type) {
        (Some(name), _) if !name.trim().is_empty() => name.trim().to_string(),
        (_, Some(token)) => match legacy_entitlement_name(token) {
            Some(name) => name.to_string(),
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("Unknown type token: {}", token),
                    None,
                )
            }
        },
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Missing required field: entitlement",
                None,
            )
        }
    };

    let overrides = match state.cap_overrides().await {
        Ok(o) => o,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let result = match fan_out_distribute(
        &state,
        &body.participant_ids,
        &entitlement,
        body.count,
        staff.username(),
        &overrides,
    )
    .await
    {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let status = if result.succeeded.is_empty() {
        StatusCode::CONFLICT
    } else {
        StatusCode::OK
    };
    json_response(status, &result)
}

/// POST /distribute/group
///
/// Fans out to the group's members and appends a group-scoped history
/// record for later group undo.
async fn handle_group(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let staff = match require_capability(&req, &state, |p| p.can_distribute_food, "distribute").await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let body: GroupDistributeRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    if body.count < 1 {
        return error_response(StatusCode::BAD_REQUEST, "Count must be positive", None);
    }

    let groups = match state.groups().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let mut group = match groups
        .find_one(doc! { "name_lower": body.group.trim().to_lowercase() })
        .await
    {
        Ok(Some(g)) => g,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Group not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let member_ids: Vec<String> = group
        .members
        .iter()
        .map(|m| m.participant_id.clone())
        .collect();
    if member_ids.is_empty() {
        return error_response(StatusCode::CONFLICT, "Group has no members", None);
    }

    let overrides = match state.cap_overrides().await {
        Ok(o) => o,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let result = match fan_out_distribute(
        &state,
        &member_ids,
        &body.entitlement,
        body.count,
        staff.username(),
        &overrides,
    )
    .await
    {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    // Record the group-scoped distribution when anyone received it
    if !result.succeeded.is_empty() {
        group.distributions.push(GroupDistribution {
            entitlement: body.entitlement.clone(),
            count: body.count,
            actor: staff.username().to_string(),
            at: DateTime::now(),
            undone: false,
        });
        if let Err(e) = groups
            .replace_one(doc! { "name_lower": &group.name_lower }, group.clone())
            .await
        {
            return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
        }

        info!(
            "Group {} received {} x{} ({} ok, {} failed) from {}",
            group.name,
            body.entitlement,
            body.count,
            result.succeeded.len(),
            result.errors.len(),
            staff.username()
        );
    }

    let status = if result.succeeded.is_empty() {
        StatusCode::CONFLICT
    } else {
        StatusCode::OK
    };
    json_response(status, &result)
}

/// POST /distribute/group/undo
///
/// Finds the most recent not-yet-undone group record for the entitlement,
/// reverses it across current members, and marks the record undone.
async fn handle_group_undo(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let staff = match require_capability(&req, &state, |p| p.can_undo_actions, "undo actions").await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let body: GroupUndoRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    let groups = match state.groups().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let mut group = match groups
        .find_one(doc! { "name_lower": body.group.trim().to_lowercase() })
        .await
    {
        Ok(Some(g)) => g,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Group not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let record_index = match group.last_open_distribution(&body.entitlement) {
        Some(i) => i,
        None => {
            return error_response(
                StatusCode::CONFLICT,
                &format!("No open {} distribution to undo", body.entitlement),
                None,
            )
        }
    };
    let undo_count = group.distributions[record_index].count;

    let participants = match state.participants().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let mut succeeded = Vec::new();
    let mut errors = Vec::new();

    for member in &group.members {
        let id = &member.participant_id;
        let mut participant = match participants.find_one(doc! { "participant_id": id }).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                errors.push(format!("{}: not found", id));
                continue;
            }
            Err(e) => {
                errors.push(format!("{}: {}", id, e));
                continue;
            }
        };

        match ledger::undo(&mut participant, &body.entitlement, undo_count, staff.username()) {
            Ok(_) => {
                if let Err(e) = participants
                    .replace_one(doc! { "participant_id": id }, participant)
                    .await
                {
                    errors.push(format!("{}: {}", id, e));
                } else {
                    succeeded.push(id.clone());
                }
            }
            Err(rejection) => errors.push(rejection.to_string()),
        }
    }

    if !succeeded.is_empty() {
        group.distributions[record_index].undone = true;
        if let Err(e) = groups
            .replace_one(doc! { "name_lower": &group.name_lower }, group.clone())
            .await
        {
            return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
        }

        info!(
            "Group {} undo of {} ({} ok, {} failed) by {}",
            group.name,
            body.entitlement,
            succeeded.len(),
            errors.len(),
            staff.username()
        );
    }

    let status = if succeeded.is_empty() {
        StatusCode::CONFLICT
    } else {
        StatusCode::OK
    };
    json_response(status, &FanOutResponse { succeeded, errors })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_token_translation() {
        assert_eq!(legacy_entitlement_name("breakfast"), Some("breakfast"));
        assert_eq!(legacy_entitlement_name("eveningmeal"), Some("eveningMeal"));
        assert_eq!(legacy_entitlement_name("SPECIALBEVERAGE"), Some("specialBeverage"));
        assert_eq!(legacy_entitlement_name("dinner"), None);
        assert_eq!(legacy_entitlement_name(""), None);
    }
}
