//! Group registry routes
//!
//! - POST   /groups                        - Create a group
//! - GET    /groups                        - List groups
//! - GET    /groups/{name}                 - Group detail
//! - POST   /groups/{name}/members         - Add a participant
//! - DELETE /groups/{name}/members/{id}    - Remove a participant
//! - DELETE /groups/{name}                 - Soft-delete the group
//!
//! Deleting a group clears the participant backlinks but keeps its
//! distribution history.

use bson::{doc, DateTime};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::db::schemas::{GroupDoc, GroupMember};
use crate::routes::guard::{authenticate, require_capability};
use crate::routes::respond::{
    error_response, json_response, not_found, parse_json_body, success_response, BoxBody,
};
use crate::routes::shapes::{group_to_response, GroupResponse};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub group_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub participant_id: String,
}

#[derive(Debug, Serialize)]
pub struct GroupListResponse {
    pub groups: Vec<GroupResponse>,
}

/// Handle /groups/* requests
pub async fn handle(req: Request<Incoming>, state: Arc<AppState>, path: &str) -> Response<BoxBody> {
    let method = req.method().clone();
    let subpath = path
        .strip_prefix("/groups")
        .unwrap_or("")
        .trim_end_matches('/');

    match (method, subpath) {
        (Method::POST, "") => handle_create(req, state).await,
        (Method::GET, "") => handle_list(req, state).await,

        (Method::POST, p) if p.ends_with("/members") => {
            let name = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/members"))
                .unwrap_or("");
            handle_add_member(req, state, name).await
        }
        (Method::DELETE, p) if p.contains("/members/") => {
            let rest = p.strip_prefix('/').unwrap_or(p);
            let (name, pid) = match rest.split_once("/members/") {
                Some((name, pid)) if !name.is_empty() && !pid.is_empty() => (name, pid),
                _ => return not_found(path),
            };
            handle_remove_member(req, state, name, pid).await
        }
        (Method::DELETE, p) => {
            let name = p.strip_prefix('/').unwrap_or(p);
            if name.is_empty() || name.contains('/') {
                not_found(path)
            } else {
                handle_delete(req, state, name).await
            }
        }
        (Method::GET, p) => {
            let name = p.strip_prefix('/').unwrap_or(p);
            if name.is_empty() || name.contains('/') {
                not_found(path)
            } else {
                handle_get(req, state, name).await
            }
        }

        _ => not_found(path),
    }
}

/// POST /groups
async fn handle_create(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let admin = match require_capability(&req, &state, |p| p.can_manage_settings, "manage settings")
        .await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let body: CreateGroupRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    if body.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Group name is required", None);
    }

    let groups = match state.groups().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let name_lower = body.name.trim().to_lowercase();
    match groups.find_one(doc! { "name_lower": &name_lower }).await {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "Group name already exists",
                Some("DUPLICATE_NAME"),
            )
        }
        Ok(None) => {}
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    }

    let group = GroupDoc::new(&body.name, &body.color, &body.group_type);
    if let Err(e) = groups.insert_one(group.clone()).await {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    info!("Group {} created by {}", group.name, admin.username());
    json_response(StatusCode::CREATED, &group_to_response(&group))
}

/// GET /groups
async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    if let Err(resp) = authenticate(&req, &state).await {
        return resp;
    }

    let groups = match state.groups().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    match groups.find_many(doc! {}).await {
        Ok(all) => json_response(
            StatusCode::OK,
            &GroupListResponse {
                groups: all.iter().map(group_to_response).collect(),
            },
        ),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    }
}

/// GET /groups/{name}
async fn handle_get(req: Request<Incoming>, state: Arc<AppState>, name: &str) -> Response<BoxBody> {
    if let Err(resp) = authenticate(&req, &state).await {
        return resp;
    }

    let groups = match state.groups().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    match groups.find_one(doc! { "name_lower": name.to_lowercase() }).await {
        Ok(Some(g)) => json_response(StatusCode::OK, &group_to_response(&g)),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Group not found", None),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    }
}

/// POST /groups/{name}/members
///
/// Adds a participant to the group and records the backlink on the
/// participant document.
async fn handle_add_member(
    req: Request<Incoming>,
    state: Arc<AppState>,
    name: &str,
) -> Response<BoxBody> {
    let admin = match require_capability(&req, &state, |p| p.can_manage_settings, "manage settings")
        .await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let body: AddMemberRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    let groups = match state.groups().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let mut group = match groups.find_one(doc! { "name_lower": name.to_lowercase() }).await {
        Ok(Some(g)) => g,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Group not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    if group.has_member(&body.participant_id) {
        return error_response(
            StatusCode::CONFLICT,
            "Participant is already a member",
            Some("ALREADY_MEMBER"),
        );
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

    group.members.push(GroupMember {
        participant_id: body.participant_id.clone(),
        added_by: admin.username().to_string(),
        added_at: DateTime::now(),
    });
    if !participant.groups.iter().any(|g| g.eq_ignore_ascii_case(&group.name)) {
        participant.groups.push(group.name.clone());
    }

    if let Err(e) = groups
        .replace_one(doc! { "name_lower": &group.name_lower }, group.clone())
        .await
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }
    if let Err(e) = participants
        .replace_one(doc! { "participant_id": &body.participant_id }, participant)
        .await
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    info!(
        "{} added to group {} by {}",
        body.participant_id, group.name, admin.username()
    );
    json_response(StatusCode::OK, &group_to_response(&group))
}

/// DELETE /groups/{name}/members/{id}
async fn handle_remove_member(
    req: Request<Incoming>,
    state: Arc<AppState>,
    name: &str,
    participant_id: &str,
) -> Response<BoxBody> {
    let admin = match require_capability(&req, &state, |p| p.can_manage_settings, "manage settings")
        .await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let groups = match state.groups().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let mut group = match groups.find_one(doc! { "name_lower": name.to_lowercase() }).await {
        Ok(Some(g)) => g,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Group not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let before = group.members.len();
    group.members.retain(|m| m.participant_id != participant_id);
    if group.members.len() == before {
        return error_response(StatusCode::NOT_FOUND, "Participant is not a member", None);
    }

    if let Err(e) = groups
        .replace_one(doc! { "name_lower": &group.name_lower }, group.clone())
        .await
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    // Clear the backlink; a missing participant document is fine here
    let participants = match state.participants().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    if let Ok(Some(mut participant)) = participants
        .find_one(doc! { "participant_id": participant_id })
        .await
    {
        participant
            .groups
            .retain(|g| !g.eq_ignore_ascii_case(&group.name));
        let _ = participants
            .replace_one(doc! { "participant_id": participant_id }, participant)
            .await;
    }

    info!(
        "{} removed from group {} by {}",
        participant_id, group.name, admin.username()
    );
    json_response(StatusCode::OK, &group_to_response(&group))
}

/// DELETE /groups/{name}
///
/// Soft delete. Backlinks are cleared; the document and its distribution
/// history stay behind.
async fn handle_delete(req: Request<Incoming>, state: Arc<AppState>, name: &str) -> Response<BoxBody> {
    let admin = match require_capability(&req, &state, |p| p.can_manage_settings, "manage settings")
        .await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let groups = match state.groups().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let group = match groups.find_one(doc! { "name_lower": name.to_lowercase() }).await {
        Ok(Some(g)) => g,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Group not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let participants = match state.participants().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    for member in &group.members {
        if let Ok(Some(mut participant)) = participants
            .find_one(doc! { "participant_id": &member.participant_id })
            .await
        {
            participant
                .groups
                .retain(|g| !g.eq_ignore_ascii_case(&group.name));
            let _ = participants
                .replace_one(
                    doc! { "participant_id": &member.participant_id },
                    participant,
                )
                .await;
        }
    }

    if let Err(e) = groups.soft_delete(doc! { "name_lower": &group.name_lower }).await {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    info!("Group {} deleted by {}", group.name, admin.username());
    success_response("Group deleted")
}
