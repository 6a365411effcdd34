//! Participant routes: registration, lookup, check-in, reclassification,
//! and entitlement attach/detach
//!
//! - POST   /participants                          - Register (public)
//! - GET    /participants?skip&limit&q             - Paginated list
//! - GET    /participants/{id}                     - Lookup by badge id
//! - POST   /participants/{id}/checkin             - Mark present
//! - DELETE /participants/{id}/checkin             - Clear presence
//! - PUT    /participants/{id}/type                - Player/participant flip
//! - POST   /participants/{id}/entitlements        - Attach from template
//! - POST   /participants/{id}/entitlements/auto   - Re-run auto-assignment
//! - DELETE /participants/{id}/entitlements/{name} - Detach, discarding its history

use bson::{doc, DateTime};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::schemas::{EntitlementInstance, ParticipantDoc, TypeChange};
use crate::ledger::{auto_assign, effective_cap};
use crate::routes::guard::{authenticate, require_capability};
use crate::routes::respond::{
    error_response, json_response, not_found, parse_json_body, success_response, BoxBody,
};
use crate::routes::shapes::{participant_to_response, ParticipantResponse};
use crate::server::AppState;
use crate::services::{render_badge, BadgeMessage};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub is_player: bool,
    #[serde(default)]
    pub food_preference: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    #[serde(flatten)]
    pub participant: ParticipantResponse,
    /// Rendered badge, inline for immediate display
    pub badge_svg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeChangeRequest {
    pub is_player: bool,
}

#[derive(Debug, Deserialize)]
pub struct AttachRequest {
    pub template: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub participants: Vec<ParticipantResponse>,
    pub total: u64,
    pub skip: u64,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct AutoAssignResponse {
    pub attached: usize,
}

/// Handle /participants/* requests
pub async fn handle(req: Request<Incoming>, state: Arc<AppState>, path: &str) -> Response<BoxBody> {
    let method = req.method().clone();
    let subpath = path
        .strip_prefix("/participants")
        .unwrap_or("")
        .trim_end_matches('/');

    match (method, subpath) {
        (Method::POST, "") => handle_register(req, state).await,
        (Method::GET, "") => handle_list(req, state).await,

        (Method::POST, p) if p.ends_with("/checkin") => {
            let id = trim_segment(p, "/checkin");
            handle_checkin(req, state, id).await
        }
        (Method::DELETE, p) if p.ends_with("/checkin") => {
            let id = trim_segment(p, "/checkin");
            handle_checkin_undo(req, state, id).await
        }
        (Method::PUT, p) if p.ends_with("/type") => {
            let id = trim_segment(p, "/type");
            handle_type_change(req, state, id).await
        }
        (Method::POST, p) if p.ends_with("/entitlements/auto") => {
            let id = trim_segment(p, "/entitlements/auto");
            handle_auto_assign(req, state, id).await
        }
        (Method::POST, p) if p.ends_with("/entitlements") => {
            let id = trim_segment(p, "/entitlements");
            handle_attach(req, state, id).await
        }
        (Method::DELETE, p) if p.contains("/entitlements/") => {
            let rest = p.strip_prefix('/').unwrap_or(p);
            let (id, name) = match rest.split_once("/entitlements/") {
                Some((id, name)) if !id.is_empty() && !name.is_empty() => (id, name),
                _ => return not_found(path),
            };
            handle_detach(req, state, id, name).await
        }

        (Method::GET, p) => {
            let id = p.strip_prefix('/').unwrap_or(p);
            if id.is_empty() || id.contains('/') {
                not_found(path)
            } else {
                handle_get(req, state, id).await
            }
        }

        _ => not_found(path),
    }
}

fn trim_segment<'a>(p: &'a str, suffix: &str) -> &'a str {
    p.strip_prefix('/')
        .and_then(|s| s.strip_suffix(suffix))
        .unwrap_or("")
}

/// POST /participants
///
/// Public registration. The badge must render or the participant is not
/// created; badge delivery by mail is best-effort.
async fn handle_register(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let body: RegisterRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    if body.name.trim().is_empty() || body.email.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: name, email",
            None,
        );
    }
    if !body.email.contains('@') {
        return error_response(StatusCode::BAD_REQUEST, "Invalid email address", None);
    }

    let participant_id = Uuid::new_v4().to_string();

    // No participant without a usable identifier
    let badge_svg = match render_badge(&participant_id) {
        Ok(svg) => svg,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), None),
    };

    let mut participant = ParticipantDoc::new(
        &participant_id,
        &body.name,
        &body.email,
        &body.phone,
        body.is_player,
    );
    participant.food_preference = body.food_preference.clone();

    let templates = match state.templates().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let catalog = match templates.find_many(doc! { "is_active": true }).await {
        Ok(t) => t,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let overrides = match state.cap_overrides().await {
        Ok(o) => o,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let attached = auto_assign(&mut participant, &catalog, &overrides);

    let participants = match state.participants().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    if let Err(e) = participants.insert_one(participant.clone()).await {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    info!(
        "Registered {} ({}) with {} default entitlements",
        participant.name, participant.participant_id, attached
    );

    // Delivery failure must not lose the registration
    let message = BadgeMessage::new(&participant.email, &participant.name, &badge_svg);
    if let Err(e) = state.notifier.send_badge(message).await {
        warn!("Badge delivery to {} failed: {}", participant.email, e);
    }

    json_response(
        StatusCode::CREATED,
        &RegisterResponse {
            participant: participant_to_response(&participant),
            badge_svg,
        },
    )
}

/// GET /participants?skip&limit&q
async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    if let Err(resp) = authenticate(&req, &state).await {
        return resp;
    }

    let query = req.uri().query();
    let skip = crate::routes::respond::query_param_u64(query, "skip", 0);
    let limit = crate::routes::respond::query_param_u64(query, "limit", 100).min(500) as i64;
    let name_filter = crate::routes::respond::query_param(query, "q");

    let filter = match name_filter {
        Some(q) if !q.is_empty() => doc! {
            "name": { "$regex": q, "$options": "i" }
        },
        _ => doc! {},
    };

    let participants = match state.participants().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let total = match participants.count(filter.clone()).await {
        Ok(t) => t,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    match participants.find_many_paginated(filter, skip, limit).await {
        Ok(page) => json_response(
            StatusCode::OK,
            &ListResponse {
                participants: page.iter().map(participant_to_response).collect(),
                total,
                skip,
                limit,
            },
        ),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    }
}

/// GET /participants/{id}
async fn handle_get(req: Request<Incoming>, state: Arc<AppState>, id: &str) -> Response<BoxBody> {
    if let Err(resp) = authenticate(&req, &state).await {
        return resp;
    }

    let participants = match state.participants().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    match participants.find_one(doc! { "participant_id": id }).await {
        Ok(Some(p)) => json_response(StatusCode::OK, &participant_to_response(&p)),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Participant not found", None),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    }
}

/// POST /participants/{id}/checkin
async fn handle_checkin(req: Request<Incoming>, state: Arc<AppState>, id: &str) -> Response<BoxBody> {
    let staff = match require_capability(&req, &state, |p| p.can_mark_attendance, "mark attendance")
        .await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let participants = match state.participants().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let mut participant = match participants.find_one(doc! { "participant_id": id }).await {
        Ok(Some(p)) => p,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Participant not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    if participant.is_present {
        return error_response(
            StatusCode::CONFLICT,
            "Participant is already checked in",
            Some("ALREADY_PRESENT"),
        );
    }

    participant.is_present = true;
    participant.present_at = Some(DateTime::now());
    participant.marked_by = Some(staff.username().to_string());

    if let Err(e) = participants
        .replace_one(doc! { "participant_id": id }, participant.clone())
        .await
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    info!("{} checked in by {}", participant.participant_id, staff.username());
    json_response(StatusCode::OK, &participant_to_response(&participant))
}

/// DELETE /participants/{id}/checkin
///
/// Clears presence only. Entitlements already granted stay granted; undoing
/// attendance does not retract grants.
async fn handle_checkin_undo(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Response<BoxBody> {
    let staff = match require_capability(&req, &state, |p| p.can_mark_attendance, "mark attendance")
        .await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let participants = match state.participants().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let mut participant = match participants.find_one(doc! { "participant_id": id }).await {
        Ok(Some(p)) => p,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Participant not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    if !participant.is_present {
        return error_response(
            StatusCode::CONFLICT,
            "Participant is not checked in",
            Some("NOT_PRESENT"),
        );
    }

    participant.is_present = false;
    participant.present_at = None;
    participant.marked_by = None;

    if let Err(e) = participants
        .replace_one(doc! { "participant_id": id }, participant.clone())
        .await
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    info!("{} check-in cleared by {}", participant.participant_id, staff.username());
    json_response(StatusCode::OK, &participant_to_response(&participant))
}

/// PUT /participants/{id}/type
///
/// Reclassify and re-run auto-assignment for the new type. Existing
/// instances are kept.
async fn handle_type_change(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Response<BoxBody> {
    let staff = match require_capability(&req, &state, |p| p.can_manage_users, "manage users").await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let body: TypeChangeRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    let participants = match state.participants().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let mut participant = match participants.find_one(doc! { "participant_id": id }).await {
        Ok(Some(p)) => p,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Participant not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    if participant.is_player == body.is_player {
        return error_response(
            StatusCode::CONFLICT,
            "Participant already has that type",
            None,
        );
    }

    participant.type_history.push(TypeChange {
        from_player: participant.is_player,
        to_player: body.is_player,
        changed_by: staff.username().to_string(),
        at: DateTime::now(),
    });
    participant.is_player = body.is_player;

    let templates = match state.templates().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let catalog = match templates.find_many(doc! { "is_active": true }).await {
        Ok(t) => t,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let overrides = match state.cap_overrides().await {
        Ok(o) => o,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    auto_assign(&mut participant, &catalog, &overrides);

    if let Err(e) = participants
        .replace_one(doc! { "participant_id": id }, participant.clone())
        .await
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    json_response(StatusCode::OK, &participant_to_response(&participant))
}

/// POST /participants/{id}/entitlements
///
/// Attach an instance from a named active template.
async fn handle_attach(req: Request<Incoming>, state: Arc<AppState>, id: &str) -> Response<BoxBody> {
    if let Err(resp) =
        require_capability(&req, &state, |p| p.can_distribute_food, "distribute").await
    {
        return resp;
    }

    let body: AttachRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    let templates = match state.templates().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let template = match templates
        .find_one(doc! { "name_lower": body.template.trim().to_lowercase(), "is_active": true })
        .await
    {
        Ok(Some(t)) => t,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Template not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let participants = match state.participants().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let mut participant = match participants.find_one(doc! { "participant_id": id }).await {
        Ok(Some(p)) => p,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Participant not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    if participant.has_entitlement(&template.name) {
        return error_response(
            StatusCode::CONFLICT,
            "Participant already holds this entitlement",
            Some("ALREADY_ATTACHED"),
        );
    }

    let overrides = match state.cap_overrides().await {
        Ok(o) => o,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let cap = effective_cap(overrides.for_entitlement(&template.name), template.default_max);
    participant.entitlements.push(EntitlementInstance::new(
        template._id,
        &template.name,
        &template.category,
        template.countable,
        cap,
    ));

    if let Err(e) = participants
        .replace_one(doc! { "participant_id": id }, participant.clone())
        .await
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    json_response(StatusCode::OK, &participant_to_response(&participant))
}

/// POST /participants/{id}/entitlements/auto
async fn handle_auto_assign(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Response<BoxBody> {
    if let Err(resp) =
        require_capability(&req, &state, |p| p.can_distribute_food, "distribute").await
    {
        return resp;
    }

    let participants = match state.participants().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let mut participant = match participants.find_one(doc! { "participant_id": id }).await {
        Ok(Some(p)) => p,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Participant not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let templates = match state.templates().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let catalog = match templates.find_many(doc! { "is_active": true }).await {
        Ok(t) => t,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let overrides = match state.cap_overrides().await {
        Ok(o) => o,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let attached = auto_assign(&mut participant, &catalog, &overrides);

    if attached > 0 {
        if let Err(e) = participants
            .replace_one(doc! { "participant_id": id }, participant)
            .await
        {
            return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
        }
    }

    json_response(StatusCode::OK, &AutoAssignResponse { attached })
}

/// DELETE /participants/{id}/entitlements/{name}
///
/// Removes the instance and with it the instance's grant trail.
async fn handle_detach(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
    name: &str,
) -> Response<BoxBody> {
    let staff = match require_capability(&req, &state, |p| p.can_undo_actions, "undo actions").await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let participants = match state.participants().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let mut participant = match participants.find_one(doc! { "participant_id": id }).await {
        Ok(Some(p)) => p,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Participant not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let before = participant.entitlements.len();
    participant
        .entitlements
        .retain(|e| !e.name.eq_ignore_ascii_case(name));

    if participant.entitlements.len() == before {
        return error_response(StatusCode::NOT_FOUND, "Entitlement not found", None);
    }

    if let Err(e) = participants
        .replace_one(doc! { "participant_id": id }, participant)
        .await
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    info!("Entitlement {} removed from {} by {}", name, id, staff.username());
    success_response("Entitlement removed")
}
