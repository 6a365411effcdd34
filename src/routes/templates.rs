//! Entitlement template catalog routes
//!
//! - POST /templates                   - Create a template
//! - GET  /templates                   - List the catalog
//! - PUT  /templates/{name}            - Update a template
//! - POST /templates/{name}/deactivate - Retire from the catalog
//! - POST /templates/{name}/sync-caps  - Rewrite stored caps on instances
//!
//! Templates are never deleted. Deactivation stops new attachments but
//! leaves instances already on participants untouched.

use bson::doc;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::db::schemas::TemplateDoc;
use crate::ledger::effective_cap;
use crate::routes::guard::{authenticate, require_capability};
use crate::routes::respond::{
    error_response, json_response, not_found, parse_json_body, success_response, BoxBody,
};
use crate::routes::shapes::{template_to_response, TemplateResponse};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateRequest {
    pub name: String,
    pub category: String,
    pub countable: bool,
    pub default_max: i64,
    #[serde(default)]
    pub default_for_players: bool,
    #[serde(default)]
    pub default_for_participants: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTemplateRequest {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub default_max: Option<i64>,
    #[serde(default)]
    pub default_for_players: Option<bool>,
    #[serde(default)]
    pub default_for_participants: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TemplateListResponse {
    pub templates: Vec<TemplateResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCapsResponse {
    pub effective_cap: i64,
    pub updated_participants: usize,
}

/// Handle /templates/* requests
pub async fn handle(req: Request<Incoming>, state: Arc<AppState>, path: &str) -> Response<BoxBody> {
    let method = req.method().clone();
    let subpath = path
        .strip_prefix("/templates")
        .unwrap_or("")
        .trim_end_matches('/');

    match (method, subpath) {
        (Method::POST, "") => handle_create(req, state).await,
        (Method::GET, "") => handle_list(req, state).await,

        (Method::POST, p) if p.ends_with("/deactivate") => {
            let name = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/deactivate"))
                .unwrap_or("");
            handle_deactivate(req, state, name).await
        }
        (Method::POST, p) if p.ends_with("/sync-caps") => {
            let name = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/sync-caps"))
                .unwrap_or("");
            handle_sync_caps(req, state, name).await
        }
        (Method::PUT, p) => {
            let name = p.strip_prefix('/').unwrap_or(p);
            if name.is_empty() || name.contains('/') {
                not_found(path)
            } else {
                handle_update(req, state, name).await
            }
        }

        _ => not_found(path),
    }
}

/// POST /templates
async fn handle_create(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let admin = match require_capability(&req, &state, |p| p.can_manage_settings, "manage settings")
        .await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let body: CreateTemplateRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    if body.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Template name is required", None);
    }
    if body.default_max < 1 {
        return error_response(StatusCode::BAD_REQUEST, "Cap must be positive", None);
    }

    let templates = match state.templates().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let name_lower = body.name.trim().to_lowercase();
    match templates.find_one(doc! { "name_lower": &name_lower }).await {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "Template name already exists",
                Some("DUPLICATE_NAME"),
            )
        }
        Ok(None) => {}
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    }

    let template = TemplateDoc::new(
        &body.name,
        &body.category,
        body.countable,
        body.default_max,
        body.default_for_players,
        body.default_for_participants,
    );
    if let Err(e) = templates.insert_one(template.clone()).await {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    info!("Template {} created by {}", template.name, admin.username());
    json_response(StatusCode::CREATED, &template_to_response(&template))
}

/// GET /templates
async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    if let Err(resp) = authenticate(&req, &state).await {
        return resp;
    }

    let templates = match state.templates().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    match templates.find_many(doc! {}).await {
        Ok(all) => json_response(
            StatusCode::OK,
            &TemplateListResponse {
                templates: all.iter().map(template_to_response).collect(),
            },
        ),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    }
}

/// PUT /templates/{name}
///
/// Edits the catalog entry only; instances already attached keep their
/// denormalized copy.
async fn handle_update(
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

    let body: UpdateTemplateRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    if let Some(max) = body.default_max {
        if max < 1 {
            return error_response(StatusCode::BAD_REQUEST, "Cap must be positive", None);
        }
    }

    let templates = match state.templates().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let name_lower = name.to_lowercase();
    let mut template = match templates.find_one(doc! { "name_lower": &name_lower }).await {
        Ok(Some(t)) => t,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Template not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    if let Some(category) = body.category {
        template.category = category;
    }
    if let Some(max) = body.default_max {
        template.default_max = max;
    }
    if let Some(v) = body.default_for_players {
        template.default_for_players = v;
    }
    if let Some(v) = body.default_for_participants {
        template.default_for_participants = v;
    }

    if let Err(e) = templates
        .replace_one(doc! { "name_lower": &name_lower }, template.clone())
        .await
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    info!("Template {} updated by {}", template.name, admin.username());
    json_response(StatusCode::OK, &template_to_response(&template))
}

/// POST /templates/{name}/deactivate
async fn handle_deactivate(
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

    let templates = match state.templates().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let name_lower = name.to_lowercase();
    let mut template = match templates.find_one(doc! { "name_lower": &name_lower }).await {
        Ok(Some(t)) => t,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Template not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    if !template.is_active {
        return error_response(StatusCode::CONFLICT, "Template is already inactive", None);
    }

    template.is_active = false;
    if let Err(e) = templates
        .replace_one(doc! { "name_lower": &name_lower }, template.clone())
        .await
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    info!("Template {} deactivated by {}", template.name, admin.username());
    success_response("Template deactivated")
}

/// POST /templates/{name}/sync-caps
///
/// Convenience bulk rewrite of the stored cap on every instance of this
/// template to the current effective cap. Distribution correctness does not
/// depend on it; the resolver applies overrides on every call anyway.
async fn handle_sync_caps(
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

    let templates = match state.templates().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let template = match templates
        .find_one(doc! { "name_lower": name.to_lowercase() })
        .await
    {
        Ok(Some(t)) => t,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Template not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let overrides = match state.cap_overrides().await {
        Ok(o) => o,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };
    let cap = effective_cap(overrides.for_entitlement(&template.name), template.default_max);

    let participants = match state.participants().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    // Instances denormalize the template name verbatim, so an exact match
    // finds the holders
    let holders = match participants
        .find_many(doc! { "entitlements.name": &template.name })
        .await
    {
        Ok(h) => h,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let mut updated = 0;
    for mut participant in holders {
        let mut changed = false;
        for instance in participant
            .entitlements
            .iter_mut()
            .filter(|e| e.name.eq_ignore_ascii_case(&template.name))
        {
            if instance.max_count != cap {
                instance.max_count = cap;
                changed = true;
            }
        }
        if changed {
            let id = participant.participant_id.clone();
            if let Err(e) = participants
                .replace_one(doc! { "participant_id": &id }, participant)
                .await
            {
                return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
            }
            updated += 1;
        }
    }

    info!(
        "Caps for {} synced to {} on {} participants by {}",
        template.name, cap, updated, admin.username()
    );
    json_response(
        StatusCode::OK,
        &SyncCapsResponse {
            effective_cap: cap,
            updated_participants: updated,
        },
    )
}
