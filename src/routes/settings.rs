//! Dynamic settings routes
//!
//! - GET /settings        - List all settings
//! - GET /settings/{name} - Read one setting
//! - PUT /settings/{name} - Create or update a setting
//!
//! Settings named in the cap-override table take effect on the very next
//! distribution; nothing is cached.

use bson::doc;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::db::schemas::SettingDoc;
use crate::routes::guard::{authenticate, require_capability};
use crate::routes::respond::{
    error_response, json_response, not_found, parse_json_body, BoxBody,
};
use crate::routes::shapes::{setting_to_response, SettingResponse};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateSettingRequest {
    pub value: i64,
}

#[derive(Debug, Serialize)]
pub struct SettingListResponse {
    pub settings: Vec<SettingResponse>,
}

/// Handle /settings/* requests
pub async fn handle(req: Request<Incoming>, state: Arc<AppState>, path: &str) -> Response<BoxBody> {
    let method = req.method().clone();
    let subpath = path
        .strip_prefix("/settings")
        .unwrap_or("")
        .trim_end_matches('/');

    match (method, subpath) {
        (Method::GET, "") => handle_list(req, state).await,
        (Method::GET, p) => {
            let name = p.strip_prefix('/').unwrap_or(p);
            if name.is_empty() || name.contains('/') {
                not_found(path)
            } else {
                handle_get(req, state, name).await
            }
        }
        (Method::PUT, p) => {
            let name = p.strip_prefix('/').unwrap_or(p);
            if name.is_empty() || name.contains('/') {
                not_found(path)
            } else {
                handle_put(req, state, name).await
            }
        }
        _ => not_found(path),
    }
}

/// GET /settings
async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    if let Err(resp) = authenticate(&req, &state).await {
        return resp;
    }

    let settings = match state.settings().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    match settings.find_many(doc! {}).await {
        Ok(all) => json_response(
            StatusCode::OK,
            &SettingListResponse {
                settings: all.iter().map(setting_to_response).collect(),
            },
        ),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    }
}

/// GET /settings/{name}
async fn handle_get(req: Request<Incoming>, state: Arc<AppState>, name: &str) -> Response<BoxBody> {
    if let Err(resp) = authenticate(&req, &state).await {
        return resp;
    }

    let settings = match state.settings().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    match settings.find_one(doc! { "name": name }).await {
        Ok(Some(s)) => json_response(StatusCode::OK, &setting_to_response(&s)),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Setting not found", None),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    }
}

/// PUT /settings/{name}
///
/// Upserts the named setting, recording the editor.
async fn handle_put(req: Request<Incoming>, state: Arc<AppState>, name: &str) -> Response<BoxBody> {
    let admin = match require_capability(&req, &state, |p| p.can_manage_settings, "manage settings")
        .await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let body: UpdateSettingRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    if body.value < 0 {
        return error_response(StatusCode::BAD_REQUEST, "Value must not be negative", None);
    }

    let settings = match state.settings().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let setting = match settings.find_one(doc! { "name": name }).await {
        Ok(Some(mut existing)) => {
            existing.value = body.value;
            existing.updated_by = admin.username().to_string();
            if let Err(e) = settings
                .replace_one(doc! { "name": name }, existing.clone())
                .await
            {
                return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
            }
            existing
        }
        Ok(None) => {
            let created = SettingDoc::new(name, body.value, admin.username());
            if let Err(e) = settings.insert_one(created.clone()).await {
                return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
            }
            created
        }
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    info!("Setting {} = {} by {}", name, body.value, admin.username());
    json_response(StatusCode::OK, &setting_to_response(&setting))
}
