//! Staff administration routes
//!
//! All endpoints require the can_manage_users capability.
//!
//! - POST /admin/staff                       - Create a staff account
//! - GET  /admin/staff                       - List accounts
//! - PUT  /admin/staff/{username}/role       - Change role (recomputes grants)
//! - PUT  /admin/staff/{username}/status     - Activate/deactivate
//! - POST /admin/staff/{username}/reset-password

use bson::doc;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::auth::{hash_password, PermissionSet, Role};
use crate::db::schemas::StaffDoc;
use crate::routes::guard::require_capability;
use crate::routes::respond::{
    error_response, json_response, not_found, parse_json_body, success_response, BoxBody,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateStaffRequest {
    pub username: String,
    pub password: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffSummary {
    pub username: String,
    pub role: Role,
    pub permissions: PermissionSet,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct StaffListResponse {
    pub staff: Vec<StaffSummary>,
}

/// Handle /admin/staff/* requests
pub async fn handle(req: Request<Incoming>, state: Arc<AppState>, path: &str) -> Response<BoxBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/admin/staff").unwrap_or("");

    match (method, subpath) {
        (Method::POST, "") | (Method::POST, "/") => handle_create(req, state).await,
        (Method::GET, "") | (Method::GET, "/") => handle_list(req, state).await,

        (Method::PUT, p) if p.ends_with("/role") => {
            let username = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/role"))
                .unwrap_or("");
            handle_update_role(req, state, username).await
        }

        (Method::PUT, p) if p.ends_with("/status") => {
            let username = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/status"))
                .unwrap_or("");
            handle_update_status(req, state, username).await
        }

        (Method::POST, p) if p.ends_with("/reset-password") => {
            let username = p
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix("/reset-password"))
                .unwrap_or("");
            handle_reset_password(req, state, username).await
        }

        _ => not_found(path),
    }
}

fn summary(staff: &StaffDoc) -> StaffSummary {
    StaffSummary {
        username: staff.username.clone(),
        role: staff.role,
        permissions: staff.permissions,
        is_active: staff.is_active,
    }
}

/// POST /admin/staff
async fn handle_create(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let admin = match require_capability(&req, &state, |p| p.can_manage_users, "manage users").await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let body: CreateStaffRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    if body.username.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Username is required", None);
    }
    if body.password.len() < 8 {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters",
            Some("WEAK_PASSWORD"),
        );
    }
    let role: Role = match body.role.parse() {
        Ok(r) => r,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e, None),
    };

    let staff_coll = match state.staff().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let username = body.username.trim().to_lowercase();
    match staff_coll.find_one(doc! { "username": &username }).await {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "Username already exists",
                Some("DUPLICATE_USERNAME"),
            )
        }
        Ok(None) => {}
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    }

    let password_hash = match hash_password(&body.password) {
        Ok(h) => h,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), None),
    };

    let staff = StaffDoc::new(&username, password_hash, role);
    if let Err(e) = staff_coll.insert_one(staff.clone()).await {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    info!("Staff {} created by {} with role {}", username, admin.username(), role);
    json_response(StatusCode::CREATED, &summary(&staff))
}

/// GET /admin/staff
async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    if let Err(resp) = require_capability(&req, &state, |p| p.can_manage_users, "manage users").await
    {
        return resp;
    }

    let staff_coll = match state.staff().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    match staff_coll.find_many(doc! {}).await {
        Ok(all) => json_response(
            StatusCode::OK,
            &StaffListResponse {
                staff: all.iter().map(summary).collect(),
            },
        ),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    }
}

/// PUT /admin/staff/{username}/role
///
/// Changing the role recomputes the stored capability set before save.
async fn handle_update_role(
    req: Request<Incoming>,
    state: Arc<AppState>,
    username: &str,
) -> Response<BoxBody> {
    let admin = match require_capability(&req, &state, |p| p.can_manage_users, "manage users").await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let body: UpdateRoleRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    let role: Role = match body.role.parse() {
        Ok(r) => r,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e, None),
    };

    let staff_coll = match state.staff().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let username = username.to_lowercase();
    let mut staff = match staff_coll.find_one(doc! { "username": &username }).await {
        Ok(Some(s)) => s,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Staff account not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    staff.set_role(role);

    if let Err(e) = staff_coll
        .replace_one(doc! { "username": &username }, staff.clone())
        .await
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    info!("Role of {} changed to {} by {}", username, role, admin.username());
    json_response(StatusCode::OK, &summary(&staff))
}

/// PUT /admin/staff/{username}/status
///
/// Deactivation bumps the token version so outstanding tokens die.
async fn handle_update_status(
    req: Request<Incoming>,
    state: Arc<AppState>,
    username: &str,
) -> Response<BoxBody> {
    let admin = match require_capability(&req, &state, |p| p.can_manage_users, "manage users").await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let body: UpdateStatusRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    let username = username.to_lowercase();
    if !body.active && username == admin.username() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Cannot deactivate your own account",
            None,
        );
    }

    let staff_coll = match state.staff().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let mut staff = match staff_coll.find_one(doc! { "username": &username }).await {
        Ok(Some(s)) => s,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Staff account not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    staff.is_active = body.active;
    if !body.active {
        staff.token_version += 1;
    }

    if let Err(e) = staff_coll
        .replace_one(doc! { "username": &username }, staff.clone())
        .await
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    info!(
        "Account {} {} by {}",
        username,
        if body.active { "activated" } else { "deactivated" },
        admin.username()
    );
    json_response(StatusCode::OK, &summary(&staff))
}

/// POST /admin/staff/{username}/reset-password
async fn handle_reset_password(
    req: Request<Incoming>,
    state: Arc<AppState>,
    username: &str,
) -> Response<BoxBody> {
    let admin = match require_capability(&req, &state, |p| p.can_manage_users, "manage users").await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let body: ResetPasswordRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    if body.new_password.len() < 8 {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters",
            Some("WEAK_PASSWORD"),
        );
    }

    let password_hash = match hash_password(&body.new_password) {
        Ok(h) => h,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), None),
    };

    let staff_coll = match state.staff().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let username = username.to_lowercase();
    let mut staff = match staff_coll.find_one(doc! { "username": &username }).await {
        Ok(Some(s)) => s,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Staff account not found", None),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    staff.password_hash = password_hash;
    staff.token_version += 1;

    if let Err(e) = staff_coll
        .replace_one(doc! { "username": &username }, staff)
        .await
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None);
    }

    info!("Password of {} reset by {}", username, admin.username());
    success_response("Password reset")
}
