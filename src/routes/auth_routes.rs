//! HTTP routes for staff authentication
//!
//! - POST /auth/login   - Authenticate and get a JWT token
//! - POST /auth/refresh - Reissue a token for a live session
//! - GET  /auth/me      - Current staff identity and capabilities

use bson::doc;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{verify_password, PermissionSet, Role, TokenInput};
use crate::routes::guard::authenticate;
use crate::routes::respond::{
    error_response, json_response, method_not_allowed, not_found, parse_json_body, BoxBody,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub username: String,
    pub role: Role,
    pub permissions: PermissionSet,
    pub expires_at: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub username: String,
    pub role: Role,
    pub permissions: PermissionSet,
}

/// Handle /auth/* requests
pub async fn handle(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let path = req.uri().path().split('?').next().unwrap_or("").to_string();
    let method = req.method().clone();

    match (method, path.as_str()) {
        (Method::POST, "/auth/login") => handle_login(req, state).await,
        (Method::POST, "/auth/refresh") => handle_refresh(req, state).await,
        (Method::GET, "/auth/me") => handle_me(req, state).await,

        (_, "/auth/login") | (_, "/auth/refresh") | (_, "/auth/me") => method_not_allowed(),
        _ => not_found(&path),
    }
}

/// POST /auth/login
///
/// Flow:
/// 1. Look up the staff account by lowercased username
/// 2. Verify the password against the Argon2 hash
/// 3. Reject deactivated accounts
/// 4. Issue a JWT carrying role and the stored permission set
async fn handle_login(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let body: LoginRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    if body.username.trim().is_empty() || body.password.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: username, password",
            None,
        );
    }

    let staff_coll = match state.staff().await {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    let username = body.username.trim().to_lowercase();
    let staff = match staff_coll.find_one(doc! { "username": &username }).await {
        Ok(Some(s)) => s,
        Ok(None) => {
            warn!("Login failed for unknown user {}", username);
            return error_response(
                StatusCode::UNAUTHORIZED,
                "Invalid username or password",
                Some("BAD_CREDENTIALS"),
            );
        }
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), None),
    };

    match verify_password(&body.password, &staff.password_hash) {
        Ok(true) => {}
        Ok(false) => {
            warn!("Login failed for {}", username);
            return error_response(
                StatusCode::UNAUTHORIZED,
                "Invalid username or password",
                Some("BAD_CREDENTIALS"),
            );
        }
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), None),
    }

    if !staff.is_active {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "Account is deactivated",
            Some("INACTIVE_ACCOUNT"),
        );
    }

    let staff_id = staff._id.map(|id| id.to_hex()).unwrap_or_default();
    let token = match state.jwt.generate_token(TokenInput {
        staff_id,
        username: staff.username.clone(),
        role: staff.role,
        permissions: staff.permissions,
        version: staff.token_version,
    }) {
        Ok(t) => t,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), None),
    };

    info!("Staff {} logged in as {}", staff.username, staff.role);

    json_response(
        StatusCode::OK,
        &AuthResponse {
            token,
            username: staff.username,
            role: staff.role,
            permissions: staff.permissions,
            expires_at: expiry_timestamp(&state),
        },
    )
}

/// POST /auth/refresh
async fn handle_refresh(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let authed = match authenticate(&req, &state).await {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let staff = authed.staff;
    let staff_id = staff._id.map(|id| id.to_hex()).unwrap_or_default();
    let token = match state.jwt.generate_token(TokenInput {
        staff_id,
        username: staff.username.clone(),
        role: staff.role,
        permissions: staff.permissions,
        version: staff.token_version,
    }) {
        Ok(t) => t,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), None),
    };

    json_response(
        StatusCode::OK,
        &AuthResponse {
            token,
            username: staff.username,
            role: staff.role,
            permissions: staff.permissions,
            expires_at: expiry_timestamp(&state),
        },
    )
}

/// GET /auth/me
async fn handle_me(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let authed = match authenticate(&req, &state).await {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    json_response(
        StatusCode::OK,
        &MeResponse {
            username: authed.staff.username.clone(),
            role: authed.staff.role,
            permissions: authed.staff.permissions,
        },
    )
}

fn expiry_timestamp(state: &AppState) -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        + state.args.jwt_expiry_seconds
}
