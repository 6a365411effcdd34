//! Bearer-token authentication and capability guards
//!
//! Every mutating handler resolves the caller to a live staff account and
//! checks the capability stored on that account. A failed check rejects
//! the specific operation; there is nothing to retry.

use bson::doc;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};

use crate::auth::{extract_token_from_header, Claims, PermissionSet};
use crate::db::schemas::StaffDoc;
use crate::routes::respond::{error_response, BoxBody};
use crate::server::AppState;

/// An authenticated caller: token claims plus the current staff document.
///
/// Capability checks read the document's stored permission set, so a role
/// change applies from the next request without reissuing tokens.
pub struct AuthedStaff {
    pub claims: Claims,
    pub staff: StaffDoc,
}

impl AuthedStaff {
    pub fn username(&self) -> &str {
        &self.staff.username
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.staff.permissions
    }
}

pub fn get_auth_header(req: &Request<Incoming>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Resolve the bearer token to a live staff account.
///
/// Rejects missing/invalid/expired tokens, unknown accounts, deactivated
/// accounts, and tokens whose version was invalidated.
pub async fn authenticate(
    req: &Request<Incoming>,
    state: &AppState,
) -> Result<AuthedStaff, Response<BoxBody>> {
    let token = match extract_token_from_header(get_auth_header(req)) {
        Some(t) => t,
        None => {
            return Err(error_response(
                StatusCode::UNAUTHORIZED,
                "No token provided",
                Some("NO_TOKEN"),
            ))
        }
    };

    let result = state.jwt.verify_token(token);
    if !result.valid {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            result.error.as_deref().unwrap_or("Invalid token"),
            Some("INVALID_TOKEN"),
        ));
    }
    let claims = result.claims.unwrap();

    let staff_coll = match state.staff().await {
        Ok(c) => c,
        Err(e) => {
            return Err(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                &e.to_string(),
                Some("DATABASE_ERROR"),
            ))
        }
    };

    let staff = match staff_coll
        .find_one(doc! { "username": &claims.username })
        .await
    {
        Ok(Some(s)) => s,
        Ok(None) => {
            return Err(error_response(
                StatusCode::UNAUTHORIZED,
                "Unknown staff account",
                Some("UNKNOWN_ACCOUNT"),
            ))
        }
        Err(e) => {
            return Err(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                &e.to_string(),
                Some("DATABASE_ERROR"),
            ))
        }
    };

    if !staff.is_active {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "Account is deactivated",
            Some("INACTIVE_ACCOUNT"),
        ));
    }

    if staff.token_version != claims.version {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "Token has been invalidated",
            Some("STALE_TOKEN"),
        ));
    }

    Ok(AuthedStaff { claims, staff })
}

/// Authenticate and require one capability from the stored permission set.
pub async fn require_capability(
    req: &Request<Incoming>,
    state: &AppState,
    capability: fn(&PermissionSet) -> bool,
    label: &str,
) -> Result<AuthedStaff, Response<BoxBody>> {
    let authed = authenticate(req, state).await?;

    if !capability(authed.permissions()) {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            &format!("Missing required permission: {}", label),
            Some("FORBIDDEN"),
        ));
    }

    Ok(authed)
}
