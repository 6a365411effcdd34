//! Spreadsheet import route
//!
//! - POST /import/participants - Register a batch of rows
//!
//! Each row is validated independently; failures are collected into the
//! response body rather than aborting the batch, and no state about failed
//! rows survives the request. The batch size is capped.

use bson::doc;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::db::schemas::ParticipantDoc;
use crate::ledger::auto_assign;
use crate::routes::guard::require_capability;
use crate::routes::respond::{error_response, json_response, not_found, parse_json_body, BoxBody};
use crate::server::AppState;
use crate::services::render_badge;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub is_player: bool,
    #[serde(default)]
    pub food_preference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub rows: Vec<ImportRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub created: usize,
    pub created_ids: Vec<String>,
    pub errors: Vec<String>,
}

/// Validate one row, returning the rejection reason if it cannot be
/// registered.
pub fn validate_row(row: &ImportRow, index: usize) -> Result<(), String> {
    if row.name.trim().is_empty() {
        return Err(format!("row {}: missing name", index + 1));
    }
    if row.email.trim().is_empty() {
        return Err(format!("row {}: missing email", index + 1));
    }
    if !row.email.contains('@') {
        return Err(format!("row {}: invalid email '{}'", index + 1, row.email));
    }
    Ok(())
}

/// Handle /import/* requests
pub async fn handle(req: Request<Incoming>, state: Arc<AppState>, path: &str) -> Response<BoxBody> {
    let method = req.method().clone();

    match (method, path) {
        (Method::POST, "/import/participants") => handle_import(req, state).await,
        _ => not_found(path),
    }
}

/// POST /import/participants
///
/// Registers valid rows exactly like single registration, minus badge
/// delivery. Always reports 200; per-row failures carry the real status.
async fn handle_import(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let admin = match require_capability(&req, &state, |p| p.can_manage_users, "manage users").await
    {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let body: ImportRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string(), None),
    };

    if body.rows.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No rows given", None);
    }
    if body.rows.len() > state.args.import_row_cap {
        return error_response(
            StatusCode::BAD_REQUEST,
            &format!(
                "Batch of {} rows exceeds the limit of {}",
                body.rows.len(),
                state.args.import_row_cap
            ),
            Some("BATCH_TOO_LARGE"),
        );
    }

    let participants = match state.participants().await {
        Ok(c) => c,
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

    let mut created_ids = Vec::new();
    let mut errors = Vec::new();

    for (index, row) in body.rows.iter().enumerate() {
        if let Err(reason) = validate_row(row, index) {
            errors.push(reason);
            continue;
        }

        let participant_id = Uuid::new_v4().to_string();
        if let Err(e) = render_badge(&participant_id) {
            errors.push(format!("row {}: {}", index + 1, e));
            continue;
        }

        let mut participant = ParticipantDoc::new(
            &participant_id,
            &row.name,
            &row.email,
            &row.phone,
            row.is_player,
        );
        participant.food_preference = row.food_preference.clone();
        auto_assign(&mut participant, &catalog, &overrides);

        match participants.insert_one(participant).await {
            Ok(_) => created_ids.push(participant_id),
            Err(e) => errors.push(format!("row {}: {}", index + 1, e)),
        }
    }

    info!(
        "Import by {}: {} created, {} rejected",
        admin.username(),
        created_ids.len(),
        errors.len()
    );

    json_response(
        StatusCode::OK,
        &ImportResponse {
            created: created_ids.len(),
            created_ids,
            errors,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, email: &str) -> ImportRow {
        ImportRow {
            name: name.into(),
            email: email.into(),
            phone: String::new(),
            is_player: false,
            food_preference: None,
        }
    }

    #[test]
    fn test_valid_row_passes() {
        assert!(validate_row(&row("Dana", "dana@example.com"), 0).is_ok());
    }

    #[test]
    fn test_missing_name_rejected() {
        let err = validate_row(&row("  ", "dana@example.com"), 0).unwrap_err();
        assert_eq!(err, "row 1: missing name");
    }

    #[test]
    fn test_missing_email_rejected() {
        let err = validate_row(&row("Dana", ""), 4).unwrap_err();
        assert_eq!(err, "row 5: missing email");
    }

    #[test]
    fn test_malformed_email_rejected() {
        let err = validate_row(&row("Dana", "not-an-email"), 1).unwrap_err();
        assert!(err.contains("invalid email"));
    }
}
