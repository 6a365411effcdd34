//! Health and version endpoints

use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::routes::respond::{json_response, BoxBody};
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub mode: String,
    pub node_id: String,
}

/// GET /health, /healthz, /version
pub fn handle(state: &AppState, _path: &str) -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            healthy: true,
            version: env!("CARGO_PKG_VERSION"),
            mode: if state.args.dev_mode {
                "development".into()
            } else {
                "production".into()
            },
            node_id: state.args.node_id.to_string(),
        },
    )
}
