//! Shared response and body helpers for route handlers

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::types::TurnstileError;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Generic error payload
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Generic success payload
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(json))
        .unwrap()
}

pub fn error_response(status: StatusCode, error: &str, code: Option<&str>) -> Response<BoxBody> {
    json_response(
        status,
        &ErrorResponse {
            error: error.to_string(),
            code: code.map(|c| c.to_string()),
        },
    )
}

pub fn success_response(message: &str) -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: message.to_string(),
        },
    )
}

/// Render a TurnstileError as a structured JSON failure
pub fn failure_response(err: TurnstileError) -> Response<BoxBody> {
    let (status, body) = err.into_status_code_and_body();
    error_response(status, &body, None)
}

pub fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

pub fn not_found(path: &str) -> Response<BoxBody> {
    error_response(
        StatusCode::NOT_FOUND,
        &format!("No route for {}", path),
        None,
    )
}

pub fn method_not_allowed() -> Response<BoxBody> {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed", None)
}

/// Read and deserialize a JSON request body, bounded to 1 MiB
pub async fn parse_json_body<T: for<'de> Deserialize<'de>>(
    req: Request<hyper::body::Incoming>,
) -> Result<T, TurnstileError> {
    let body = req
        .collect()
        .await
        .map_err(|e| TurnstileError::Http(format!("Failed to read body: {}", e)))?;

    let bytes = body.to_bytes();
    if bytes.len() > 1024 * 1024 {
        return Err(TurnstileError::Http("Request body too large".into()));
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| TurnstileError::Http(format!("Invalid JSON: {}", e)))
}

/// Parse an integer query parameter, falling back to a default
pub fn query_param_u64(query: Option<&str>, name: &str, default: u64) -> u64 {
    query
        .and_then(|q| {
            q.split('&')
                .filter_map(|p| p.split_once('='))
                .find(|(k, _)| *k == name)
                .and_then(|(_, v)| v.parse().ok())
        })
        .unwrap_or(default)
}

/// Parse a string query parameter
pub fn query_param<'a>(query: Option<&'a str>, name: &str) -> Option<&'a str> {
    query.and_then(|q| {
        q.split('&')
            .filter_map(|p| p.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_parsing() {
        let q = Some("skip=20&limit=50&q=smith");
        assert_eq!(query_param_u64(q, "skip", 0), 20);
        assert_eq!(query_param_u64(q, "limit", 100), 50);
        assert_eq!(query_param_u64(q, "missing", 7), 7);
        assert_eq!(query_param(q, "q"), Some("smith"));
        assert_eq!(query_param(None, "q"), None);
    }

    #[test]
    fn test_query_param_ignores_garbage() {
        let q = Some("skip=notanumber");
        assert_eq!(query_param_u64(q, "skip", 3), 3);
    }
}
