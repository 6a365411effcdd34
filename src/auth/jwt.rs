//! JWT token handling for staff authentication
//!
//! Security notes:
//! - Tokens are signed with HS256 (HMAC-SHA256)
//! - Default expiry is 1 hour
//! - In production, JWT_SECRET should be a strong random value from environment

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::{PermissionSet, Role};
use crate::types::TurnstileError;

/// Payload stored in JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Staff document id (hex ObjectId)
    pub staff_id: String,
    /// Staff username
    pub username: String,
    /// Staff role at issue time
    pub role: Role,
    /// Capability set granted at issue time
    pub permissions: PermissionSet,
    /// Token version (must match the staff document for the token to be live)
    pub version: i32,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Input for creating a new token
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub staff_id: String,
    pub username: String,
    pub role: Role,
    pub permissions: PermissionSet,
    pub version: i32,
}

/// Result of token validation
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    pub fn valid(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, TurnstileError> {
        if secret.is_empty() {
            return Err(TurnstileError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(TurnstileError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Create a validator for dev mode (allows empty secret)
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            expiry_seconds: 3600,
        }
    }

    /// Generate a JWT token for an authenticated staff member
    pub fn generate_token(&self, input: TokenInput) -> Result<String, TurnstileError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| TurnstileError::Auth(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            staff_id: input.staff_id,
            username: input.username,
            role: input.role,
            permissions: input.permissions,
            version: input.version,
            iat: now,
            exp: now + self.expiry_seconds,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| TurnstileError::Auth(format!("Failed to generate token: {}", e)))?;

        Ok(token)
    }

    /// Verify and decode a JWT token
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        let validation = Validation::default();

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(token_data) => TokenValidationResult::valid(token_data.claims),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let error_msg = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidToken => "Invalid token",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    _ => "Token validation failed",
                };
                TokenValidationResult::invalid(error_msg)
            }
        }
    }

    /// Check if a token is close to expiring
    pub fn is_token_expiring_soon(&self, claims: &Claims, threshold_seconds: u64) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        claims.exp.saturating_sub(now) < threshold_seconds
    }
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    // Support "Bearer <token>" format
    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    // Also support raw token (for flexibility)
    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_validator() -> JwtValidator {
        JwtValidator::new(
            "test-secret-that-is-at-least-32-characters-long".into(),
            3600,
        )
        .unwrap()
    }

    fn test_input(role: Role) -> TokenInput {
        TokenInput {
            staff_id: "65f0c0ffee65f0c0ffee65f0".into(),
            username: "front-gate".into(),
            role,
            permissions: PermissionSet::for_role(role),
            version: 1,
        }
    }

    #[test]
    fn test_generate_and_verify_token() {
        let validator = test_validator();

        let token = validator.generate_token(test_input(Role::Gate)).unwrap();
        assert!(!token.is_empty());

        let result = validator.verify_token(&token);
        assert!(result.valid);

        let claims = result.claims.unwrap();
        assert_eq!(claims.username, "front-gate");
        assert_eq!(claims.role, Role::Gate);
        assert!(claims.permissions.can_mark_attendance);
        assert!(!claims.permissions.can_distribute_food);
    }

    #[test]
    fn test_invalid_token() {
        let validator = test_validator();

        let result = validator.verify_token("invalid-token");
        assert!(!result.valid);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_wrong_secret() {
        let validator1 = test_validator();
        let validator2 = JwtValidator::new(
            "different-secret-that-is-at-least-32-characters".into(),
            3600,
        )
        .unwrap();

        let token = validator1.generate_token(test_input(Role::Admin)).unwrap();

        // Verify with wrong secret should fail
        let result = validator2.verify_token(&token);
        assert!(!result.valid);
    }

    #[test]
    fn test_extract_token_from_header() {
        // Bearer format
        assert_eq!(
            extract_token_from_header(Some("Bearer abc123")),
            Some("abc123")
        );

        // Raw token
        assert_eq!(extract_token_from_header(Some("abc123")), Some("abc123"));

        // Empty cases
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("")), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);

        // Invalid format
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
    }

    #[test]
    fn test_secret_validation() {
        // Too short
        assert!(JwtValidator::new("short".into(), 3600).is_err());

        // Empty
        assert!(JwtValidator::new("".into(), 3600).is_err());

        // Valid
        assert!(JwtValidator::new("this-secret-is-at-least-32-chars-long".into(), 3600).is_ok());
    }
}
