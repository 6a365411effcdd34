//! Authentication and authorization for Turnstile
//!
//! Provides:
//! - JWT token generation and validation
//! - Role to capability-set derivation
//! - Password hashing with Argon2

pub mod jwt;
pub mod password;
pub mod roles;

pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput, TokenValidationResult};
pub use password::{hash_password, verify_password};
pub use roles::{PermissionSet, Role};
