//! Turnstile - event check-in and entitlement distribution API
//!
//! Participants register, receive a scannable badge, get marked present at
//! the gate, and are granted bounded entitlements (meals, beverages,
//! merchandise) by staff with role-based permissions.
//!
//! ## Modules
//!
//! - **auth**: JWT sessions, Argon2 passwords, role-derived capabilities
//! - **db**: MongoDB storage and document schemas
//! - **ledger**: the entitlement distribution/undo core
//! - **routes**: HTTP handlers
//! - **server**: hyper plumbing and shared state
//! - **services**: badge rendering and mail relay delivery

pub mod auth;
pub mod config;
pub mod db;
pub mod ledger;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, TurnstileError};
