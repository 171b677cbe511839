//! Token authentication for the catalog API.
//!
//! Provides:
//! - Credential verification with iterated, salted SHA-256 (`password`)
//! - One opaque token per user, reused until logout or password change (`store`)
//! - The session lifecycle: login, identity lookup, logout, rotation (`service`)
//! - SQLite-backed persistent storage
//!
//! ## Design Decisions
//! - Tokens are stored in plaintext because login is get-or-create: the same
//!   key must be returned to every client of the same user.
//! - Identity lookups never fail for a bad token; they report the visitor
//!   identity instead.

pub mod error;
pub mod password;
pub mod service;
pub mod store;

pub use error::AuthError;
pub use password::PasswordHasher;
pub use service::{
    parse_authorization, AuthService, Identity, PasswordChange, Session, SessionState, VISITOR,
};
pub use store::{AuthStore, Token, User};
