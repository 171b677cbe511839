//! Token authentication and session lifecycle.
//!
//! Each user is either `Anonymous` (no token) or `Authenticated(token)`:
//!
//! - `authenticate`: Anonymous -> Authenticated (or re-issues the same token)
//! - `revoke`: Authenticated -> Anonymous
//! - `change_password`: Authenticated -> Authenticated with a fresh token
//!
//! There is no ambient "current user": callers pass the raw `Authorization`
//! header in and get an explicit [`Session`] or [`Identity`] back.
//!
//! `resolve` treats an unusable header as a visitor, while `revoke` and
//! `change_password` reject the same header with [`AuthError::TokenNotFound`].
//! Read-only identity checks soft-fail; mutations do not.

use super::error::AuthError;
use super::password::PasswordHasher;
use super::store::{AuthStore, Token, User};
use std::fmt;
use std::sync::Arc;

/// Identity reported when no session can be resolved.
pub const VISITOR: &str = "visitante";

/// Scheme keyword expected in the `Authorization` header.
pub const TOKEN_KEYWORD: &str = "Token";

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User(String),
    Visitor,
}

impl Identity {
    pub fn username(&self) -> &str {
        match self {
            Self::User(name) => name,
            Self::Visitor => VISITOR,
        }
    }

    pub fn is_visitor(&self) -> bool {
        matches!(self, Self::Visitor)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.username())
    }
}

/// A token together with the user who owns it.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub token: Token,
}

/// Per-user session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated { token: String },
}

/// Fields of a password change request, already checked for presence.
#[derive(Debug, Clone)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}

/// Extract the token key from an `Authorization` header value.
///
/// Accepts exactly `"Token <key>"`: one single space, the literal keyword,
/// a non-empty key and nothing after it. This is stricter than taking the
/// first two space-separated segments: a third segment (`"Token abc 123"`)
/// or a doubled space rejects the whole header.
pub fn parse_authorization(header: Option<&str>) -> Option<&str> {
    let mut parts = header?.split(' ');
    let keyword = parts.next()?;
    let key = parts.next()?;
    if keyword != TOKEN_KEYWORD || key.is_empty() || parts.next().is_some() {
        return None;
    }
    Some(key)
}

/// Issues, validates, rotates and revokes tokens.
pub struct AuthService {
    store: Arc<AuthStore>,
    hasher: PasswordHasher,
}

impl AuthService {
    pub fn new(store: Arc<AuthStore>, hasher: PasswordHasher) -> Self {
        Self { store, hasher }
    }

    /// Create an account. Used by the administrative CLI.
    pub fn register(&self, username: &str, password: &str) -> anyhow::Result<User> {
        if password.is_empty() {
            anyhow::bail!("Password cannot be empty");
        }
        let hash = self.hasher.hash(password);
        let user = self.store.register(username, &hash)?;
        tracing::info!(user_id = user.id, username = %user.username, "User registered");
        Ok(user)
    }

    /// Verify credentials and return the user's token, creating it if needed.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Token, AuthError> {
        let user = match self.store.find_user_by_username(username)? {
            Some(user) => user,
            None => {
                self.hasher.dummy_verify(password);
                tracing::warn!(username, "Login failed");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self.hasher.verify(password, &user.password_hash) {
            tracing::warn!(username, "Login failed");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.store.open_session(user.id)?;
        tracing::info!(user_id = user.id, username = %user.username, "Login succeeded");
        Ok(token)
    }

    /// Look up the session named by an `Authorization` header.
    ///
    /// `Ok(None)` covers an absent, malformed or unknown token.
    pub fn session(&self, header: Option<&str>) -> Result<Option<Session>, AuthError> {
        let Some(key) = parse_authorization(header) else {
            return Ok(None);
        };
        let Some(token) = self.store.find_token(key)? else {
            return Ok(None);
        };
        let Some(user) = self.store.get_user(token.user_id)? else {
            return Ok(None);
        };
        Ok(Some(Session { user, token }))
    }

    /// Report who owns the token, falling back to the visitor identity.
    ///
    /// Only a storage failure is an error.
    pub fn resolve(&self, header: Option<&str>) -> Result<Identity, AuthError> {
        Ok(match self.session(header)? {
            Some(session) => Identity::User(session.user.username),
            None => Identity::Visitor,
        })
    }

    /// Log out: delete the token and end the session.
    pub fn revoke(&self, header: Option<&str>) -> Result<(), AuthError> {
        let session = self.session(header)?.ok_or(AuthError::TokenNotFound)?;
        if !session.user.session_active {
            return Err(AuthError::NotAuthenticated);
        }
        if !self.store.close_session(&session.token)? {
            // Revoked concurrently between lookup and delete.
            return Err(AuthError::TokenNotFound);
        }
        tracing::info!(user_id = session.user.id, "Logout");
        Ok(())
    }

    /// Change the password and rotate the token atomically.
    ///
    /// On any failure the stored hash and the old token are left untouched.
    pub fn change_password(
        &self,
        header: Option<&str>,
        change: &PasswordChange,
    ) -> Result<Token, AuthError> {
        let session = self.session(header)?.ok_or(AuthError::TokenNotFound)?;
        if change.new_password1 != change.new_password2 {
            return Err(AuthError::PasswordMismatch);
        }
        if !self
            .hasher
            .verify(&change.old_password, &session.user.password_hash)
        {
            tracing::warn!(user_id = session.user.id, "Password change rejected");
            return Err(AuthError::IncorrectPassword);
        }

        let new_hash = self.hasher.hash(&change.new_password1);
        let token = self
            .store
            .change_password(&session.token, &new_hash)?
            .ok_or(AuthError::TokenNotFound)?;
        tracing::info!(user_id = session.user.id, "Password changed, token rotated");
        Ok(token)
    }

    /// Current session state of `username`, or `None` if no such user.
    pub fn session_state(&self, username: &str) -> Result<Option<SessionState>, AuthError> {
        let Some(user) = self.store.find_user_by_username(username)? else {
            return Ok(None);
        };
        Ok(Some(match self.store.token_for_user(user.id)? {
            Some(token) => SessionState::Authenticated { token: token.key },
            None => SessionState::Anonymous,
        }))
    }
}
