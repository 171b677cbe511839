//! Authentication errors.

use thiserror::Error;

/// Failure of an auth service operation.
///
/// All variants except [`AuthError::Storage`] are request-terminating client
/// errors; none of them is worth retrying.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Unknown username or wrong password. Deliberately does not say which.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Authorization header absent, malformed, or naming an unknown token.
    #[error("token not found")]
    TokenNotFound,

    /// The token exists but its owner has no active session.
    #[error("not authenticated")]
    NotAuthenticated,

    /// New password and its confirmation differ.
    #[error("new passwords do not match")]
    PasswordMismatch,

    /// The current password supplied for a change is wrong.
    #[error("incorrect password")]
    IncorrectPassword,

    /// Persistence failure.
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl AuthError {
    /// Check if this is a client-side failure (as opposed to storage).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, AuthError::Storage(_))
    }
}
