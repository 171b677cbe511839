//! `/auth/token` handlers: login, identity, logout, password change.

use super::{AppState, INTERNAL_ERROR_MSG};
use crate::auth::{AuthError, PasswordChange};
use crate::util::{push_field_error, FieldErrors, MSG_BLANK, MSG_REQUIRED};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::Json,
};
use serde::Deserialize;

/// Concrete return type for auth handlers (avoids `impl IntoResponse` inference issues).
pub type AuthResponse = (StatusCode, Json<serde_json::Value>);

const MSG_LOGOUT: &str = "Logout realizado com sucesso.";
const MSG_PASSWORD_CHANGED: &str = "Senha alterada com sucesso.";

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginBody {
    username: Option<String>,
    password: Option<String>,
}

/// Request body for a password change.
#[derive(Debug, Deserialize)]
pub struct PasswordChangeBody {
    old_password: Option<String>,
    new_password1: Option<String>,
    new_password2: Option<String>,
}

impl PasswordChangeBody {
    fn validate(self) -> Result<PasswordChange, FieldErrors> {
        let mut errors = FieldErrors::new();
        let old_password = required_field(&mut errors, "old_password", self.old_password);
        let new_password1 = required_field(&mut errors, "new_password1", self.new_password1);
        let new_password2 = required_field(&mut errors, "new_password2", self.new_password2);
        match (old_password, new_password1, new_password2) {
            (Some(old_password), Some(new_password1), Some(new_password2)) => Ok(PasswordChange {
                old_password,
                new_password1,
                new_password2,
            }),
            _ => Err(errors),
        }
    }
}

fn required_field(errors: &mut FieldErrors, field: &str, value: Option<String>) -> Option<String> {
    match value {
        None => {
            push_field_error(errors, field, MSG_REQUIRED);
            None
        }
        Some(v) if v.is_empty() => {
            push_field_error(errors, field, MSG_BLANK);
            None
        }
        Some(v) => Some(v),
    }
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// User-facing text for a client error.
fn error_message(err: &AuthError) -> &'static str {
    match err {
        AuthError::InvalidCredentials => "Credenciais inválidas.",
        AuthError::TokenNotFound => "Token não encontrado.",
        AuthError::NotAuthenticated => "Usuário não autenticado.",
        AuthError::PasswordMismatch => "As novas senhas não coincidem.",
        AuthError::IncorrectPassword => "Senha atual incorreta.",
        AuthError::Storage(_) => INTERNAL_ERROR_MSG,
    }
}

fn error_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthError::NotAuthenticated => StatusCode::FORBIDDEN,
        AuthError::TokenNotFound | AuthError::PasswordMismatch | AuthError::IncorrectPassword => {
            StatusCode::BAD_REQUEST
        }
        AuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map an error to a response carrying its message under `key`.
fn auth_failure(err: AuthError, key: &str) -> AuthResponse {
    if !err.is_client_error() {
        tracing::error!("Auth request failed: {err}");
        return internal_error();
    }
    let mut body = serde_json::Map::new();
    body.insert(key.into(), error_message(&err).into());
    (error_status(&err), Json(body.into()))
}

fn internal_error() -> AuthResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": INTERNAL_ERROR_MSG})),
    )
}

pub(crate) fn bad_json(err: &JsonRejection) -> AuthResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": format!("Requisição inválida: {}", err.body_text())})),
    )
}

fn field_errors(errors: FieldErrors) -> AuthResponse {
    (StatusCode::BAD_REQUEST, Json(serde_json::json!(errors)))
}

/// POST /auth/token: exchange credentials for the user's token.
pub async fn handle_authenticate(
    State(state): State<AppState>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> AuthResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return bad_json(&e),
    };

    // Absent credentials are just wrong credentials.
    let (Some(username), Some(password)) = (
        body.username.filter(|u| !u.is_empty()),
        body.password.filter(|p| !p.is_empty()),
    ) else {
        tracing::warn!("Login without credentials");
        return auth_failure(AuthError::InvalidCredentials, "detail");
    };

    match state.auth.authenticate(&username, &password) {
        Ok(token) => (StatusCode::OK, Json(serde_json::json!({"token": token.key}))),
        Err(e) => auth_failure(e, "detail"),
    }
}

/// GET /auth/token: who owns the presented token.
pub async fn handle_resolve(State(state): State<AppState>, headers: HeaderMap) -> AuthResponse {
    match state.auth.resolve(authorization(&headers)) {
        Ok(identity) if identity.is_visitor() => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"username": identity.username()})),
        ),
        Ok(identity) => (
            StatusCode::OK,
            Json(serde_json::json!({"username": identity.username()})),
        ),
        Err(e) => auth_failure(e, "error"),
    }
}

/// DELETE /auth/token: log out.
pub async fn handle_revoke(State(state): State<AppState>, headers: HeaderMap) -> AuthResponse {
    match state.auth.revoke(authorization(&headers)) {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"msg": MSG_LOGOUT}))),
        Err(e) => auth_failure(e, "msg"),
    }
}

/// PUT /auth/token: change the password and receive a fresh token.
pub async fn handle_change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PasswordChangeBody>, JsonRejection>,
) -> AuthResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return bad_json(&e),
    };
    let change = match body.validate() {
        Ok(change) => change,
        Err(errors) => return field_errors(errors),
    };

    match state.auth.change_password(authorization(&headers), &change) {
        Ok(token) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "token": token.key,
                "message": MSG_PASSWORD_CHANGED,
            })),
        ),
        Err(e) => auth_failure(e, "error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::tests::test_state;
    use axum::http::HeaderValue;
    use tempfile::TempDir;

    fn login(username: &str, password: &str) -> Result<Json<LoginBody>, JsonRejection> {
        Ok(Json(LoginBody {
            username: Some(username.into()),
            password: Some(password.into()),
        }))
    }

    fn token_header(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Token {key}")).unwrap(),
        );
        headers
    }

    fn change(old: &str, new1: &str, new2: &str) -> Result<Json<PasswordChangeBody>, JsonRejection> {
        Ok(Json(PasswordChangeBody {
            old_password: Some(old.into()),
            new_password1: Some(new1.into()),
            new_password2: Some(new2.into()),
        }))
    }

    #[tokio::test]
    async fn login_returns_token_and_rejects_bad_password() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp);
        state.auth.register("alice", "p1").unwrap();

        let (status, Json(body)) = handle_authenticate(State(state.clone()), login("alice", "p1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token"].as_str().unwrap().len(), 40);

        let (status, Json(body)) = handle_authenticate(State(state), login("alice", "nope")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Credenciais inválidas.");
    }

    #[tokio::test]
    async fn login_without_credentials_is_unauthorized() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp);
        state.auth.register("alice", "p1").unwrap();

        let body = Ok(Json(LoginBody {
            username: None,
            password: None,
        }));
        let (status, Json(body)) = handle_authenticate(State(state.clone()), body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, serde_json::json!({"detail": "Credenciais inválidas."}));

        let body = Ok(Json(LoginBody {
            username: Some("alice".into()),
            password: Some(String::new()),
        }));
        let (status, Json(body)) = handle_authenticate(State(state), body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Credenciais inválidas.");
    }

    #[tokio::test]
    async fn resolve_without_token_is_visitor() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp);

        let (status, Json(body)) = handle_resolve(State(state.clone()), HeaderMap::new()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["username"], "visitante");

        let (status, _) = handle_resolve(State(state), token_header("abc123")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn logout_then_logout_again() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp);
        state.auth.register("bob", "pw").unwrap();
        let token = state.auth.authenticate("bob", "pw").unwrap();

        let (status, Json(body)) = handle_revoke(State(state.clone()), token_header(&token.key)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["msg"], MSG_LOGOUT);

        let (status, Json(body)) = handle_revoke(State(state), token_header(&token.key)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["msg"], "Token não encontrado.");
    }

    #[tokio::test]
    async fn password_change_rotates_token() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp);
        state.auth.register("carol", "p1").unwrap();
        let old = state.auth.authenticate("carol", "p1").unwrap();

        let (status, Json(body)) = handle_change_password(
            State(state.clone()),
            token_header(&old.key),
            change("p1", "p2", "p3"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "As novas senhas não coincidem.");

        let (status, Json(body)) = handle_change_password(
            State(state.clone()),
            token_header(&old.key),
            change("p1", "p2", "p2"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], MSG_PASSWORD_CHANGED);
        let new_key = body["token"].as_str().unwrap().to_string();
        assert_ne!(new_key, old.key);

        let (status, _) = handle_resolve(State(state.clone()), token_header(&old.key)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, Json(body)) = handle_resolve(State(state), token_header(&new_key)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "carol");
    }

    #[tokio::test]
    async fn password_change_requires_all_fields() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp);

        let body = Ok(Json(PasswordChangeBody {
            old_password: Some("p1".into()),
            new_password1: None,
            new_password2: Some("p2".into()),
        }));
        let (status, Json(body)) =
            handle_change_password(State(state), token_header("whatever"), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["new_password1"][0], MSG_REQUIRED);
        assert!(body.get("old_password").is_none());
    }

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(error_status(&AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(error_status(&AuthError::NotAuthenticated), StatusCode::FORBIDDEN);
        assert_eq!(error_status(&AuthError::TokenNotFound), StatusCode::BAD_REQUEST);
        let (status, Json(body)) =
            auth_failure(AuthError::Storage(anyhow::anyhow!("disk full")), "msg");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], INTERNAL_ERROR_MSG);
    }
}
