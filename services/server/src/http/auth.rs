use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::http::response::{conflict, internal_error};
use crate::{auth, repo, state::AppState};

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 50;
const MIN_PASSWORD_LEN: usize = 6;
const MAX_PASSWORD_LEN: usize = 255;

#[derive(Deserialize)]
pub struct AccountRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
}

/// `POST /create_account` — 201 on success, 409 if the username is taken.
pub async fn create_account(
    State(state): State<AppState>,
    Json(body): Json<AccountRequest>,
) -> Response {
    let username = body.username.trim();
    if username.chars().count() < MIN_USERNAME_LEN || username.chars().count() > MAX_USERNAME_LEN
    {
        return crate::http::response::bad_request(format!(
            "username must be between {MIN_USERNAME_LEN} and {MAX_USERNAME_LEN} characters"
        ));
    }
    if body.password.len() < MIN_PASSWORD_LEN || body.password.len() > MAX_PASSWORD_LEN {
        return crate::http::response::bad_request(format!(
            "password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters"
        ));
    }

    let password_hash = match auth::hash_password(&body.password) {
        Ok(hash) => hash,
        Err(err) => return internal_error(err),
    };

    match repo::users::create_account(&state.pool, username, &password_hash).await {
        Ok(true) => (
            StatusCode::CREATED,
            Json(StatusResponse {
                status: "account created".to_owned(),
            }),
        )
            .into_response(),
        Ok(false) => conflict("account already exists"),
        Err(err) => internal_error(err),
    }
}

/// `POST /auth/token` — exchanges credentials for a bearer token.
pub async fn issue_token(
    State(state): State<AppState>,
    Json(body): Json<AccountRequest>,
) -> Response {
    let username = body.username.trim();
    let credentials = match repo::users::credentials(&state.pool, username).await {
        Ok(Some(credentials)) => credentials,
        Ok(None) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(err) => return internal_error(err),
    };

    if credentials.disabled || !auth::verify_password(&body.password, &credentials.password_hash)
    {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match state.auth.issue(username) {
        Ok(access_token) => Json(TokenResponse {
            access_token,
            token_type: "bearer".to_owned(),
        })
        .into_response(),
        Err(err) => internal_error(err),
    }
}
