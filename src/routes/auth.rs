use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use chrono::Utc;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::{AppState, AuthUser};
use crate::auth::{
    generate_token, hash_password, hash_token, reset_token_expired, verify_password,
    ACCESS_TOKEN_LENGTH, RESET_TOKEN_LENGTH,
};
use crate::db::{is_unique_violation, Database};
use crate::error::ApiError;
use crate::validation::{ValidationErrors, MAX_NAME_LENGTH};

const RESET_REQUESTED: &str =
    "We have sent a password reset token if the email exists in our system.";
const INVALID_RESET: &str = "Invalid or expired password reset link";
const EXPIRED_RESET: &str = "Password reset link has expired";
const BAD_CREDENTIALS: &str = "The provided credentials are incorrect.";
const EMAIL_TAKEN: &str = "The email has already been taken.";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
    pub reset_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ForgotPasswordResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_link: Option<String>,
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim)
}

async fn issue_token(db: &Database, user_id: i64) -> anyhow::Result<TokenResponse> {
    let token = generate_token(ACCESS_TOKEN_LENGTH);
    db.create_token(user_id, &hash_token(&token)).await?;
    Ok(TokenResponse {
        access_token: token,
        token_type: "Bearer",
    })
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = payload?;
    let name = trimmed(&request.name);
    let email = trimmed(&request.email);

    let mut errors = ValidationErrors::new();
    if errors.require("name", name) {
        errors.max_length("name", name, MAX_NAME_LENGTH);
    }
    errors.email("email", email);
    errors.confirmed_password(
        "password",
        request.password.as_deref(),
        request.password_confirmation.as_deref(),
    );
    if let Some(email) = email.filter(|_| errors.get("email").is_none()) {
        if state.db.find_user_by_email(email).await?.is_some() {
            errors.add("email", EMAIL_TAKEN);
        }
    }
    errors.into_result()?;

    let email = email.unwrap_or_default();
    let password_hash = hash_password(request.password.as_deref().unwrap_or_default())?;
    // A concurrent registration can still win the race to the UNIQUE index
    let user_id = match state
        .db
        .create_user(name.unwrap_or_default(), email, &password_hash)
        .await
    {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => {
            return Err(ValidationErrors::single("email", EMAIL_TAKEN).into());
        }
        Err(e) => return Err(e.into()),
    };
    info!("Registered user {}", user_id);

    Ok(Json(issue_token(&state.db, user_id).await?))
}

/// Successful login revokes every token issued before it.
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = payload?;
    let email = trimmed(&request.email);

    let mut errors = ValidationErrors::new();
    errors.email("email", email);
    errors.require("password", request.password.as_deref());
    errors.into_result()?;

    let user = state
        .db
        .find_user_by_email(email.unwrap_or_default())
        .await?
        .filter(|user| {
            verify_password(
                request.password.as_deref().unwrap_or_default(),
                &user.password_hash,
            )
        })
        .ok_or_else(|| ValidationErrors::single("email", BAD_CREDENTIALS))?;

    let revoked = state.db.revoke_tokens(user.id).await?;
    info!("User {} logged in, revoked {} tokens", user.id, revoked);

    Ok(Json(issue_token(&state.db, user.id).await?))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, ApiError> {
    state.db.revoke_tokens(user.id).await?;
    info!("User {} logged out", user.id);

    Ok(Json(json!({ "message": "User logged out successfully" })))
}

/// Always answers with the same message so callers cannot probe for accounts.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Json<ForgotPasswordResponse>, ApiError> {
    let Json(request) = payload?;
    let email = trimmed(&request.email);
    let reset_url = trimmed(&request.reset_url).filter(|url| !url.is_empty());

    let mut errors = ValidationErrors::new();
    errors.email("email", email);
    if reset_url.is_some_and(|url| Url::parse(url).is_err()) {
        errors.add("reset_url", "The reset url field must be a valid URL.");
    }
    errors.into_result()?;

    let mut response = ForgotPasswordResponse {
        message: RESET_REQUESTED,
        token: None,
        reset_link: None,
    };

    let email = email.unwrap_or_default();
    if state.db.find_user_by_email(email).await?.is_none() {
        return Ok(Json(response));
    }

    let token = generate_token(RESET_TOKEN_LENGTH);
    state
        .db
        .replace_password_reset(email, &hash_token(&token), Utc::now())
        .await?;
    info!("Issued password reset token");

    if state.expose_reset_tokens {
        response.reset_link =
            reset_url.map(|url| url.replace("{token}", &token).replace("{email}", email));
        response.token = Some(token);
    }

    Ok(Json(response))
}

/// Reset tokens are single use; a successful reset also signs out every session.
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let email = trimmed(&request.email);
    let token = trimmed(&request.token);

    let mut errors = ValidationErrors::new();
    errors.require("token", token);
    errors.email("email", email);
    errors.confirmed_password(
        "password",
        request.password.as_deref(),
        request.password_confirmation.as_deref(),
    );
    errors.into_result()?;

    let email = email.unwrap_or_default();
    let user = state
        .db
        .find_user_by_email(email)
        .await?
        .ok_or(ApiError::BadRequest(INVALID_RESET))?;

    let reset = state
        .db
        .find_password_reset(email)
        .await?
        .filter(|reset| reset.token_hash == hash_token(token.unwrap_or_default()))
        .ok_or(ApiError::BadRequest(INVALID_RESET))?;

    if reset_token_expired(reset.created_at, Utc::now()) {
        state.db.delete_password_reset(email).await?;
        return Err(ApiError::BadRequest(EXPIRED_RESET));
    }

    let password_hash = hash_password(request.password.as_deref().unwrap_or_default())?;
    state.db.update_password(user.id, &password_hash).await?;
    state.db.delete_password_reset(email).await?;
    state.db.revoke_tokens(user.id).await?;
    info!("Password reset for user {}", user.id);

    Ok(Json(json!({
        "message": "Your password has been reset successfully",
        "login_url": "/login"
    })))
}
