// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for signed-in users: profile and security settings.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::oauth::AuthorizationUrlResponse;
use super::sign::CodeRequest;
use super::{StatusResponse, UserResponse, ValidatedJson};
use crate::error::{AppError, Result};
use crate::middleware::{AuthUser, SessionId};
use crate::models::{OAuthProvider, TwoFactorType, User};
use crate::services::{ProfileUpdate, TotpSetup};
use crate::AppState;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me).put(update_me))
        .route("/api/security", get(get_security))
        .route(
            "/api/security/password",
            post(set_password).put(change_password),
        )
        .route("/api/security/totp", post(setup_totp))
        .route("/api/security/totp/confirm", post(confirm_totp))
        .route("/api/security/email", post(setup_email))
        .route("/api/security/email/confirm", post(confirm_email))
        .route("/api/security/email/resend", post(resend_email_code))
        .route(
            "/api/security/two-factor",
            axum::routing::delete(disable_two_factor),
        )
        .route(
            "/api/security/link/{provider}",
            get(start_link).delete(unlink),
        )
}

/// Load the signed-in user; a token for a vanished account is no session.
async fn current_user(state: &AppState, auth: &AuthUser) -> Result<User> {
    let user = state
        .users
        .find_by_id(auth.user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if !user.is_active {
        return Err(AppError::AccountDisabled);
    }
    Ok(user)
}

// ─── Profile ─────────────────────────────────────────────────

async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let user = current_user(&state, &auth).await?;
    Ok(Json(UserResponse::from(&user)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub nickname: Option<String>,
    #[serde(default)]
    #[validate(length(max = 30))]
    pub phone: Option<String>,
}

async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<ProfileRequest>,
) -> Result<Json<UserResponse>> {
    let user = current_user(&state, &auth).await?;
    let user = state
        .credentials
        .update_profile(
            user.id,
            ProfileUpdate {
                first_name: req.first_name,
                last_name: req.last_name,
                nickname: req.nickname,
                phone: req.phone,
            },
        )
        .await?;
    Ok(Json(UserResponse::from(&user)))
}

// ─── Security overview ───────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct SecurityResponse {
    pub has_password: bool,
    pub two_factor_type: TwoFactorType,
    pub two_factor_verified: bool,
    pub linked_providers: Vec<OAuthProvider>,
    /// Providers that can be linked on this deployment
    pub available_providers: Vec<OAuthProvider>,
}

async fn get_security(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<SecurityResponse>> {
    let user = current_user(&state, &auth).await?;
    Ok(Json(SecurityResponse {
        has_password: user.has_password(),
        two_factor_type: user.two_factor_type,
        two_factor_verified: user.two_factor_verified,
        linked_providers: user.linked_providers(),
        available_providers: state.oauth.available_providers(),
    }))
}

// ─── Password ────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct SetPasswordRequest {
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(must_match(other = "password"))]
    pub password_confirmation: String,
}

/// First password for an OAuth-only account.
async fn set_password(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<SetPasswordRequest>,
) -> Result<Json<StatusResponse>> {
    let user = current_user(&state, &auth).await?;
    state.credentials.set_password(user.id, &req.password).await?;
    Ok(StatusResponse::new("password_set"))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(must_match(other = "password"))]
    pub password_confirmation: String,
}

async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<Json<StatusResponse>> {
    let user = current_user(&state, &auth).await?;
    state
        .credentials
        .change_password(user.id, &req.current_password, &req.password)
        .await?;
    Ok(StatusResponse::new("password_changed"))
}

// ─── Two-factor enrollment ───────────────────────────────────

async fn setup_totp(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<TotpSetup>> {
    let user = current_user(&state, &auth).await?;
    Ok(Json(state.two_factor.setup_totp(user.id).await?))
}

async fn confirm_totp(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<CodeRequest>,
) -> Result<Json<UserResponse>> {
    let user = current_user(&state, &auth).await?;
    let user = state.two_factor.confirm_totp(user.id, &req.code).await?;
    Ok(Json(UserResponse::from(&user)))
}

async fn setup_email(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let user = current_user(&state, &auth).await?;
    let user = state.two_factor.setup_email(user.id).await?;
    Ok(Json(UserResponse::from(&user)))
}

async fn confirm_email(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<CodeRequest>,
) -> Result<Json<UserResponse>> {
    let user = current_user(&state, &auth).await?;
    let user = state.two_factor.confirm_email(user.id, &req.code).await?;
    Ok(Json(UserResponse::from(&user)))
}

async fn resend_email_code(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<StatusResponse>> {
    let user = current_user(&state, &auth).await?;
    state.two_factor.resend_setup_code(user.id).await?;
    Ok(StatusResponse::new("code_sent"))
}

// TODO: require the current password (or a fresh code) before disabling
async fn disable_two_factor(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let user = current_user(&state, &auth).await?;
    let user = state.two_factor.disable(user.id).await?;
    Ok(Json(UserResponse::from(&user)))
}

// ─── Provider links ──────────────────────────────────────────

/// Start a linking round trip; the callback attaches the identity.
async fn start_link(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Extension(sid): Extension<SessionId>,
    Path(provider): Path<String>,
) -> Result<Json<AuthorizationUrlResponse>> {
    let provider: OAuthProvider = provider.parse()?;
    let user = current_user(&state, &auth).await?;
    if user.provider_id(provider).is_some() {
        return Err(AppError::ProviderAlreadyLinked(provider));
    }

    let authorization_url =
        state
            .oauth
            .authorization_url(&sid.pending(&state), provider, Some(user.id))?;
    Ok(Json(AuthorizationUrlResponse { authorization_url }))
}

async fn unlink(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(provider): Path<String>,
) -> Result<Json<UserResponse>> {
    let provider: OAuthProvider = provider.parse()?;
    let user = current_user(&state, &auth).await?;
    let user = state.identity.unlink_provider(user.id, provider).await?;
    Ok(Json(UserResponse::from(&user)))
}
