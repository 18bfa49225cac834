// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Password sign-up, sign-in, second-factor step and sign-out.

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::{StatusResponse, UserResponse, ValidatedJson};
use crate::error::{AppError, Result};
use crate::middleware::auth::{clear_session_cookie, create_jwt, session_cookie};
use crate::middleware::session::{mint_sid, sid_cookie};
use crate::middleware::SessionId;
use crate::models::{TwoFactorType, User};
use crate::services::{LoginOutcome, SignUp};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/two-factor", post(two_factor))
        .route("/auth/two-factor/resend", post(resend_two_factor))
        .route("/auth/sign-out", post(sign_out))
}

/// Result of a sign-in attempt.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuthResponse {
    /// Session cookie set
    Authenticated { user: UserResponse },
    /// Submit a code to `/auth/two-factor`
    TwoFactorRequired {
        factor: TwoFactorType,
        code_sent: bool,
    },
}

/// Issue the session cookie for `user` and rotate the browser session id.
pub(crate) fn issue_session(
    state: &AppState,
    jar: CookieJar,
    user: &User,
    remember: bool,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let token = create_jwt(user.id, user.role, remember, &state.config.jwt_signing_key)?;
    let sid = mint_sid(&state.config.jwt_signing_key)?;
    let jar = jar
        .add(session_cookie(
            token,
            remember,
            state.config.secure_cookies(),
        ))
        .add(sid_cookie(sid, state.config.secure_cookies()));
    tracing::info!(user_id = %user.id, remember, "Session issued");

    Ok((
        jar,
        Json(AuthResponse::Authenticated {
            user: UserResponse::from(user),
        }),
    ))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(must_match(other = "password"))]
    pub password_confirmation: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[serde(default)]
    #[validate(length(max = 30))]
    pub phone: Option<String>,
}

/// Register and sign in straight away.
async fn sign_up(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<SignUpRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>)> {
    let user = state
        .credentials
        .sign_up(SignUp {
            email: req.email,
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
            phone: req.phone,
        })
        .await?;

    let (jar, body) = issue_session(&state, jar, &user, false)?;
    Ok((StatusCode::CREATED, jar, body))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignInRequest {
    #[validate(length(min = 1))]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

async fn sign_in(
    State(state): State<Arc<AppState>>,
    Extension(sid): Extension<SessionId>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<SignInRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let user = state
        .credentials
        .authenticate_password(&req.email, &req.password)
        .await?;

    let session = sid.pending(&state);
    match state
        .two_factor
        .begin_login(&session, user, req.remember)
        .await?
    {
        LoginOutcome::Authenticated(user) => issue_session(&state, jar, &user, req.remember),
        LoginOutcome::TwoFactorRequired {
            code_sent: false, ..
        } => Err(AppError::MailDelivery(
            "sign-in code could not be sent".to_string(),
        )),
        LoginOutcome::TwoFactorRequired { factor, code_sent } => Ok((
            jar,
            Json(AuthResponse::TwoFactorRequired { factor, code_sent }),
        )),
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CodeRequest {
    #[validate(length(min = 1, max = 20))]
    pub code: String,
}

async fn two_factor(
    State(state): State<Arc<AppState>>,
    Extension(sid): Extension<SessionId>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<CodeRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let session = sid.pending(&state);
    let (user, remember) = state.two_factor.complete_login(&session, &req.code).await?;
    issue_session(&state, jar, &user, remember)
}

async fn resend_two_factor(
    State(state): State<Arc<AppState>>,
    Extension(sid): Extension<SessionId>,
) -> Result<Json<StatusResponse>> {
    let session = sid.pending(&state);
    state.two_factor.resend_login_code(&session).await?;
    Ok(StatusResponse::new("code_sent"))
}

async fn sign_out(jar: CookieJar) -> (StatusCode, CookieJar) {
    (StatusCode::NO_CONTENT, jar.remove(clear_session_cookie()))
}
