// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Forgotten-password routes.

use axum::{extract::State, routing::post, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::sign::CodeRequest;
use super::{StatusResponse, ValidatedJson};
use crate::error::Result;
use crate::middleware::SessionId;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/password/reset", post(request_reset))
        .route("/auth/password/verify", post(verify_code))
        .route("/auth/password/new", post(set_new_password))
        .route("/auth/password/resend", post(resend_code))
}

/// Same body whether or not the address belongs to an account.
pub const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists for this address, a reset code has been sent.";

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetRequestedResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetRequest {
    #[validate(email)]
    pub email: String,
}

async fn request_reset(
    State(state): State<Arc<AppState>>,
    Extension(sid): Extension<SessionId>,
    ValidatedJson(req): ValidatedJson<ResetRequest>,
) -> Result<Json<ResetRequestedResponse>> {
    state
        .password_reset
        .request(&sid.pending(&state), &req.email)
        .await?;
    Ok(Json(ResetRequestedResponse {
        status: "requested".to_string(),
        message: RESET_REQUESTED_MESSAGE.to_string(),
    }))
}

async fn verify_code(
    State(state): State<Arc<AppState>>,
    Extension(sid): Extension<SessionId>,
    ValidatedJson(req): ValidatedJson<CodeRequest>,
) -> Result<Json<StatusResponse>> {
    state
        .password_reset
        .verify(&sid.pending(&state), &req.code)
        .await?;
    Ok(StatusResponse::new("verified"))
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewPasswordRequest {
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(must_match(other = "password"))]
    pub password_confirmation: String,
}

async fn set_new_password(
    State(state): State<Arc<AppState>>,
    Extension(sid): Extension<SessionId>,
    ValidatedJson(req): ValidatedJson<NewPasswordRequest>,
) -> Result<Json<StatusResponse>> {
    state
        .password_reset
        .set_new_password(&sid.pending(&state), &req.password)
        .await?;
    Ok(StatusResponse::new("password_changed"))
}

async fn resend_code(
    State(state): State<Arc<AppState>>,
    Extension(sid): Extension<SessionId>,
) -> Result<Json<StatusResponse>> {
    state.password_reset.resend(&sid.pending(&state)).await?;
    Ok(StatusResponse::new("code_sent"))
}
