// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth sign-in routes shared by every provider.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::sign::{issue_session, AuthResponse};
use super::UserResponse;
use crate::error::{AppError, Result};
use crate::middleware::SessionId;
use crate::models::{OAuthProvider, UserId};
use crate::services::LoginOutcome;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        // Static segment wins over the capture
        .route("/auth/oauth/callback", get(oauth_callback))
        .route("/auth/oauth/{provider}", get(oauth_start))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizationUrlResponse {
    pub authorization_url: String,
}

/// Start a sign-in round trip; the client navigates to the returned URL.
async fn oauth_start(
    State(state): State<Arc<AppState>>,
    Extension(sid): Extension<SessionId>,
    Path(provider): Path<String>,
) -> Result<Json<AuthorizationUrlResponse>> {
    let provider: OAuthProvider = provider.parse()?;
    let authorization_url =
        state
            .oauth
            .authorization_url(&sid.pending(&state), provider, None)?;
    Ok(Json(AuthorizationUrlResponse { authorization_url }))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Result of a linking round trip.
#[derive(Debug, Serialize, Deserialize)]
pub struct LinkResponse {
    pub linked: OAuthProvider,
    pub user: UserResponse,
}

/// Provider redirect target. The pending flow says which provider this is
/// and whether the user is signing in or linking.
async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Extension(sid): Extension<SessionId>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<Response> {
    let session = sid.pending(&state);

    if let Some(error) = params.error.as_deref() {
        tracing::info!(error = %error, "OAuth authorization denied");
        state.oauth.cancel(&session);
        return Err(AppError::OAuthDenied);
    }

    let pending = state
        .oauth
        .pending_flow(&session)
        .ok_or(AppError::StateMismatch)?;
    let (Some(code), Some(oauth_state)) = (params.code.as_deref(), params.state.as_deref())
    else {
        state.oauth.cancel(&session);
        return Err(AppError::StateMismatch);
    };

    let oauth_user = state
        .oauth
        .handle_callback(&session, pending.provider, code, oauth_state)
        .await?;

    if let Some(user_id) = pending.link_user_id {
        return link(&state, user_id, pending.provider, &oauth_user.provider_id).await;
    }

    if oauth_user.email.is_empty() {
        return Err(AppError::OAuthEmailMissing);
    }

    let user = state.identity.authenticate(&oauth_user).await?;
    if !user.is_active {
        tracing::info!(user_id = %user.id, "OAuth sign-in on disabled account");
        return Err(AppError::AccountDisabled);
    }

    match state.two_factor.begin_login(&session, user, true).await? {
        LoginOutcome::Authenticated(user) => {
            Ok(issue_session(&state, jar, &user, true)?.into_response())
        }
        // An undelivered code is already logged; the client offers resend
        LoginOutcome::TwoFactorRequired { factor, code_sent } => {
            Ok(Json(AuthResponse::TwoFactorRequired { factor, code_sent }).into_response())
        }
    }
}

async fn link(
    state: &AppState,
    user_id: UserId,
    provider: OAuthProvider,
    provider_id: &str,
) -> Result<Response> {
    let user = state
        .identity
        .link_provider(user_id, provider, provider_id)
        .await?;
    Ok(Json(LinkResponse {
        linked: provider,
        user: UserResponse::from(&user),
    })
    .into_response())
}
