// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Browser session id for pending multi-step state.
//!
//! Every request gets a `SessionId` extension. The id comes from the `sid`
//! cookie when it carries a valid server signature, or is minted and set on
//! the response otherwise. Ids are `token.signature`, both base64url.

use crate::db::PendingSession;
use crate::error::AppError;
use crate::random::random_token;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Cookie carrying the session id.
pub const SID_COOKIE: &str = "sid";

/// Keeps sid signatures distinct from anything else signed with the same key.
const SID_CONTEXT: &[u8] = b"membership-auth sid|";

/// Session id for the current request.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

impl SessionId {
    /// Handle on this session's pending records.
    pub fn pending(&self, state: &AppState) -> PendingSession {
        state.pending.session(self.0.clone())
    }
}

fn sid_mac(key: &[u8], token: &str) -> Result<HmacSha256, AppError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(SID_CONTEXT);
    mac.update(token.as_bytes());
    Ok(mac)
}

/// Fresh signed session id.
pub fn mint_sid(key: &[u8]) -> Result<String, AppError> {
    let token = random_token()?;
    let signature = sid_mac(key, &token)?.finalize().into_bytes();
    Ok(format!("{}.{}", token, URL_SAFE_NO_PAD.encode(signature)))
}

/// True only for ids this server minted with `key`.
fn verify_sid(sid: &str, key: &[u8]) -> bool {
    let Some((token, signature)) = sid.split_once('.') else {
        return false;
    };
    let Ok(signature) = URL_SAFE_NO_PAD.decode(signature) else {
        return false;
    };
    sid_mac(key, token)
        .map(|mac| mac.verify_slice(&signature).is_ok())
        .unwrap_or(false)
}

/// Cookie holding `sid`.
pub fn sid_cookie(sid: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SID_COOKIE, sid))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn sets_sid(response: &Response) -> bool {
    let prefix = format!("{}=", SID_COOKIE);
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .any(|v| v.to_str().is_ok_and(|s| s.starts_with(&prefix)))
}

/// Attach a `SessionId`, minting one when the cookie is missing or not ours.
pub async fn ensure_session_id(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let key = &state.config.jwt_signing_key;
    let existing = jar
        .get(SID_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| verify_sid(v, key));

    let (sid, minted) = match existing {
        Some(sid) => (sid, false),
        None => match mint_sid(key) {
            Ok(sid) => (sid, true),
            Err(e) => return e.into_response(),
        },
    };

    request.extensions_mut().insert(SessionId(sid.clone()));
    let response = next.run(request).await;

    // A handler that rotated the id has already set the cookie
    if !minted || sets_sid(&response) {
        return response;
    }

    let cookie = sid_cookie(sid, state.config.secure_cookies());
    (jar.add(cookie), response).into_response()
}
