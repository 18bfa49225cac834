// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT session tokens and the authentication middleware.

use crate::error::AppError;
use crate::models::{Role, UserId};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cookie carrying the session JWT.
pub const SESSION_COOKIE: &str = "session_token";

/// Session lifetime with "remember me".
pub const REMEMBER_SECS: u64 = 14 * 24 * 60 * 60;
/// Session lifetime without it.
pub const SHORT_SESSION_SECS: u64 = 20 * 60;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    pub role: Role,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Authenticated user extracted from JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
    pub role: Role,
}

/// Middleware that requires valid JWT authentication.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Try cookie first, then header
    let token = if let Some(cookie) = jar.get(SESSION_COOKIE) {
        cookie.value().to_string()
    } else {
        let auth_header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) => token.to_string(),
            None => return Err(AppError::Unauthorized),
        }
    };

    let claims = decode_jwt(&token, &state.config.jwt_signing_key)?;
    let user_id: UserId = claims.sub.parse().map_err(|_| AppError::Unauthorized)?;

    request.extensions_mut().insert(AuthUser {
        user_id,
        role: claims.role,
    });

    Ok(next.run(request).await)
}

/// Create a JWT for a user session.
pub fn create_jwt(
    user_id: UserId,
    role: Role,
    remember: bool,
    signing_key: &[u8],
) -> Result<String, AppError> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_secs() as usize;
    let lifetime = if remember {
        REMEMBER_SECS
    } else {
        SHORT_SESSION_SECS
    };

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        iat: now,
        exp: now + lifetime as usize,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT encoding failed: {}", e)))
}

/// Validate signature and expiry.
pub fn decode_jwt(token: &str, signing_key: &[u8]) -> Result<Claims, AppError> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|_| AppError::Unauthorized)
}

/// Session cookie for a freshly issued token. Without "remember me" it is a
/// browser-session cookie.
pub fn session_cookie(token: String, remember: bool, secure: bool) -> Cookie<'static> {
    let mut builder = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax);
    if remember {
        builder = builder.max_age(time::Duration::seconds(REMEMBER_SECS as i64));
    }
    builder.build()
}

/// Removal cookie matching the attributes of `session_cookie`.
pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const KEY: &[u8] = b"test_signing_key_32_bytes_long!!";

    #[test]
    fn test_jwt_roundtrip() {
        let user_id = Uuid::new_v4();
        let token = create_jwt(user_id, Role::Admin, false, KEY).unwrap();
        let claims = decode_jwt(&token, KEY).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, SHORT_SESSION_SECS as usize);
    }

    #[test]
    fn test_remember_extends_lifetime() {
        let token = create_jwt(Uuid::new_v4(), Role::Member, true, KEY).unwrap();
        let claims = decode_jwt(&token, KEY).unwrap();
        assert_eq!(claims.exp - claims.iat, REMEMBER_SECS as usize);
    }

    #[test]
    fn test_wrong_key_rejected() {
        let token = create_jwt(Uuid::new_v4(), Role::Member, true, KEY).unwrap();
        assert!(matches!(
            decode_jwt(&token, b"another_key_that_is_32_bytes!!!!"),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("t".to_string(), false, true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), None);

        let cookie = session_cookie("t".to_string(), true, false);
        assert!(cookie.max_age().is_some());
    }
}
