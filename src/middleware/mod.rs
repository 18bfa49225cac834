// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (authentication, session id, security headers).

pub mod auth;
pub mod security;
pub mod session;

pub use auth::{require_auth, AuthUser};
pub use session::{ensure_session_id, SessionId};
