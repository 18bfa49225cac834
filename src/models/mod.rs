// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod code;
pub mod oauth;
pub mod pending;
pub mod user;

pub use code::{CodePurpose, NumericCode};
pub use oauth::{OAuthProvider, OAuthUser};
pub use pending::{OAuthPending, PasswordResetPending, PendingState, TwoFactorPending};
pub use user::{NewUser, Role, TwoFactorType, User, UserId};
