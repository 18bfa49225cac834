// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! External identity providers and their normalized user payload.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Supported OAuth providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Facebook,
    Discord,
}

impl OAuthProvider {
    pub const ALL: [OAuthProvider; 3] = [
        OAuthProvider::Google,
        OAuthProvider::Facebook,
        OAuthProvider::Discord,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Facebook => "facebook",
            OAuthProvider::Discord => "discord",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "Google",
            OAuthProvider::Facebook => "Facebook",
            OAuthProvider::Discord => "Discord",
        }
    }

    /// Scopes requested at authorization time.
    pub fn scopes(&self) -> &'static [&'static str] {
        match self {
            OAuthProvider::Google => &["email", "profile"],
            OAuthProvider::Facebook => &["email", "public_profile"],
            OAuthProvider::Discord => &["identify", "email"],
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(OAuthProvider::Google),
            "facebook" => Ok(OAuthProvider::Facebook),
            "discord" => Ok(OAuthProvider::Discord),
            other => Err(AppError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Provider profile reduced to the fields account reconciliation needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthUser {
    pub provider: OAuthProvider,
    pub provider_id: String,
    /// Empty when the provider shared no email
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl OAuthUser {
    pub fn full_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            self.email.clone()
        } else {
            name
        }
    }
}
