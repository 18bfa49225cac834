//! User model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::oauth::{OAuthProvider, OAuthUser};

/// Stable user identifier.
pub type UserId = Uuid;

/// First name used for OAuth accounts whose provider shares none.
pub const DEFAULT_FIRST_NAME: &str = "Member";

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }
}

/// Second-factor channel a user enrolled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TwoFactorType {
    #[default]
    None,
    Totp,
    Email,
}

/// Persisted user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Unique, compared exactly as stored
    pub email: String,
    /// Argon2 PHC string; `None` for OAuth-only accounts
    pub password_hash: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub phone: Option<String>,
    pub google_id: Option<String>,
    pub facebook_id: Option<String>,
    pub discord_id: Option<String>,
    pub two_factor_type: TwoFactorType,
    /// Base32 TOTP secret, only present while `two_factor_type` is `Totp`
    pub two_factor_secret: Option<String>,
    /// Factor enrolled and confirmed
    pub two_factor_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_password(&self) -> bool {
        self.password_hash.as_deref().is_some_and(|h| !h.is_empty())
    }

    /// External id linked for `provider`, if any.
    pub fn provider_id(&self, provider: OAuthProvider) -> Option<&str> {
        let id = match provider {
            OAuthProvider::Google => &self.google_id,
            OAuthProvider::Facebook => &self.facebook_id,
            OAuthProvider::Discord => &self.discord_id,
        };
        id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn set_provider_id(&mut self, provider: OAuthProvider, provider_id: Option<String>) {
        let slot = match provider {
            OAuthProvider::Google => &mut self.google_id,
            OAuthProvider::Facebook => &mut self.facebook_id,
            OAuthProvider::Discord => &mut self.discord_id,
        };
        *slot = provider_id;
    }

    pub fn linked_providers(&self) -> Vec<OAuthProvider> {
        OAuthProvider::ALL
            .into_iter()
            .filter(|p| self.provider_id(*p).is_some())
            .collect()
    }

    /// Whether login must pass through the second-factor checkpoint.
    pub fn requires_second_factor(&self) -> bool {
        self.two_factor_type != TwoFactorType::None && self.two_factor_verified
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Fields for inserting a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub provider_link: Option<(OAuthProvider, String)>,
}

impl NewUser {
    /// Sign-up with email and password.
    pub fn with_password(
        email: impl Into<String>,
        password_hash: String,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        phone: Option<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password_hash: Some(password_hash),
            first_name: first_name.into(),
            last_name: last_name.into(),
            phone,
            role: Role::Member,
            is_active: true,
            provider_link: None,
        }
    }

    /// First login through an external provider; no password is set.
    pub fn from_oauth(oauth_user: &OAuthUser) -> Self {
        Self {
            email: oauth_user.email.clone(),
            password_hash: None,
            first_name: oauth_user
                .first_name
                .clone()
                .unwrap_or_else(|| DEFAULT_FIRST_NAME.to_string()),
            last_name: oauth_user.last_name.clone().unwrap_or_default(),
            phone: None,
            role: Role::Member,
            is_active: true,
            provider_link: Some((oauth_user.provider, oauth_user.provider_id.clone())),
        }
    }

    /// Materialize the record with a fresh id and timestamps.
    pub fn into_user(self, now: DateTime<Utc>) -> User {
        let mut user = User {
            id: Uuid::new_v4(),
            email: self.email,
            password_hash: self.password_hash,
            role: self.role,
            is_active: self.is_active,
            first_name: self.first_name,
            last_name: self.last_name,
            nickname: None,
            phone: self.phone,
            google_id: None,
            facebook_id: None,
            discord_id: None,
            two_factor_type: TwoFactorType::None,
            two_factor_secret: None,
            two_factor_verified: false,
            created_at: now,
            updated_at: now,
        };
        if let Some((provider, provider_id)) = self.provider_link {
            user.set_provider_id(provider, Some(provider_id));
        }
        user
    }
}
