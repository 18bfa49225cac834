//! Transient per-session records that bridge multi-step flows.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

use super::oauth::OAuthProvider;
use super::user::{TwoFactorType, UserId};

/// A record kept in the pending-state store under its own namespace.
pub trait PendingState: Serialize + DeserializeOwned {
    const NAMESPACE: &'static str;
    const TTL: Duration;
}

/// OAuth round trip in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthPending {
    pub state: String,
    pub provider: OAuthProvider,
    /// Set when an authenticated user is linking rather than signing in
    pub link_user_id: Option<UserId>,
}

impl PendingState for OAuthPending {
    const NAMESPACE: &'static str = "oauth";
    const TTL: Duration = Duration::from_secs(10 * 60);
}

/// Primary credential accepted, second factor outstanding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoFactorPending {
    pub user_id: UserId,
    pub factor: TwoFactorType,
    pub remember: bool,
}

impl PendingState for TwoFactorPending {
    const NAMESPACE: &'static str = "two_factor";
    const TTL: Duration = Duration::from_secs(10 * 60);
}

/// Password reset progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetPending {
    pub user_id: UserId,
    pub email: String,
    #[serde(default)]
    pub verified: bool,
    /// Code accepted at the verify step, re-checked before the password changes
    #[serde(default)]
    pub code: Option<String>,
}

impl PendingState for PasswordResetPending {
    const NAMESPACE: &'static str = "password_reset";
    const TTL: Duration = Duration::from_secs(20 * 60);
}
