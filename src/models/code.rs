//! Single-use numeric codes for password reset and email two-factor.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserId;

/// What a numeric code authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodePurpose {
    PasswordReset,
    TwoFactorEmail,
}

impl CodePurpose {
    /// How long a freshly issued code stays valid.
    pub fn lifetime(&self) -> Duration {
        Duration::minutes(self.lifetime_minutes())
    }

    pub fn lifetime_minutes(&self) -> i64 {
        match self {
            CodePurpose::PasswordReset => 15,
            CodePurpose::TwoFactorEmail => 10,
        }
    }

    /// Two-factor codes are burned by the check itself; reset codes are
    /// burned explicitly once the new password is stored.
    pub fn consumes_on_verify(&self) -> bool {
        matches!(self, CodePurpose::TwoFactorEmail)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CodePurpose::PasswordReset => "password_reset",
            CodePurpose::TwoFactorEmail => "two_factor_email",
        }
    }
}

/// A stored numeric code row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericCode {
    pub id: Uuid,
    pub user_id: UserId,
    /// Six ASCII digits, zero-padded
    pub code: String,
    pub purpose: CodePurpose,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NumericCode {
    pub fn new(user_id: UserId, code: String, purpose: CodePurpose, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            code,
            purpose,
            expires_at: now + purpose.lifetime(),
            used_at: None,
            created_at: now,
        }
    }

    /// Unused and not yet expired.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}
