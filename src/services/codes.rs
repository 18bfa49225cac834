//! Numeric code issuance and verification.

use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::db::CodeStore;
use crate::error::AppError;
use crate::models::{CodePurpose, NumericCode, UserId};
use crate::random;

/// Days past expiry before the cleanup task deletes a code.
const RETENTION_DAYS: i64 = 1;

/// Issues and checks six-digit codes for password reset and email 2FA.
#[derive(Clone)]
pub struct CodeService {
    store: Arc<dyn CodeStore>,
}

impl CodeService {
    pub fn new(store: Arc<dyn CodeStore>) -> Self {
        Self { store }
    }

    /// Invalidate live codes for (user, purpose) and issue a fresh one.
    pub async fn create_code(
        &self,
        user_id: UserId,
        purpose: CodePurpose,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let invalidated = self.store.invalidate_live(user_id, purpose, now).await?;

        let code = random::numeric_code()?;
        self.store
            .insert(NumericCode::new(user_id, code.clone(), purpose, now))
            .await?;

        tracing::debug!(
            user_id = %user_id,
            purpose = purpose.as_str(),
            invalidated,
            "Numeric code issued"
        );
        Ok(code)
    }

    /// Whether `code` is live for (user, purpose). Two-factor codes are
    /// consumed by a successful check.
    pub async fn verify_code(
        &self,
        user_id: UserId,
        code: &str,
        purpose: CodePurpose,
    ) -> Result<bool, AppError> {
        let code = code.trim();
        if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(false);
        }

        let now = Utc::now();
        if purpose.consumes_on_verify() {
            self.store.consume_live(user_id, code, purpose, now).await
        } else {
            Ok(self
                .store
                .find_live(user_id, code, purpose, now)
                .await?
                .is_some())
        }
    }

    /// Burn a password-reset code once the new password is stored.
    pub async fn mark_used(&self, user_id: UserId, code: &str) -> Result<(), AppError> {
        let count = self
            .store
            .mark_all_used(user_id, code, CodePurpose::PasswordReset, Utc::now())
            .await?;
        tracing::debug!(user_id = %user_id, count, "Reset code marked used");
        Ok(())
    }

    /// Delete codes that expired more than a day ago.
    pub async fn cleanup_expired(&self) -> Result<usize, AppError> {
        self.store
            .delete_expired_before(Utc::now() - Duration::days(RETENTION_DAYS))
            .await
    }
}
