// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Three-step password reset: request a code, verify it, set a new password.

use std::sync::Arc;

use crate::db::{PendingSession, UserStore};
use crate::error::AppError;
use crate::models::{CodePurpose, PasswordResetPending, User};
use crate::services::codes::CodeService;
use crate::services::credentials::CredentialService;
use crate::services::mailer::{password_reset_message, Mailer};

/// Password reset state machine over the session's pending record.
#[derive(Clone)]
pub struct PasswordResetFlow {
    users: Arc<dyn UserStore>,
    codes: CodeService,
    credentials: CredentialService,
    mailer: Arc<dyn Mailer>,
}

impl PasswordResetFlow {
    pub fn new(
        users: Arc<dyn UserStore>,
        codes: CodeService,
        credentials: CredentialService,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            users,
            codes,
            credentials,
            mailer,
        }
    }

    /// Step 1. Succeeds the same way whether or not the address is
    /// registered; only a known address gets a code.
    pub async fn request(&self, session: &PendingSession, email: &str) -> Result<(), AppError> {
        let Some(user) = self.users.find_by_email(email).await? else {
            tracing::info!("Password reset requested for unknown address");
            return Ok(());
        };

        self.send_code(&user).await?;
        session.set(&PasswordResetPending {
            user_id: user.id,
            email: user.email.clone(),
            verified: false,
            code: None,
        })?;

        tracing::info!(user_id = %user.id, "Password reset code sent");
        Ok(())
    }

    /// Step 2. Checks the code without consuming it.
    pub async fn verify(&self, session: &PendingSession, code: &str) -> Result<(), AppError> {
        let pending = session
            .get::<PasswordResetPending>()
            .ok_or(AppError::SessionExpired)?;

        let code = code.trim();
        if !self
            .codes
            .verify_code(pending.user_id, code, CodePurpose::PasswordReset)
            .await?
        {
            return Err(AppError::CodeInvalidOrExpired);
        }

        session.update::<PasswordResetPending, _>(|p| {
            p.verified = true;
            p.code = Some(code.to_string());
        })?;
        Ok(())
    }

    /// Step 3. Re-checks the verified code, stores the password and burns
    /// the code. A code that lapsed since step 2 clears the pending record,
    /// so the flow restarts at step 1.
    pub async fn set_new_password(
        &self,
        session: &PendingSession,
        password: &str,
    ) -> Result<User, AppError> {
        let pending = session
            .get::<PasswordResetPending>()
            .ok_or(AppError::SessionExpired)?;
        let code = match (pending.verified, pending.code.as_deref()) {
            (true, Some(code)) => code,
            _ => return Err(AppError::SessionExpired),
        };

        if !self
            .codes
            .verify_code(pending.user_id, code, CodePurpose::PasswordReset)
            .await?
        {
            session.remove::<PasswordResetPending>();
            return Err(AppError::CodeInvalidOrExpired);
        }

        let user = self
            .credentials
            .reset_password(pending.user_id, password)
            .await?;
        self.codes.mark_used(user.id, code).await?;
        session.remove::<PasswordResetPending>();

        tracing::info!(user_id = %user.id, "Password reset completed");
        Ok(user)
    }

    /// Send a fresh code for the reset in progress. Any earlier
    /// verification is dropped since the old code is invalidated.
    pub async fn resend(&self, session: &PendingSession) -> Result<(), AppError> {
        let pending = session
            .get::<PasswordResetPending>()
            .ok_or(AppError::SessionExpired)?;
        let user = self
            .users
            .find_by_id(pending.user_id)
            .await?
            .ok_or(AppError::SessionExpired)?;

        self.send_code(&user).await?;
        session.update::<PasswordResetPending, _>(|p| {
            p.verified = false;
            p.code = None;
        })?;
        Ok(())
    }

    /// Email on file for the reset in progress.
    pub fn pending_email(&self, session: &PendingSession) -> Option<String> {
        session.get::<PasswordResetPending>().map(|p| p.email)
    }

    async fn send_code(&self, user: &User) -> Result<(), AppError> {
        let purpose = CodePurpose::PasswordReset;
        let code = self.codes.create_code(user.id, purpose).await?;
        let message = password_reset_message(
            &user.email,
            &user.first_name,
            &code,
            purpose.lifetime_minutes(),
        );
        self.mailer
            .send(&message)
            .await
            .map_err(|e| AppError::MailDelivery(e.to_string()))
    }
}
