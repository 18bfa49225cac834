// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Second-factor enrollment and the post-login checkpoint.
//!
//! Enrollment moves a user from `none` to an unconfirmed factor, and
//! confirmation with a valid code marks it verified. Only a verified factor
//! gates sign-in.

use serde::Serialize;
use std::sync::Arc;

use crate::db::{PendingSession, UserStore};
use crate::error::AppError;
use crate::models::{CodePurpose, TwoFactorPending, TwoFactorType, User, UserId};
use crate::services::codes::CodeService;
use crate::services::mailer::{two_factor_message, Mailer};
use crate::services::totp::{TotpService, SECRET_LENGTH};

/// Result of a successful primary credential check.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// No second factor; the session can be issued now.
    Authenticated(User),
    /// A code must be submitted first.
    TwoFactorRequired {
        factor: TwoFactorType,
        /// False when the email code could not be delivered
        code_sent: bool,
    },
}

/// Secret and provisioning URI shown while enrolling an authenticator app.
#[derive(Debug, Clone, Serialize)]
pub struct TotpSetup {
    pub secret: String,
    pub otpauth_url: String,
}

/// Two-factor enrollment and verification.
#[derive(Clone)]
pub struct TwoFactorGate {
    users: Arc<dyn UserStore>,
    codes: CodeService,
    totp: TotpService,
    mailer: Arc<dyn Mailer>,
}

impl TwoFactorGate {
    pub fn new(
        users: Arc<dyn UserStore>,
        codes: CodeService,
        totp: TotpService,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            users,
            codes,
            totp,
            mailer,
        }
    }

    pub fn totp(&self) -> &TotpService {
        &self.totp
    }

    /// Begin authenticator enrollment. An existing TOTP secret is reused so
    /// a half-finished setup keeps matching the app.
    pub async fn setup_totp(&self, user_id: UserId) -> Result<TotpSetup, AppError> {
        let mut user = self.load(user_id).await?;

        let secret = match (&user.two_factor_type, user.two_factor_secret.as_deref()) {
            (TwoFactorType::Totp, Some(secret)) if !secret.is_empty() => secret.to_string(),
            _ => self.totp.generate_secret(SECRET_LENGTH)?,
        };

        user.two_factor_type = TwoFactorType::Totp;
        user.two_factor_secret = Some(secret.clone());
        user.two_factor_verified = false;
        let user = self.users.update(&user).await?;

        tracing::info!(user_id = %user.id, "TOTP enrollment started");
        Ok(TotpSetup {
            otpauth_url: self.totp.qr_code_url(&secret, &user.email),
            secret,
        })
    }

    /// Finish authenticator enrollment with a code from the app.
    pub async fn confirm_totp(&self, user_id: UserId, code: &str) -> Result<User, AppError> {
        let mut user = self.load(user_id).await?;
        let secret = match (&user.two_factor_type, user.two_factor_secret.as_deref()) {
            (TwoFactorType::Totp, Some(secret)) => secret,
            _ => return Err(AppError::CodeInvalidOrExpired),
        };

        if !self.totp.verify(secret, code) {
            return Err(AppError::CodeInvalidOrExpired);
        }

        user.two_factor_verified = true;
        let user = self.users.update(&user).await?;
        tracing::info!(user_id = %user.id, factor = "totp", "Two-factor enabled");
        Ok(user)
    }

    /// Begin email-code enrollment and send the first code.
    pub async fn setup_email(&self, user_id: UserId) -> Result<User, AppError> {
        let mut user = self.load(user_id).await?;
        user.two_factor_type = TwoFactorType::Email;
        user.two_factor_secret = None;
        user.two_factor_verified = false;
        let user = self.users.update(&user).await?;

        tracing::info!(user_id = %user.id, "Email two-factor enrollment started");
        self.send_email_code(&user).await?;
        Ok(user)
    }

    pub async fn confirm_email(&self, user_id: UserId, code: &str) -> Result<User, AppError> {
        let mut user = self.load(user_id).await?;
        if user.two_factor_type != TwoFactorType::Email {
            return Err(AppError::CodeInvalidOrExpired);
        }
        if !self
            .codes
            .verify_code(user.id, code, CodePurpose::TwoFactorEmail)
            .await?
        {
            return Err(AppError::CodeInvalidOrExpired);
        }

        user.two_factor_verified = true;
        let user = self.users.update(&user).await?;
        tracing::info!(user_id = %user.id, factor = "email", "Two-factor enabled");
        Ok(user)
    }

    /// Send a fresh enrollment code.
    pub async fn resend_setup_code(&self, user_id: UserId) -> Result<(), AppError> {
        let user = self.load(user_id).await?;
        if user.two_factor_type != TwoFactorType::Email {
            return Err(AppError::Validation(
                "email two-factor setup is not in progress".to_string(),
            ));
        }
        self.send_email_code(&user).await
    }

    /// Turn off two-factor entirely.
    pub async fn disable(&self, user_id: UserId) -> Result<User, AppError> {
        let mut user = self.load(user_id).await?;
        user.two_factor_type = TwoFactorType::None;
        user.two_factor_secret = None;
        user.two_factor_verified = false;
        let user = self.users.update(&user).await?;
        tracing::info!(user_id = %user.id, "Two-factor disabled");
        Ok(user)
    }

    /// Checkpoint after a primary credential was accepted.
    pub async fn begin_login(
        &self,
        session: &PendingSession,
        user: User,
        remember: bool,
    ) -> Result<LoginOutcome, AppError> {
        if !user.requires_second_factor() {
            return Ok(LoginOutcome::Authenticated(user));
        }

        let factor = user.two_factor_type;
        session.set(&TwoFactorPending {
            user_id: user.id,
            factor,
            remember,
        })?;

        let code_sent = match factor {
            TwoFactorType::Email => match self.send_email_code(&user).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(user_id = %user.id, error = %e, "Login code not sent");
                    false
                }
            },
            TwoFactorType::Totp | TwoFactorType::None => true,
        };

        tracing::info!(user_id = %user.id, factor = ?factor, "Second factor required");
        Ok(LoginOutcome::TwoFactorRequired { factor, code_sent })
    }

    /// Check the submitted code and finish the login.
    ///
    /// A wrong code leaves the pending login in place for another try.
    pub async fn complete_login(
        &self,
        session: &PendingSession,
        code: &str,
    ) -> Result<(User, bool), AppError> {
        let pending = session
            .get::<TwoFactorPending>()
            .ok_or(AppError::SessionExpired)?;

        let Some(user) = self.users.find_by_id(pending.user_id).await? else {
            session.remove::<TwoFactorPending>();
            return Err(AppError::SessionExpired);
        };

        let verified = match pending.factor {
            TwoFactorType::Totp => user
                .two_factor_secret
                .as_deref()
                .is_some_and(|secret| self.totp.verify(secret, code)),
            TwoFactorType::Email => {
                self.codes
                    .verify_code(user.id, code, CodePurpose::TwoFactorEmail)
                    .await?
            }
            TwoFactorType::None => false,
        };

        if !verified {
            tracing::info!(user_id = %user.id, "Wrong second-factor code");
            return Err(AppError::CodeInvalidOrExpired);
        }

        session.remove::<TwoFactorPending>();
        if !user.is_active {
            return Err(AppError::AccountDisabled);
        }

        tracing::info!(user_id = %user.id, "Second factor accepted");
        Ok((user, pending.remember))
    }

    /// Reissue the login code for a pending email-factor login.
    pub async fn resend_login_code(&self, session: &PendingSession) -> Result<(), AppError> {
        let pending = session
            .get::<TwoFactorPending>()
            .ok_or(AppError::SessionExpired)?;
        if pending.factor != TwoFactorType::Email {
            return Err(AppError::SessionExpired);
        }
        let user = self
            .users
            .find_by_id(pending.user_id)
            .await?
            .ok_or(AppError::SessionExpired)?;

        self.send_email_code(&user).await
    }

    /// Pending second-factor login for this session, if any.
    pub fn pending_login(&self, session: &PendingSession) -> Option<TwoFactorPending> {
        session.get::<TwoFactorPending>()
    }

    async fn send_email_code(&self, user: &User) -> Result<(), AppError> {
        let purpose = CodePurpose::TwoFactorEmail;
        let code = self.codes.create_code(user.id, purpose).await?;
        let message = two_factor_message(
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

    async fn load(&self, user_id: UserId) -> Result<User, AppError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryDb, PendingStateStore};
    use crate::models::NewUser;
    use crate::services::mailer::RecordingMailer;
    use std::time::{SystemTime, UNIX_EPOCH};

    struct Fixture {
        gate: TwoFactorGate,
        db: InMemoryDb,
        mailer: RecordingMailer,
        pending: PendingStateStore,
    }

    fn fixture() -> Fixture {
        let db = InMemoryDb::new();
        let mailer = RecordingMailer::new();
        let gate = TwoFactorGate::new(
            Arc::new(db.clone()),
            CodeService::new(Arc::new(db.clone())),
            TotpService::new("Membership"),
            Arc::new(mailer.clone()),
        );
        Fixture {
            gate,
            db,
            mailer,
            pending: PendingStateStore::new(),
        }
    }

    async fn member(db: &InMemoryDb) -> User {
        db.create(NewUser::with_password(
            "a@x.com",
            "hash".to_string(),
            "Ann",
            "Lee",
            None,
        ))
        .await
        .unwrap()
    }

    fn current_code(gate: &TwoFactorGate, secret: &str) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        gate.totp().generate_code(secret, now)
    }

    #[tokio::test]
    async fn test_totp_enrollment() {
        let f = fixture();
        let user = member(&f.db).await;

        let setup = f.gate.setup_totp(user.id).await.unwrap();
        assert!(setup.otpauth_url.starts_with("otpauth://totp/"));

        // Re-running setup keeps the unconfirmed secret
        let again = f.gate.setup_totp(user.id).await.unwrap();
        assert_eq!(again.secret, setup.secret);

        assert!(matches!(
            f.gate.confirm_totp(user.id, "000000x").await,
            Err(AppError::CodeInvalidOrExpired)
        ));

        let code = current_code(&f.gate, &setup.secret);
        let user = f.gate.confirm_totp(user.id, &code).await.unwrap();
        assert!(user.two_factor_verified);
        assert!(user.requires_second_factor());
    }

    #[tokio::test]
    async fn test_email_enrollment() {
        let f = fixture();
        let user = member(&f.db).await;

        f.gate.setup_email(user.id).await.unwrap();
        let code = f.mailer.last_code_for("a@x.com").unwrap();

        let user = f.gate.confirm_email(user.id, &code).await.unwrap();
        assert!(user.two_factor_verified);
        assert_eq!(user.two_factor_type, TwoFactorType::Email);
        assert!(user.two_factor_secret.is_none());
    }

    #[tokio::test]
    async fn test_switching_to_email_clears_totp_secret() {
        let f = fixture();
        let user = member(&f.db).await;
        f.gate.setup_totp(user.id).await.unwrap();

        let user = f.gate.setup_email(user.id).await.unwrap();
        assert!(user.two_factor_secret.is_none());
        assert!(!user.two_factor_verified);
    }

    #[tokio::test]
    async fn test_unverified_factor_does_not_gate_login() {
        let f = fixture();
        let user = member(&f.db).await;
        f.gate.setup_email(user.id).await.unwrap();
        let user = f.db.find_by_id(user.id).await.unwrap().unwrap();

        let outcome = f
            .gate
            .begin_login(&f.pending.session("s"), user, false)
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
    }

    #[tokio::test]
    async fn test_email_login_round_trip() {
        let f = fixture();
        let user = member(&f.db).await;
        f.gate.setup_email(user.id).await.unwrap();
        let code = f.mailer.last_code_for("a@x.com").unwrap();
        let user = f.gate.confirm_email(user.id, &code).await.unwrap();

        let session = f.pending.session("s");
        let outcome = f.gate.begin_login(&session, user, true).await.unwrap();
        assert!(matches!(
            outcome,
            LoginOutcome::TwoFactorRequired {
                factor: TwoFactorType::Email,
                code_sent: true
            }
        ));

        assert!(matches!(
            f.gate.complete_login(&session, "not-a-code").await,
            Err(AppError::CodeInvalidOrExpired)
        ));
        // Pending login survives a wrong code
        assert!(f.gate.pending_login(&session).is_some());

        let code = f.mailer.last_code_for("a@x.com").unwrap();
        let (logged_in, remember) = f.gate.complete_login(&session, &code).await.unwrap();
        assert_eq!(logged_in.email, "a@x.com");
        assert!(remember);
        assert!(f.gate.pending_login(&session).is_none());

        assert!(matches!(
            f.gate.complete_login(&session, &code).await,
            Err(AppError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn test_login_code_mail_failure_is_reported() {
        let f = fixture();
        let user = member(&f.db).await;
        f.gate.setup_email(user.id).await.unwrap();
        let code = f.mailer.last_code_for("a@x.com").unwrap();
        let user = f.gate.confirm_email(user.id, &code).await.unwrap();

        f.mailer.set_failing(true);
        let session = f.pending.session("s");
        let outcome = f.gate.begin_login(&session, user, false).await.unwrap();
        assert!(matches!(
            outcome,
            LoginOutcome::TwoFactorRequired {
                code_sent: false,
                ..
            }
        ));

        f.mailer.set_failing(false);
        f.gate.resend_login_code(&session).await.unwrap();
        let code = f.mailer.last_code_for("a@x.com").unwrap();
        f.gate.complete_login(&session, &code).await.unwrap();
    }

    #[tokio::test]
    async fn test_complete_login_without_pending() {
        let f = fixture();
        assert!(matches!(
            f.gate.complete_login(&f.pending.session("s"), "123456").await,
            Err(AppError::SessionExpired)
        ));
        assert!(matches!(
            f.gate.resend_login_code(&f.pending.session("s")).await,
            Err(AppError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn test_disable() {
        let f = fixture();
        let user = member(&f.db).await;
        let setup = f.gate.setup_totp(user.id).await.unwrap();
        let code = current_code(&f.gate, &setup.secret);
        f.gate.confirm_totp(user.id, &code).await.unwrap();

        let user = f.gate.disable(user.id).await.unwrap();
        assert_eq!(user.two_factor_type, TwoFactorType::None);
        assert!(user.two_factor_secret.is_none());
        assert!(!user.requires_second_factor());
    }
}
