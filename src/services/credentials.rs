// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Email/password credentials and profile edits.

use std::sync::Arc;

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{NewUser, User, UserId};
use crate::services::password::{PasswordHasher, MIN_PASSWORD_LENGTH};

/// Fields collected at sign-up.
#[derive(Debug, Clone)]
pub struct SignUp {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

/// Editable profile fields.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub phone: Option<String>,
}

/// Password sign-up, sign-in and password management.
#[derive(Clone)]
pub struct CredentialService {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
}

impl CredentialService {
    pub fn new(users: Arc<dyn UserStore>, hasher: PasswordHasher) -> Self {
        Self { users, hasher }
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    /// Register a new active member with a password.
    pub async fn sign_up(&self, sign_up: SignUp) -> Result<User, AppError> {
        let email = sign_up.email.trim().to_string();
        check_password_length(&sign_up.password)?;
        if self.users.email_exists(&email).await? {
            return Err(AppError::EmailTaken);
        }

        let hash = self.hasher.hash(&sign_up.password)?;
        let user = self
            .users
            .create(NewUser::with_password(
                email,
                hash,
                sign_up.first_name.trim(),
                sign_up.last_name.trim(),
                non_empty(sign_up.phone),
            ))
            .await?;

        tracing::info!(user_id = %user.id, "User signed up");
        Ok(user)
    }

    /// Check email and password.
    ///
    /// Unknown email, an account without a password and a wrong password
    /// all yield `InvalidCredential` after the same hashing work. A disabled
    /// account is only reported once the password has matched.
    pub async fn authenticate_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<User, AppError> {
        let Some(user) = self.users.find_by_email(email).await? else {
            self.hasher.dummy_verify(password);
            return Err(AppError::InvalidCredential);
        };

        let Some(hash) = user.password_hash.as_deref().filter(|h| !h.is_empty()) else {
            self.hasher.dummy_verify(password);
            tracing::info!(user_id = %user.id, "Password sign-in on account without password");
            return Err(AppError::InvalidCredential);
        };

        if !self.hasher.verify(password, hash) {
            tracing::info!(user_id = %user.id, "Wrong password");
            return Err(AppError::InvalidCredential);
        }

        if !user.is_active {
            tracing::info!(user_id = %user.id, "Sign-in attempt on disabled account");
            return Err(AppError::AccountDisabled);
        }

        Ok(user)
    }

    /// First password for an account created through OAuth.
    pub async fn set_password(&self, user_id: UserId, password: &str) -> Result<User, AppError> {
        check_password_length(password)?;
        let mut user = self.load(user_id).await?;
        if user.has_password() {
            return Err(AppError::Validation(
                "password already set; change it instead".to_string(),
            ));
        }

        user.password_hash = Some(self.hasher.hash(password)?);
        let user = self.users.update(&user).await?;
        tracing::info!(user_id = %user.id, "Password set");
        Ok(user)
    }

    /// Replace the password after checking the current one.
    pub async fn change_password(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
    ) -> Result<User, AppError> {
        check_password_length(new_password)?;
        let mut user = self.load(user_id).await?;

        let Some(hash) = user.password_hash.as_deref().filter(|h| !h.is_empty()) else {
            return Err(AppError::PasswordNotSet);
        };
        if !self.hasher.verify(current_password, hash) {
            return Err(AppError::InvalidCredential);
        }

        user.password_hash = Some(self.hasher.hash(new_password)?);
        let user = self.users.update(&user).await?;
        tracing::info!(user_id = %user.id, "Password changed");
        Ok(user)
    }

    /// Store a new password without checking the old one (reset flow).
    pub async fn reset_password(&self, user_id: UserId, password: &str) -> Result<User, AppError> {
        check_password_length(password)?;
        let mut user = self.load(user_id).await?;
        user.password_hash = Some(self.hasher.hash(password)?);
        self.users.update(&user).await
    }

    pub async fn update_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> Result<User, AppError> {
        let mut user = self.load(user_id).await?;
        user.first_name = update.first_name.trim().to_string();
        user.last_name = update.last_name.trim().to_string();
        user.nickname = non_empty(update.nickname);
        user.phone = non_empty(update.phone);
        self.users.update(&user).await
    }

    async fn load(&self, user_id: UserId) -> Result<User, AppError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::Unauthorized)
    }
}

fn check_password_length(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
