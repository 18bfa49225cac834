// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory stores backed by `DashMap`.
//!
//! Used for local development and tests. Uniqueness checks on users take a
//! write lock so concurrent sign-ups cannot both claim one address.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{CodeStore, UserStore};
use crate::error::AppError;
use crate::models::{CodePurpose, NewUser, NumericCode, OAuthProvider, User, UserId};

/// In-memory user and code storage.
#[derive(Clone, Default)]
pub struct InMemoryDb {
    users: Arc<DashMap<UserId, User>>,
    codes: Arc<DashMap<(UserId, CodePurpose), Vec<NumericCode>>>,
    write_lock: Arc<Mutex<()>>,
}

impl InMemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// All code rows for (user, purpose), newest last.
    pub fn codes_for(&self, user_id: UserId, purpose: CodePurpose) -> Vec<NumericCode> {
        self.codes
            .get(&(user_id, purpose))
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    fn email_taken_by_other(&self, email: &str, id: Option<UserId>) -> bool {
        self.users
            .iter()
            .any(|u| u.email == email && Some(u.id) != id)
    }

    fn provider_taken_by_other(&self, user: &User) -> Option<OAuthProvider> {
        OAuthProvider::ALL.into_iter().find(|provider| {
            user.provider_id(*provider).is_some_and(|pid| {
                self.users
                    .iter()
                    .any(|u| u.id != user.id && u.provider_id(*provider) == Some(pid))
            })
        })
    }
}

#[async_trait]
impl UserStore for InMemoryDb {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let email = email.trim();
        if email.is_empty() {
            return Ok(None);
        }
        Ok(self
            .users
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.clone()))
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, AppError> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_by_provider(
        &self,
        provider: OAuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError> {
        if provider_id.is_empty() {
            return Ok(None);
        }
        Ok(self
            .users
            .iter()
            .find(|u| u.provider_id(provider) == Some(provider_id))
            .map(|u| u.clone()))
    }

    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let _guard = self.write_lock.lock().await;

        let user = new_user.into_user(Utc::now());
        if self.email_taken_by_other(&user.email, None) {
            return Err(AppError::EmailTaken);
        }
        if let Some(provider) = self.provider_taken_by_other(&user) {
            return Err(AppError::ProviderAlreadyLinked(provider));
        }

        self.users.insert(user.id, user.clone());
        tracing::debug!(user_id = %user.id, "User created");
        Ok(user)
    }

    async fn update(&self, user: &User) -> Result<User, AppError> {
        let _guard = self.write_lock.lock().await;

        if !self.users.contains_key(&user.id) {
            return Err(AppError::NotFound(format!("user {}", user.id)));
        }
        if self.email_taken_by_other(&user.email, Some(user.id)) {
            return Err(AppError::EmailTaken);
        }
        if let Some(provider) = self.provider_taken_by_other(user) {
            return Err(AppError::ProviderAlreadyLinked(provider));
        }

        let mut updated = user.clone();
        updated.updated_at = Utc::now();
        self.users.insert(updated.id, updated.clone());
        Ok(updated)
    }
}

#[async_trait]
impl CodeStore for InMemoryDb {
    async fn invalidate_live(
        &self,
        user_id: UserId,
        purpose: CodePurpose,
        now: DateTime<Utc>,
    ) -> Result<usize, AppError> {
        let mut count = 0;
        if let Some(mut rows) = self.codes.get_mut(&(user_id, purpose)) {
            for row in rows.iter_mut().filter(|r| r.is_live(now)) {
                row.used_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn insert(&self, code: NumericCode) -> Result<(), AppError> {
        self.codes
            .entry((code.user_id, code.purpose))
            .or_default()
            .push(code);
        Ok(())
    }

    async fn find_live(
        &self,
        user_id: UserId,
        code: &str,
        purpose: CodePurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<NumericCode>, AppError> {
        Ok(self.codes.get(&(user_id, purpose)).and_then(|rows| {
            rows.iter()
                .find(|r| r.code == code && r.is_live(now))
                .cloned()
        }))
    }

    async fn consume_live(
        &self,
        user_id: UserId,
        code: &str,
        purpose: CodePurpose,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        // The shard lock from get_mut makes check-and-mark atomic
        let Some(mut rows) = self.codes.get_mut(&(user_id, purpose)) else {
            return Ok(false);
        };
        match rows.iter_mut().find(|r| r.code == code && r.is_live(now)) {
            Some(row) => {
                row.used_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_used(
        &self,
        user_id: UserId,
        code: &str,
        purpose: CodePurpose,
        now: DateTime<Utc>,
    ) -> Result<usize, AppError> {
        let mut count = 0;
        if let Some(mut rows) = self.codes.get_mut(&(user_id, purpose)) {
            for row in rows
                .iter_mut()
                .filter(|r| r.code == code && r.used_at.is_none())
            {
                row.used_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<usize, AppError> {
        let mut deleted = 0;
        self.codes.retain(|_, rows| {
            let before = rows.len();
            rows.retain(|r| r.expires_at >= cutoff);
            deleted += before - rows.len();
            !rows.is_empty()
        });
        Ok(deleted)
    }
}
