//! Persistence layer: store traits and in-memory implementations.

pub mod memory;
pub mod pending;

pub use memory::InMemoryDb;
pub use pending::{PendingSession, PendingStateStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{CodePurpose, NewUser, NumericCode, OAuthProvider, User, UserId};

/// User record storage.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Exact match on the stored address, after trimming the input.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, AppError>;

    async fn find_by_provider(
        &self,
        provider: OAuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError>;

    /// Insert a new user; `EmailTaken` if the address is registered.
    async fn create(&self, new_user: NewUser) -> Result<User, AppError>;

    /// Replace an existing user record, refreshing `updated_at`.
    async fn update(&self, user: &User) -> Result<User, AppError>;

    async fn email_exists(&self, email: &str) -> Result<bool, AppError> {
        Ok(self.find_by_email(email).await?.is_some())
    }
}

/// Numeric code storage.
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Stamp `used_at` on every live code for (user, purpose). Returns the count.
    async fn invalidate_live(
        &self,
        user_id: UserId,
        purpose: CodePurpose,
        now: DateTime<Utc>,
    ) -> Result<usize, AppError>;

    async fn insert(&self, code: NumericCode) -> Result<(), AppError>;

    async fn find_live(
        &self,
        user_id: UserId,
        code: &str,
        purpose: CodePurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<NumericCode>, AppError>;

    /// Find a live match and mark it used in one step.
    async fn consume_live(
        &self,
        user_id: UserId,
        code: &str,
        purpose: CodePurpose,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Stamp every unused row matching (user, code, purpose).
    async fn mark_all_used(
        &self,
        user_id: UserId,
        code: &str,
        purpose: CodePurpose,
        now: DateTime<Utc>,
    ) -> Result<usize, AppError>;

    /// Delete rows whose expiry is before `cutoff`. Returns the count.
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<usize, AppError>;
}
