//! Maps external identities onto local user records.

use std::sync::Arc;

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{NewUser, OAuthProvider, OAuthUser, User, UserId};

/// Resolves, links and unlinks provider identities.
#[derive(Clone)]
pub struct IdentityResolver {
    users: Arc<dyn UserStore>,
}

impl IdentityResolver {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Find or create the user for an OAuth identity.
    ///
    /// Lookup order: provider link, then email (linking the provider), then
    /// a new passwordless member account.
    pub async fn authenticate(&self, oauth_user: &OAuthUser) -> Result<User, AppError> {
        let provider = oauth_user.provider;

        if let Some(user) = self
            .users
            .find_by_provider(provider, &oauth_user.provider_id)
            .await?
        {
            tracing::debug!(user_id = %user.id, provider = %provider, "OAuth identity matched link");
            return Ok(user);
        }

        if !oauth_user.email.is_empty() {
            if let Some(mut user) = self.users.find_by_email(&oauth_user.email).await? {
                user.set_provider_id(provider, Some(oauth_user.provider_id.clone()));
                let user = self.users.update(&user).await?;
                tracing::info!(user_id = %user.id, provider = %provider, "Linked provider by email");
                return Ok(user);
            }
        }

        let user = self.users.create(NewUser::from_oauth(oauth_user)).await?;
        tracing::info!(user_id = %user.id, provider = %provider, "Created user from OAuth");
        Ok(user)
    }

    /// Attach a provider identity to an existing user.
    pub async fn link_provider(
        &self,
        user_id: UserId,
        provider: OAuthProvider,
        provider_id: &str,
    ) -> Result<User, AppError> {
        if let Some(owner) = self.users.find_by_provider(provider, provider_id).await? {
            if owner.id != user_id {
                return Err(AppError::ProviderAlreadyLinked(provider));
            }
            return Ok(owner);
        }

        let mut user = self.load(user_id).await?;
        user.set_provider_id(provider, Some(provider_id.to_string()));
        let user = self.users.update(&user).await?;
        tracing::info!(user_id = %user.id, provider = %provider, "Provider linked");
        Ok(user)
    }

    /// Detach a provider, refusing to remove the last way to sign in.
    pub async fn unlink_provider(
        &self,
        user_id: UserId,
        provider: OAuthProvider,
    ) -> Result<User, AppError> {
        let mut user = self.load(user_id).await?;
        ensure_can_unlink(&user, provider)?;

        user.set_provider_id(provider, None);
        let user = self.users.update(&user).await?;
        tracing::info!(user_id = %user.id, provider = %provider, "Provider unlinked");
        Ok(user)
    }

    async fn load(&self, user_id: UserId) -> Result<User, AppError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }
}

/// A user keeps a password or at least one other provider after unlinking.
pub fn ensure_can_unlink(user: &User, provider: OAuthProvider) -> Result<(), AppError> {
    if user.provider_id(provider).is_none() {
        return Err(AppError::ProviderNotLinked(provider));
    }
    if !user.has_password() && user.linked_providers().len() <= 1 {
        return Err(AppError::LastAuthPathViolation);
    }
    Ok(())
}
