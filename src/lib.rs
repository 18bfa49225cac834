// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Membership-Auth: sign-in, account linking and second factors
//!
//! This crate provides the authentication backend of a membership website:
//! email/password accounts, OAuth sign-in through Google, Facebook and
//! Discord, TOTP or emailed-code two-factor authentication, and a
//! code-based password reset.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod random;
pub mod routes;
pub mod services;

use std::sync::Arc;

use config::Config;
use db::{CodeStore, PendingStateStore, UserStore};
use services::{
    CodeService, CredentialService, IdentityResolver, Mailer, OAuthProviderClient, OAuthService,
    PasswordHasher, PasswordResetFlow, TotpService, TwoFactorGate,
};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserStore>,
    pub pending: PendingStateStore,
    pub codes: CodeService,
    pub oauth: OAuthService,
    pub identity: IdentityResolver,
    pub credentials: CredentialService,
    pub two_factor: TwoFactorGate,
    pub password_reset: PasswordResetFlow,
}

impl AppState {
    /// Wire the services over the given stores and external clients.
    pub fn new(
        config: Config,
        users: Arc<dyn UserStore>,
        code_store: Arc<dyn CodeStore>,
        mailer: Arc<dyn Mailer>,
        oauth_client: Arc<dyn OAuthProviderClient>,
        hasher: PasswordHasher,
    ) -> Self {
        let codes = CodeService::new(code_store);
        let credentials = CredentialService::new(users.clone(), hasher);
        let two_factor = TwoFactorGate::new(
            users.clone(),
            codes.clone(),
            TotpService::new(config.totp_issuer.clone()),
            mailer.clone(),
        );
        let password_reset =
            PasswordResetFlow::new(users.clone(), codes.clone(), credentials.clone(), mailer);
        let oauth = OAuthService::new(oauth_client, config.oauth_redirect_uri());

        Self {
            identity: IdentityResolver::new(users.clone()),
            pending: PendingStateStore::new(),
            config,
            users,
            codes,
            oauth,
            credentials,
            two_factor,
            password_reset,
        }
    }
}
