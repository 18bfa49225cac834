// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod cleanup;
pub mod codes;
pub mod credentials;
pub mod identity;
pub mod mailer;
pub mod oauth;
pub mod password;
pub mod password_reset;
pub mod totp;
pub mod two_factor;

pub use codes::CodeService;
pub use credentials::{CredentialService, ProfileUpdate, SignUp};
pub use identity::IdentityResolver;
pub use mailer::{mailer_from_config, Mailer, RecordingMailer};
pub use oauth::{HttpProviderClient, OAuthProviderClient, OAuthService};
pub use password::{PasswordConfig, PasswordHasher};
pub use password_reset::PasswordResetFlow;
pub use totp::TotpService;
pub use two_factor::{LoginOutcome, TotpSetup, TwoFactorGate};
