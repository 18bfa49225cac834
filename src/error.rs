// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::models::OAuthProvider;

/// Application error type that converts to HTTP responses.
///
/// Credential and code failures carry no detail so responses never reveal
/// whether an account exists or why a code was rejected.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid email or password")]
    InvalidCredential,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Account has no password; sign in with a linked provider")]
    PasswordNotSet,

    #[error("Code is invalid or expired")]
    CodeInvalidOrExpired,

    #[error("Session expired; start again")]
    SessionExpired,

    #[error("OAuth state mismatch")]
    StateMismatch,

    #[error("OAuth provider error: {message}")]
    Provider {
        provider: OAuthProvider,
        message: String,
    },

    #[error("Authorization was cancelled at the provider")]
    OAuthDenied,

    #[error("Provider did not share an email address")]
    OAuthEmailMissing,

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Cannot remove the last way to sign in")]
    LastAuthPathViolation,

    #[error("{} is not linked", .0.display_name())]
    ProviderNotLinked(OAuthProvider),

    #[error("{} account is already linked", .0.display_name())]
    ProviderAlreadyLinked(OAuthProvider),

    #[error("Email address is already registered")]
    EmailTaken,

    #[error("Could not send email: {0}")]
    MailDelivery(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Status code and stable machine-readable error code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::InvalidCredential => (StatusCode::UNAUTHORIZED, "invalid_credential"),
            AppError::AccountDisabled => (StatusCode::FORBIDDEN, "account_disabled"),
            AppError::PasswordNotSet => (StatusCode::UNAUTHORIZED, "password_not_set"),
            AppError::CodeInvalidOrExpired => (StatusCode::BAD_REQUEST, "code_invalid_or_expired"),
            AppError::SessionExpired => (StatusCode::UNAUTHORIZED, "session_expired"),
            AppError::StateMismatch => (StatusCode::BAD_REQUEST, "state_mismatch"),
            AppError::Provider { .. } => (StatusCode::BAD_GATEWAY, "provider_error"),
            AppError::OAuthDenied => (StatusCode::BAD_REQUEST, "oauth_denied"),
            AppError::OAuthEmailMissing => (StatusCode::BAD_REQUEST, "oauth_email_missing"),
            AppError::UnsupportedProvider(_) => (StatusCode::NOT_FOUND, "unsupported_provider"),
            AppError::LastAuthPathViolation => (StatusCode::CONFLICT, "last_auth_path"),
            AppError::ProviderNotLinked(_) => (StatusCode::CONFLICT, "provider_not_linked"),
            AppError::ProviderAlreadyLinked(_) => {
                (StatusCode::CONFLICT, "provider_already_linked")
            }
            AppError::EmailTaken => (StatusCode::CONFLICT, "email_taken"),
            AppError::MailDelivery(_) => (StatusCode::SERVICE_UNAVAILABLE, "mail_delivery_failed"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .keys()
            .map(|k| k.to_string())
            .collect();
        fields.sort_unstable();
        AppError::Validation(format!("invalid fields: {}", fields.join(", ")))
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_code();
        let details = match &self {
            AppError::Provider { provider, message } => {
                tracing::warn!(provider = %provider, error = %message, "OAuth provider error");
                Some(format!(
                    "Could not sign in with {}; please try again",
                    provider.display_name()
                ))
            }
            AppError::MailDelivery(msg) => {
                tracing::warn!(error = %msg, "Mail delivery failed");
                Some("Could not send email; please try again later".to_string())
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                None
            }
            AppError::UnsupportedProvider(_)
            | AppError::ProviderNotLinked(_)
            | AppError::ProviderAlreadyLinked(_)
            | AppError::Validation(_)
            | AppError::NotFound(_)
            | AppError::PasswordNotSet
            | AppError::LastAuthPathViolation
            | AppError::EmailTaken
            | AppError::SessionExpired
            | AppError::OAuthDenied
            | AppError::OAuthEmailMissing
            | AppError::AccountDisabled => Some(self.to_string()),
            AppError::InvalidCredential
            | AppError::CodeInvalidOrExpired
            | AppError::StateMismatch
            | AppError::Unauthorized => None,
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
