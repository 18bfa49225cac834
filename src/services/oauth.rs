// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth sign-in and account linking with Google, Facebook and Discord.
//!
//! Handles:
//! - Authorization URL construction with a random anti-CSRF state
//! - One-shot state check on callback
//! - Code exchange and profile fetch (behind `OAuthProviderClient`)
//! - Normalizing provider profiles into `OAuthUser`

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::config::{Config, ProviderCredentials};
use crate::db::PendingSession;
use crate::error::AppError;
use crate::models::{OAuthPending, OAuthProvider, OAuthUser, UserId};
use crate::random;

/// HTTP side of an OAuth provider.
#[async_trait]
pub trait OAuthProviderClient: Send + Sync {
    /// Whether credentials are configured for `provider`.
    fn supports(&self, provider: OAuthProvider) -> bool;

    fn authorize_url(
        &self,
        provider: OAuthProvider,
        state: &str,
        redirect_uri: &str,
    ) -> Result<String, AppError>;

    /// Trade an authorization code for an access token.
    async fn exchange_code(
        &self,
        provider: OAuthProvider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, AppError>;

    /// Raw resource-owner profile.
    async fn fetch_profile(
        &self,
        provider: OAuthProvider,
        access_token: &str,
    ) -> Result<Value, AppError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// reqwest-backed provider client.
#[derive(Clone)]
pub struct HttpProviderClient {
    http: reqwest::Client,
    google: Option<ProviderCredentials>,
    facebook: Option<ProviderCredentials>,
    discord: Option<ProviderCredentials>,
    facebook_version: String,
}

impl HttpProviderClient {
    pub fn from_config(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            google: config.google.clone(),
            facebook: config.facebook.clone(),
            discord: config.discord.clone(),
            facebook_version: config.facebook_graph_api_version.clone(),
        }
    }

    fn credentials(&self, provider: OAuthProvider) -> Result<&ProviderCredentials, AppError> {
        let creds = match provider {
            OAuthProvider::Google => self.google.as_ref(),
            OAuthProvider::Facebook => self.facebook.as_ref(),
            OAuthProvider::Discord => self.discord.as_ref(),
        };
        creds.ok_or_else(|| AppError::UnsupportedProvider(provider.to_string()))
    }

    fn authorize_endpoint(&self, provider: OAuthProvider) -> String {
        match provider {
            OAuthProvider::Google => "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            OAuthProvider::Facebook => format!(
                "https://www.facebook.com/{}/dialog/oauth",
                self.facebook_version
            ),
            OAuthProvider::Discord => "https://discord.com/oauth2/authorize".to_string(),
        }
    }

    fn token_endpoint(&self, provider: OAuthProvider) -> String {
        match provider {
            OAuthProvider::Google => "https://oauth2.googleapis.com/token".to_string(),
            OAuthProvider::Facebook => format!(
                "https://graph.facebook.com/{}/oauth/access_token",
                self.facebook_version
            ),
            OAuthProvider::Discord => "https://discord.com/api/oauth2/token".to_string(),
        }
    }

    async fn parse_json<T: for<'de> Deserialize<'de>>(
        provider: OAuthProvider,
        what: &str,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(provider = %provider, status = %status, body = %body, "{} failed", what);
            return Err(provider_error(
                provider,
                format!("{} failed with status {}", what, status),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| provider_error(provider, format!("Failed to parse {}: {}", what, e)))
    }
}

#[async_trait]
impl OAuthProviderClient for HttpProviderClient {
    fn supports(&self, provider: OAuthProvider) -> bool {
        self.credentials(provider).is_ok()
    }

    fn authorize_url(
        &self,
        provider: OAuthProvider,
        state: &str,
        redirect_uri: &str,
    ) -> Result<String, AppError> {
        let creds = self.credentials(provider)?;
        let separator = match provider {
            OAuthProvider::Facebook => ",",
            OAuthProvider::Google | OAuthProvider::Discord => " ",
        };
        let scope = provider.scopes().join(separator);

        Ok(format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.authorize_endpoint(provider),
            urlencoding::encode(&creds.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(state),
        ))
    }

    async fn exchange_code(
        &self,
        provider: OAuthProvider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, AppError> {
        let creds = self.credentials(provider)?;
        let response = self
            .http
            .post(self.token_endpoint(provider))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| provider_error(provider, format!("Token exchange failed: {}", e)))?;

        let token: TokenResponse = Self::parse_json(provider, "token exchange", response).await?;
        Ok(token.access_token)
    }

    async fn fetch_profile(
        &self,
        provider: OAuthProvider,
        access_token: &str,
    ) -> Result<Value, AppError> {
        let request = match provider {
            OAuthProvider::Google => self
                .http
                .get("https://openidconnect.googleapis.com/v1/userinfo")
                .bearer_auth(access_token),
            OAuthProvider::Facebook => self
                .http
                .get(format!(
                    "https://graph.facebook.com/{}/me",
                    self.facebook_version
                ))
                .query(&[
                    ("fields", "id,name,first_name,last_name,email"),
                    ("access_token", access_token),
                ]),
            OAuthProvider::Discord => self
                .http
                .get("https://discord.com/api/users/@me")
                .bearer_auth(access_token),
        };

        let response = request
            .send()
            .await
            .map_err(|e| provider_error(provider, format!("Profile request failed: {}", e)))?;

        Self::parse_json(provider, "profile fetch", response).await
    }
}

fn provider_error(provider: OAuthProvider, message: String) -> AppError {
    AppError::Provider {
        provider,
        message: format!("{}: {}", provider.display_name(), message),
    }
}

/// OAuth flows on top of a provider client and the session's pending state.
#[derive(Clone)]
pub struct OAuthService {
    client: Arc<dyn OAuthProviderClient>,
    redirect_uri: String,
}

impl OAuthService {
    pub fn new(client: Arc<dyn OAuthProviderClient>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client,
            redirect_uri: redirect_uri.into(),
        }
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Providers with credentials configured.
    pub fn available_providers(&self) -> Vec<OAuthProvider> {
        OAuthProvider::ALL
            .into_iter()
            .filter(|p| self.client.supports(*p))
            .collect()
    }

    /// Start a round trip. Replaces any earlier pending OAuth flow in this session.
    pub fn authorization_url(
        &self,
        session: &PendingSession,
        provider: OAuthProvider,
        link_user_id: Option<UserId>,
    ) -> Result<String, AppError> {
        if !self.client.supports(provider) {
            return Err(AppError::UnsupportedProvider(provider.to_string()));
        }

        let state = random::random_token()?;
        let url = self
            .client
            .authorize_url(provider, &state, &self.redirect_uri)?;

        session.set(&OAuthPending {
            state,
            provider,
            link_user_id,
        })?;

        tracing::info!(
            provider = %provider,
            linking = link_user_id.is_some(),
            "Starting OAuth flow"
        );
        Ok(url)
    }

    /// Pending flow for this session, left in place.
    pub fn pending_flow(&self, session: &PendingSession) -> Option<OAuthPending> {
        session.get::<OAuthPending>()
    }

    /// Drop the pending flow, e.g. when the user cancelled at the provider.
    pub fn cancel(&self, session: &PendingSession) {
        session.remove::<OAuthPending>();
    }

    /// Validate the callback against the pending flow, then exchange and
    /// normalize. The pending record is consumed whatever the outcome.
    pub async fn handle_callback(
        &self,
        session: &PendingSession,
        provider: OAuthProvider,
        code: &str,
        state: &str,
    ) -> Result<OAuthUser, AppError> {
        let pending = session
            .take::<OAuthPending>()
            .ok_or(AppError::StateMismatch)?;

        let state_matches: bool = pending.state.as_bytes().ct_eq(state.as_bytes()).into();
        if !state_matches || pending.provider != provider {
            tracing::warn!(provider = %provider, "OAuth state mismatch");
            return Err(AppError::StateMismatch);
        }

        let access_token = self
            .client
            .exchange_code(provider, code, &self.redirect_uri)
            .await?;
        let profile = self.client.fetch_profile(provider, &access_token).await?;
        let oauth_user = normalize(provider, &profile)?;

        tracing::info!(
            provider = %provider,
            has_email = !oauth_user.email.is_empty(),
            "OAuth profile fetched"
        );
        Ok(oauth_user)
    }
}

/// Map a provider profile to `OAuthUser`.
pub fn normalize(provider: OAuthProvider, profile: &Value) -> Result<OAuthUser, AppError> {
    let id_field = match provider {
        OAuthProvider::Google => profile.get("sub").or_else(|| profile.get("id")),
        OAuthProvider::Facebook | OAuthProvider::Discord => profile.get("id"),
    };
    let provider_id = match id_field {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(provider_error(
                provider,
                "profile has no user id".to_string(),
            ))
        }
    };

    let text = |key: &str| {
        profile
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let (first_name, last_name) = match provider {
        OAuthProvider::Google => (text("given_name"), text("family_name")),
        OAuthProvider::Facebook => (text("first_name"), text("last_name")),
        OAuthProvider::Discord => (text("username"), None),
    };

    Ok(OAuthUser {
        provider,
        provider_id,
        email: text("email").unwrap_or_default(),
        first_name,
        last_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_google() {
        let user = normalize(
            OAuthProvider::Google,
            &json!({
                "sub": "1098",
                "email": "ann@example.com",
                "given_name": "Ann",
                "family_name": "Lee"
            }),
        )
        .unwrap();

        assert_eq!(user.provider_id, "1098");
        assert_eq!(user.email, "ann@example.com");
        assert_eq!(user.first_name.as_deref(), Some("Ann"));
        assert_eq!(user.last_name.as_deref(), Some("Lee"));
    }

    #[test]
    fn test_normalize_google_falls_back_to_id() {
        let user = normalize(OAuthProvider::Google, &json!({"id": "77"})).unwrap();
        assert_eq!(user.provider_id, "77");
        assert_eq!(user.email, "");
    }

    #[test]
    fn test_normalize_facebook() {
        let user = normalize(
            OAuthProvider::Facebook,
            &json!({
                "id": "10150",
                "name": "Bo Ek",
                "first_name": "Bo",
                "last_name": "Ek"
            }),
        )
        .unwrap();

        assert_eq!(user.provider_id, "10150");
        assert_eq!(user.email, "");
        assert_eq!(user.first_name.as_deref(), Some("Bo"));
        assert_eq!(user.last_name.as_deref(), Some("Ek"));
    }

    #[test]
    fn test_normalize_discord_uses_username() {
        let user = normalize(
            OAuthProvider::Discord,
            &json!({
                "id": "80351110224678912",
                "username": "nelly",
                "email": "nelly@example.com",
                "global_name": "Nelly"
            }),
        )
        .unwrap();

        assert_eq!(user.first_name.as_deref(), Some("nelly"));
        assert_eq!(user.last_name, None);
    }

    #[test]
    fn test_normalize_numeric_id() {
        let user = normalize(OAuthProvider::Facebook, &json!({"id": 42})).unwrap();
        assert_eq!(user.provider_id, "42");
    }

    #[test]
    fn test_normalize_missing_id_is_provider_error() {
        let err = normalize(OAuthProvider::Discord, &json!({"username": "x"})).unwrap_err();
        match err {
            AppError::Provider { provider, message } => {
                assert_eq!(provider, OAuthProvider::Discord);
                assert!(message.contains("Discord"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_authorize_urls() {
        let client = HttpProviderClient::from_config(&Config::test_default());
        let redirect = "http://localhost:8080/auth/oauth/callback";

        let google = client
            .authorize_url(OAuthProvider::Google, "abc", redirect)
            .unwrap();
        assert!(google.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(google.contains("scope=email%20profile"));
        assert!(google.contains("state=abc"));
        assert!(google.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fauth%2Foauth%2Fcallback"
        ));

        let facebook = client
            .authorize_url(OAuthProvider::Facebook, "abc", redirect)
            .unwrap();
        assert!(facebook.starts_with("https://www.facebook.com/v18.0/dialog/oauth?"));
        assert!(facebook.contains("scope=email%2Cpublic_profile"));

        let discord = client
            .authorize_url(OAuthProvider::Discord, "abc", redirect)
            .unwrap();
        assert!(discord.contains("scope=identify%20email"));
    }

    #[test]
    fn test_unconfigured_provider_unsupported() {
        let mut config = Config::test_default();
        config.facebook = None;
        let client = HttpProviderClient::from_config(&config);

        assert!(!client.supports(OAuthProvider::Facebook));
        assert!(matches!(
            client.authorize_url(OAuthProvider::Facebook, "s", "r"),
            Err(AppError::UnsupportedProvider(_))
        ));
    }
}
