//! Application configuration loaded from environment variables.

use std::env;

use crate::models::OAuthProvider;

/// Client credentials for one OAuth provider.
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Public base URL of this service, used for the OAuth callback
    pub base_url: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Issuer label shown in authenticator apps
    pub totp_issuer: String,
    /// Sender address for transactional mail
    pub mail_from: String,
    pub mail_from_name: String,
    /// Brevo API key; without it mail is only logged
    pub brevo_api_key: Option<String>,
    pub google: Option<ProviderCredentials>,
    pub facebook: Option<ProviderCredentials>,
    pub discord: Option<ProviderCredentials>,
    pub facebook_graph_api_version: String,
    /// Period of the expired-code sweep
    pub code_cleanup_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            base_url: env::var("BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            totp_issuer: env::var("TOTP_ISSUER").unwrap_or_else(|_| "Membership".to_string()),
            mail_from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "no-reply@localhost".to_string()),
            mail_from_name: env::var("MAIL_FROM_NAME")
                .unwrap_or_else(|_| "Membership".to_string()),
            brevo_api_key: optional_var("BREVO_API_KEY"),
            google: provider_from_env("GOOGLE"),
            facebook: provider_from_env("FACEBOOK"),
            discord: provider_from_env("DISCORD"),
            facebook_graph_api_version: env::var("FACEBOOK_GRAPH_API_VERSION")
                .unwrap_or_else(|_| "v18.0".to_string()),
            code_cleanup_interval_secs: env::var("CODE_CLEANUP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
        })
    }

    /// Config for tests: every provider configured, mail logged only.
    pub fn test_default() -> Self {
        let creds = |name: &str| {
            Some(ProviderCredentials {
                client_id: format!("{name}_client_id"),
                client_secret: format!("{name}_client_secret"),
            })
        };
        Self {
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            totp_issuer: "Membership".to_string(),
            mail_from: "no-reply@example.com".to_string(),
            mail_from_name: "Membership".to_string(),
            brevo_api_key: None,
            google: creds("google"),
            facebook: creds("facebook"),
            discord: creds("discord"),
            facebook_graph_api_version: "v18.0".to_string(),
            code_cleanup_interval_secs: 3600,
        }
    }

    pub fn provider(&self, provider: OAuthProvider) -> Option<&ProviderCredentials> {
        match provider {
            OAuthProvider::Google => self.google.as_ref(),
            OAuthProvider::Facebook => self.facebook.as_ref(),
            OAuthProvider::Discord => self.discord.as_ref(),
        }
    }

    /// Callback URI shared by all providers.
    pub fn oauth_redirect_uri(&self) -> String {
        format!("{}/auth/oauth/callback", self.base_url)
    }

    /// Session cookies are marked `Secure` unless served over plain http.
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn provider_from_env(prefix: &str) -> Option<ProviderCredentials> {
    Some(ProviderCredentials {
        client_id: optional_var(&format!("{prefix}_CLIENT_ID"))?,
        client_secret: optional_var(&format!("{prefix}_CLIENT_SECRET"))?,
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
