// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use membership_auth::config::Config;
use membership_auth::db::InMemoryDb;
use membership_auth::error::AppError;
use membership_auth::models::OAuthProvider;
use membership_auth::routes::create_router;
use membership_auth::services::{
    OAuthProviderClient, PasswordConfig, PasswordHasher, RecordingMailer,
};
use membership_auth::AppState;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

/// Provider client that answers from canned profiles keyed by authorization code.
#[derive(Clone, Default)]
pub struct ScriptedProviderClient {
    profiles: Arc<Mutex<HashMap<String, Value>>>,
}

#[allow(dead_code)]
impl ScriptedProviderClient {
    /// The callback with `?code={code}` yields `profile`.
    pub fn add_profile(&self, code: &str, profile: Value) {
        self.profiles
            .lock()
            .unwrap()
            .insert(code.to_string(), profile);
    }
}

#[async_trait]
impl OAuthProviderClient for ScriptedProviderClient {
    fn supports(&self, _provider: OAuthProvider) -> bool {
        true
    }

    fn authorize_url(
        &self,
        provider: OAuthProvider,
        state: &str,
        redirect_uri: &str,
    ) -> Result<String, AppError> {
        Ok(format!(
            "https://{}.test/authorize?state={}&redirect_uri={}",
            provider,
            state,
            urlencoding::encode(redirect_uri)
        ))
    }

    async fn exchange_code(
        &self,
        provider: OAuthProvider,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<String, AppError> {
        if self.profiles.lock().unwrap().contains_key(code) {
            Ok(format!("token-{code}"))
        } else {
            Err(AppError::Provider {
                provider,
                message: "invalid_grant".to_string(),
            })
        }
    }

    async fn fetch_profile(
        &self,
        provider: OAuthProvider,
        access_token: &str,
    ) -> Result<Value, AppError> {
        let code = access_token.trim_start_matches("token-");
        self.profiles
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .ok_or(AppError::Provider {
                provider,
                message: "unknown token".to_string(),
            })
    }
}

/// Router plus handles on its in-memory collaborators.
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub db: InMemoryDb,
    pub mailer: RecordingMailer,
    pub provider: ScriptedProviderClient,
}

/// Create a test app over in-memory stores, a recording mailer and a
/// scripted OAuth provider.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let config = Config::test_default();
    let db = InMemoryDb::new();
    let mailer = RecordingMailer::new();
    let provider = ScriptedProviderClient::default();

    let state = Arc::new(AppState::new(
        config,
        Arc::new(db.clone()),
        Arc::new(db.clone()),
        Arc::new(mailer.clone()),
        Arc::new(provider.clone()),
        PasswordHasher::new(PasswordConfig::fast()),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        db,
        mailer,
        provider,
    }
}

/// Response pieces the tests look at.
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub set_cookies: Vec<String>,
}

/// Browser stand-in that keeps cookies between requests.
#[allow(dead_code)]
pub struct TestClient {
    router: Router,
    cookies: HashMap<String, String>,
}

#[allow(dead_code)]
impl TestClient {
    pub fn new(app: &TestApp) -> Self {
        Self {
            router: app.router.clone(),
            cookies: HashMap::new(),
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn set_cookie(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_string(), value.to_string());
    }

    pub fn forget_cookie(&mut self, name: &str) {
        self.cookies.remove(name);
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post(&mut self, uri: &str, body: Value) -> TestResponse {
        self.send(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&mut self, uri: &str, body: Value) -> TestResponse {
        self.send(Method::PUT, uri, Some(body)).await
    }

    pub async fn delete(&mut self, uri: &str) -> TestResponse {
        self.send(Method::DELETE, uri, None).await
    }

    pub async fn send(&mut self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if !self.cookies.is_empty() {
            let cookie_header = self
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(header::COOKIE, cookie_header);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let set_cookies: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        for set_cookie in &set_cookies {
            self.store_cookie(set_cookie);
        }

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        TestResponse {
            status,
            body,
            set_cookies,
        }
    }

    fn store_cookie(&mut self, set_cookie: &str) {
        let pair = set_cookie.split(';').next().unwrap_or_default();
        let Some((name, value)) = pair.split_once('=') else {
            return;
        };
        let expired = set_cookie.contains("Max-Age=0") || value.is_empty();
        if expired {
            self.cookies.remove(name);
        } else {
            self.cookies.insert(name.to_string(), value.to_string());
        }
    }
}

/// Sign up a@x.com style accounts through the API; leaves the client signed in.
#[allow(dead_code)]
pub async fn sign_up(client: &mut TestClient, email: &str, password: &str) -> TestResponse {
    client
        .post(
            "/auth/sign-up",
            serde_json::json!({
                "email": email,
                "password": password,
                "password_confirmation": password,
                "first_name": "Ann",
                "last_name": "Lee",
            }),
        )
        .await
}
