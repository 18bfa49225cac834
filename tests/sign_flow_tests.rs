// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end password sign-in and second-factor tests.

use axum::http::StatusCode;
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

mod common;

use common::{create_test_app, sign_up, TestClient};

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

async fn sign_in(client: &mut TestClient, email: &str, password: &str) -> common::TestResponse {
    client
        .post(
            "/auth/sign-in",
            json!({ "email": email, "password": password }),
        )
        .await
}

#[tokio::test]
async fn test_sign_up_creates_member_and_session() {
    let app = create_test_app();
    let mut client = TestClient::new(&app);

    let response = sign_up(&mut client, "a@x.com", "password1").await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["outcome"], "authenticated");
    assert_eq!(response.body["user"]["role"], "member");
    assert!(client.cookie("session_token").is_some());

    let me = client.get("/api/me").await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["email"], "a@x.com");
    assert_eq!(me.body["has_password"], true);
    assert_eq!(app.db.user_count(), 1);
}

#[tokio::test]
async fn test_duplicate_sign_up_rejected() {
    let app = create_test_app();
    let mut client = TestClient::new(&app);
    sign_up(&mut client, "a@x.com", "password1").await;

    let mut other = TestClient::new(&app);
    let response = sign_up(&mut other, "a@x.com", "password2").await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body["error"], "email_taken");
    assert!(other.cookie("session_token").is_none());
}

#[tokio::test]
async fn test_sign_up_validation() {
    let app = create_test_app();
    let mut client = TestClient::new(&app);

    let response = client
        .post(
            "/auth/sign-up",
            json!({
                "email": "not-an-email",
                "password": "password1",
                "password_confirmation": "password2",
                "first_name": "Ann",
                "last_name": "Lee",
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["error"], "validation_error");
    let details = response.body["details"].as_str().unwrap();
    assert!(details.contains("email"));
    assert!(details.contains("password_confirmation"));
    assert_eq!(app.db.user_count(), 0);
}

#[tokio::test]
async fn test_wrong_password_gives_no_session() {
    let app = create_test_app();
    let mut setup = TestClient::new(&app);
    sign_up(&mut setup, "a@x.com", "password1").await;

    let mut client = TestClient::new(&app);
    let wrong = sign_in(&mut client, "a@x.com", "password2").await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.body, json!({ "error": "invalid_credential" }));
    assert!(client.cookie("session_token").is_none());

    // Unknown account looks the same
    let unknown = sign_in(&mut client, "nobody@x.com", "password1").await;
    assert_eq!(unknown.status, wrong.status);
    assert_eq!(unknown.body, wrong.body);

    let ok = sign_in(&mut client, "a@x.com", "password1").await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["outcome"], "authenticated");
    assert!(client.cookie("session_token").is_some());
}

#[tokio::test]
async fn test_sign_out_ends_session() {
    let app = create_test_app();
    let mut client = TestClient::new(&app);
    sign_up(&mut client, "a@x.com", "password1").await;

    let response = client.post("/auth/sign-out", json!({})).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert!(response
        .set_cookies
        .iter()
        .any(|c| c.starts_with("session_token=;") || c.starts_with("session_token=\"\"")));
    assert!(client.cookie("session_token").is_none());

    let me = client.get("/api/me").await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);
    assert_eq!(me.body["error"], "unauthorized");
}

#[tokio::test]
async fn test_bearer_token_accepted() {
    let app = create_test_app();
    let mut client = TestClient::new(&app);
    sign_up(&mut client, "a@x.com", "password1").await;
    let token = client.cookie("session_token").unwrap().to_string();

    let request = axum::http::Request::builder()
        .uri("/api/me")
        .header("Authorization", format!("Bearer {token}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_email_two_factor_requires_second_step() {
    let app = create_test_app();
    let mut client = TestClient::new(&app);
    sign_up(&mut client, "a@x.com", "password1").await;

    // Enroll
    let setup = client.post("/api/security/email", json!({})).await;
    assert_eq!(setup.status, StatusCode::OK);
    assert_eq!(setup.body["two_factor_type"], "email");
    assert_eq!(setup.body["two_factor_verified"], false);
    let code = app.mailer.last_code_for("a@x.com").unwrap();
    let confirm = client
        .post("/api/security/email/confirm", json!({ "code": code }))
        .await;
    assert_eq!(confirm.status, StatusCode::OK);
    assert_eq!(confirm.body["two_factor_verified"], true);

    client.post("/auth/sign-out", json!({})).await;

    let first = sign_in(&mut client, "a@x.com", "password1").await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(
        first.body,
        json!({ "outcome": "two_factor_required", "factor": "email", "code_sent": true })
    );
    assert!(client.cookie("session_token").is_none());
    assert_eq!(client.get("/api/me").await.status, StatusCode::UNAUTHORIZED);

    let code = app.mailer.last_code_for("a@x.com").unwrap();
    let wrong_code = if code == "000000" { "111111" } else { "000000" };
    let wrong = client
        .post("/auth/two-factor", json!({ "code": wrong_code }))
        .await;
    assert_eq!(wrong.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong.body["error"], "code_invalid_or_expired");

    let ok = client.post("/auth/two-factor", json!({ "code": code })).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["outcome"], "authenticated");
    assert_eq!(client.get("/api/me").await.status, StatusCode::OK);

    // Codes are single use and the pending login is gone
    let replay = client.post("/auth/two-factor", json!({ "code": code })).await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
    assert_eq!(replay.body["error"], "session_expired");
}

#[tokio::test]
async fn test_email_code_delivery_failure_and_resend() {
    let app = create_test_app();
    let mut client = TestClient::new(&app);
    sign_up(&mut client, "a@x.com", "password1").await;
    client.post("/api/security/email", json!({})).await;
    let code = app.mailer.last_code_for("a@x.com").unwrap();
    client
        .post("/api/security/email/confirm", json!({ "code": code }))
        .await;
    client.post("/auth/sign-out", json!({})).await;

    app.mailer.set_failing(true);
    let failed = sign_in(&mut client, "a@x.com", "password1").await;
    assert_eq!(failed.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(failed.body["error"], "mail_delivery_failed");

    app.mailer.set_failing(false);
    let resend = client.post("/auth/two-factor/resend", json!({})).await;
    assert_eq!(resend.status, StatusCode::OK);
    assert_eq!(resend.body["status"], "code_sent");

    let code = app.mailer.last_code_for("a@x.com").unwrap();
    let ok = client.post("/auth/two-factor", json!({ "code": code })).await;
    assert_eq!(ok.status, StatusCode::OK);
}

#[tokio::test]
async fn test_totp_enrollment_and_sign_in() {
    let app = create_test_app();
    let mut client = TestClient::new(&app);
    sign_up(&mut client, "a@x.com", "password1").await;

    let setup = client.post("/api/security/totp", json!({})).await;
    assert_eq!(setup.status, StatusCode::OK);
    let secret = setup.body["secret"].as_str().unwrap().to_string();
    assert_eq!(secret.len(), 16);
    assert!(setup.body["otpauth_url"]
        .as_str()
        .unwrap()
        .starts_with("otpauth://totp/"));

    let totp = app.state.two_factor.totp();
    let code = totp.generate_code(&secret, unix_now());
    let confirm = client
        .post("/api/security/totp/confirm", json!({ "code": code }))
        .await;
    assert_eq!(confirm.status, StatusCode::OK);
    assert_eq!(confirm.body["two_factor_type"], "totp");

    client.post("/auth/sign-out", json!({})).await;
    let first = sign_in(&mut client, "a@x.com", "password1").await;
    assert_eq!(first.body["factor"], "totp");

    // TOTP logins have nothing to resend
    let resend = client.post("/auth/two-factor/resend", json!({})).await;
    assert_eq!(resend.status, StatusCode::UNAUTHORIZED);

    let code = totp.generate_code(&secret, unix_now());
    let ok = client.post("/auth/two-factor", json!({ "code": code })).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["outcome"], "authenticated");
}

#[tokio::test]
async fn test_unconfirmed_factor_does_not_gate_sign_in() {
    let app = create_test_app();
    let mut client = TestClient::new(&app);
    sign_up(&mut client, "a@x.com", "password1").await;
    client.post("/api/security/totp", json!({})).await;
    client.post("/auth/sign-out", json!({})).await;

    let response = sign_in(&mut client, "a@x.com", "password1").await;
    assert_eq!(response.body["outcome"], "authenticated");
}

#[tokio::test]
async fn test_disable_two_factor() {
    let app = create_test_app();
    let mut client = TestClient::new(&app);
    sign_up(&mut client, "a@x.com", "password1").await;
    client.post("/api/security/email", json!({})).await;
    let code = app.mailer.last_code_for("a@x.com").unwrap();
    client
        .post("/api/security/email/confirm", json!({ "code": code }))
        .await;

    let disabled = client.delete("/api/security/two-factor").await;
    assert_eq!(disabled.status, StatusCode::OK);
    assert_eq!(disabled.body["two_factor_type"], "none");

    client.post("/auth/sign-out", json!({})).await;
    let response = sign_in(&mut client, "a@x.com", "password1").await;
    assert_eq!(response.body["outcome"], "authenticated");
}

#[tokio::test]
async fn test_change_password() {
    let app = create_test_app();
    let mut client = TestClient::new(&app);
    sign_up(&mut client, "a@x.com", "password1").await;

    let wrong = client
        .put(
            "/api/security/password",
            json!({
                "current_password": "not-it-at-all",
                "password": "password2",
                "password_confirmation": "password2",
            }),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let ok = client
        .put(
            "/api/security/password",
            json!({
                "current_password": "password1",
                "password": "password2",
                "password_confirmation": "password2",
            }),
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK);

    client.post("/auth/sign-out", json!({})).await;
    assert_eq!(
        sign_in(&mut client, "a@x.com", "password2").await.status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_security_headers_on_responses() {
    let app = create_test_app();
    let mut client = TestClient::new(&app);
    let request = axum::http::Request::builder()
        .uri("/health")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");
    assert_eq!(response.headers().get("X-Frame-Options").unwrap(), "DENY");

    // First contact mints a session id cookie
    let health = client.get("/health").await;
    assert_eq!(health.status, StatusCode::OK);
    assert!(client.cookie("sid").is_some());
}

const MADE_UP_SID: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

#[tokio::test]
async fn test_unsigned_sid_is_replaced() {
    let app = create_test_app();
    let mut client = TestClient::new(&app);
    client.set_cookie("sid", MADE_UP_SID);

    let response = client.get("/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.set_cookies.iter().any(|c| c.starts_with("sid=")));
    let sid = client.cookie("sid").unwrap();
    assert_ne!(sid, MADE_UP_SID);

    // The issued id is kept on later requests
    let sid = sid.to_string();
    let again = client.get("/health").await;
    assert!(!again.set_cookies.iter().any(|c| c.starts_with("sid=")));
    assert_eq!(client.cookie("sid"), Some(sid.as_str()));
}

#[tokio::test]
async fn test_planted_sid_cannot_finish_reset() {
    let app = create_test_app();
    let mut setup = TestClient::new(&app);
    sign_up(&mut setup, "a@x.com", "password1").await;

    let mut victim = TestClient::new(&app);
    victim.set_cookie("sid", MADE_UP_SID);
    victim
        .post("/auth/password/reset", json!({ "email": "a@x.com" }))
        .await;
    let code = app.mailer.last_code_for("a@x.com").unwrap();
    let verified = victim
        .post("/auth/password/verify", json!({ "code": code }))
        .await;
    assert_eq!(verified.status, StatusCode::OK);

    let mut attacker = TestClient::new(&app);
    attacker.set_cookie("sid", MADE_UP_SID);
    let response = attacker
        .post(
            "/auth/password/new",
            json!({ "password": "attacker-pw", "password_confirmation": "attacker-pw" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "session_expired");

    let ok = sign_in(&mut attacker, "a@x.com", "password1").await;
    assert_eq!(ok.status, StatusCode::OK);
}

#[tokio::test]
async fn test_sid_rotates_when_session_issued() {
    let app = create_test_app();
    let mut setup = TestClient::new(&app);
    sign_up(&mut setup, "a@x.com", "password1").await;

    let mut client = TestClient::new(&app);
    client.get("/health").await;
    let before = client.cookie("sid").unwrap().to_string();

    let response = sign_in(&mut client, "a@x.com", "password1").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response
            .set_cookies
            .iter()
            .filter(|c| c.starts_with("sid="))
            .count(),
        1
    );
    assert_ne!(client.cookie("sid").unwrap(), before);
}
