// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Transactional mail: the `Mailer` seam, its backends and the code templates.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::config::Config;

/// A rendered message ready to send.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html: String,
}

/// Mail transport failure.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MailError(pub String);

/// Sends rendered messages.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

/// Pick the backend from configuration: Brevo when an API key is set,
/// otherwise log only.
pub fn mailer_from_config(config: &Config) -> Arc<dyn Mailer> {
    match &config.brevo_api_key {
        Some(api_key) => {
            tracing::info!("Using Brevo mailer");
            Arc::new(BrevoMailer::new(
                api_key.clone(),
                config.mail_from.clone(),
                config.mail_from_name.clone(),
            ))
        }
        None => {
            tracing::warn!("BREVO_API_KEY not set, mail will only be logged");
            Arc::new(LogMailer)
        }
    }
}

/// Development mailer that logs recipient and subject. Bodies carry codes
/// and are never logged.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            body_len = message.html.len(),
            "Mail not sent (log mailer)"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoSendBody {
    sender: BrevoAddress,
    to: Vec<BrevoAddress>,
    subject: String,
    html_content: String,
}

/// Brevo transactional email API.
#[derive(Clone)]
pub struct BrevoMailer {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    from_email: String,
    from_name: String,
}

impl BrevoMailer {
    pub fn new(api_key: String, from_email: String, from_name: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: "https://api.brevo.com/v3/smtp/email".to_string(),
            api_key,
            from_email,
            from_name,
        }
    }
}

#[async_trait]
impl Mailer for BrevoMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        let body = BrevoSendBody {
            sender: BrevoAddress {
                email: self.from_email.clone(),
                name: Some(self.from_name.clone()),
            },
            to: vec![BrevoAddress {
                email: message.to.clone(),
                name: message.to_name.clone(),
            }],
            subject: message.subject.clone(),
            html_content: message.html.clone(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError(format!("Brevo request failed: {}", e)))?;

        if response.status().is_success() {
            tracing::debug!(to = %message.to, "Mail sent");
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(MailError(format!("Brevo send failed (status={}): {}", status, body)))
    }
}

/// Keeps every message in memory. Used by tests and local tooling.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<MailMessage>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// The code in the most recent message to `to`.
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent()
            .iter()
            .rev()
            .find(|m| m.to == to)
            .and_then(|m| extract_code(&m.html))
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        if self.failing.lock().map(|f| *f).unwrap_or(false) {
            return Err(MailError("recording mailer set to fail".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}

fn extract_code(html: &str) -> Option<String> {
    let start = html.find(r#"class="code">"#)? + r#"class="code">"#.len();
    let code: String = html[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    (!code.is_empty()).then_some(code)
}

// ─── Templates ───────────────────────────────────────────────────────────────

const STYLE: &str = "\
body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
.container { max-width: 600px; margin: 0 auto; padding: 20px; }
.header { background: #0075b5; color: white; padding: 30px; text-align: center; }
.content { background: #f8fafc; padding: 30px; }
.code { font-size: 32px; font-weight: bold; letter-spacing: 8px; padding: 20px 40px; }
.footer { text-align: center; color: #666; font-size: 12px; margin-top: 20px; }";

fn render(
    title: &str,
    first_name: &str,
    intro: &str,
    code: &str,
    minutes: i64,
    outro: &str,
) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
{style}
</style>
</head>
<body>
<div class="container">
<div class="header"><h1>{title}</h1></div>
<div class="content">
<p>Hi <strong>{name}</strong>,</p>
<p>{intro}</p>
<div style="text-align: center;"><div class="code">{code}</div></div>
<p><strong>The code is valid for {minutes} minutes.</strong></p>
<p>{outro}</p>
</div>
<div class="footer"><p>This message was sent automatically; please do not reply.</p></div>
</div>
</body>
</html>"#,
        style = STYLE,
        title = title,
        name = escape_html(first_name),
        intro = intro,
        code = code,
        minutes = minutes,
        outro = outro,
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Password reset code message.
pub fn password_reset_message(
    to: &str,
    first_name: &str,
    code: &str,
    minutes: i64,
) -> MailMessage {
    MailMessage {
        to: to.to_string(),
        to_name: Some(first_name.to_string()),
        subject: "Password reset".to_string(),
        html: render(
            "Password reset",
            first_name,
            "We received a request to reset the password for your account. Use this code to continue:",
            code,
            minutes,
            "If you did not ask to reset your password, you can ignore this email. Your password stays unchanged.",
        ),
    }
}

/// Email second-factor code message.
pub fn two_factor_message(
    to: &str,
    first_name: &str,
    code: &str,
    minutes: i64,
) -> MailMessage {
    MailMessage {
        to: to.to_string(),
        to_name: Some(first_name.to_string()),
        subject: "Your sign-in code".to_string(),
        html: render(
            "Sign-in code",
            first_name,
            "Your two-factor sign-in code:",
            code,
            minutes,
            "If you did not try to sign in, someone may be trying to access your account. Consider changing your password.",
        ),
    }
}
