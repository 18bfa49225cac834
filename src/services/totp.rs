// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! RFC 6238 time-based one-time passwords.
//!
//! Six digits, 30 second period, HMAC-SHA1, which is what every common
//! authenticator app expects by default.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::random;

type HmacSha1 = Hmac<Sha1>;

const DIGITS: usize = 6;
const PERIOD: u64 = 30;
/// Default secret length in Base32 characters (80 bits).
pub const SECRET_LENGTH: usize = 16;
/// Steps accepted either side of the current one.
pub const DEFAULT_WINDOW: u64 = 1;

const BASE32_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// TOTP generation and verification.
#[derive(Debug, Clone)]
pub struct TotpService {
    issuer: String,
}

impl TotpService {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// New random Base32 secret of `length` characters.
    pub fn generate_secret(&self, length: usize) -> Result<String, AppError> {
        random::base32_secret(length)
    }

    /// Code for the step containing `timestamp` (Unix seconds).
    pub fn generate_code(&self, secret: &str, timestamp: u64) -> String {
        let counter = timestamp / PERIOD;
        let key = base32_decode(secret);

        let Ok(mut mac) = HmacSha1::new_from_slice(&key) else {
            // HMAC accepts keys of any length
            return String::new();
        };
        mac.update(&counter.to_be_bytes());
        let hash = mac.finalize().into_bytes();

        // RFC 4226 dynamic truncation
        let offset = (hash[hash.len() - 1] & 0x0f) as usize;
        let binary = (u32::from(hash[offset] & 0x7f) << 24)
            | (u32::from(hash[offset + 1]) << 16)
            | (u32::from(hash[offset + 2]) << 8)
            | u32::from(hash[offset + 3]);

        format!("{:0width$}", binary % 10u32.pow(DIGITS as u32), width = DIGITS)
    }

    /// Check `code` against the current time with the default window.
    pub fn verify(&self, secret: &str, code: &str) -> bool {
        self.verify_at(secret, code, unix_now(), DEFAULT_WINDOW)
    }

    /// Check `code` at `timestamp`, accepting `window` steps of drift.
    pub fn verify_at(&self, secret: &str, code: &str, timestamp: u64, window: u64) -> bool {
        let Some(code) = normalize_code(code) else {
            return false;
        };

        let mut offsets = vec![0i64];
        for i in 1..=window as i64 {
            offsets.push(-i);
            offsets.push(i);
        }

        offsets.into_iter().any(|offset| {
            let step_time = timestamp as i64 + offset * PERIOD as i64;
            if step_time < 0 {
                return false;
            }
            let expected = self.generate_code(secret, step_time as u64);
            expected.as_bytes().ct_eq(code.as_bytes()).into()
        })
    }

    /// `otpauth://` provisioning URI for authenticator apps.
    pub fn qr_code_url(&self, secret: &str, email: &str) -> String {
        let label = urlencoding::encode(&format!("{}:{}", self.issuer, email)).into_owned();
        format!(
            "otpauth://totp/{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
            label,
            secret,
            urlencoding::encode(&self.issuer),
            DIGITS,
            PERIOD
        )
    }
}

/// Strip separators and left-pad to six digits. Non-digit input never matches.
fn normalize_code(code: &str) -> Option<String> {
    let cleaned: String = code.chars().filter(|c| *c != ' ' && *c != '-').collect();
    if cleaned.is_empty() || cleaned.len() > DIGITS || !cleaned.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    Some(format!("{:0>width$}", cleaned, width = DIGITS))
}

/// Lenient RFC 4648 Base32 decode: case-insensitive, ignores padding and
/// any character outside the alphabet.
pub fn base32_decode(input: &str) -> Vec<u8> {
    let mut buffer: u32 = 0;
    let mut bits_left: u32 = 0;
    let mut output = Vec::with_capacity(input.len() * 5 / 8);

    for c in input.chars() {
        let Some(val) = BASE32_ALPHABET.find(c.to_ascii_uppercase()) else {
            continue;
        };
        buffer = (buffer << 5) | val as u32;
        bits_left += 5;
        if bits_left >= 8 {
            bits_left -= 8;
            output.push((buffer >> bits_left) as u8);
        }
        buffer &= (1u32 << bits_left) - 1;
    }

    output
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
