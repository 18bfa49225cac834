// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! CSPRNG helpers for tokens, numeric codes and TOTP secrets.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::AppError;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Largest multiple of 1_000_000 that fits in a u32; draws at or above it
/// are rejected so every code is equally likely.
const CODE_RANGE_LIMIT: u32 = 4_294_000_000;

fn fill(bytes: &mut [u8]) -> Result<(), AppError> {
    SystemRandom::new()
        .fill(bytes)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG failure")))
}

/// Random opaque token: 32 bytes, base64url without padding (43 chars).
pub fn random_token() -> Result<String, AppError> {
    let mut bytes = [0u8; 32];
    fill(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Uniform six-digit code, zero-padded.
pub fn numeric_code() -> Result<String, AppError> {
    loop {
        let mut bytes = [0u8; 4];
        fill(&mut bytes)?;
        let n = u32::from_be_bytes(bytes);
        if n < CODE_RANGE_LIMIT {
            return Ok(format!("{:06}", n % 1_000_000));
        }
    }
}

/// Random string over the RFC 4648 Base32 alphabet.
pub fn base32_secret(len: usize) -> Result<String, AppError> {
    let mut bytes = vec![0u8; len];
    fill(&mut bytes)?;
    Ok(bytes
        .iter()
        .map(|b| BASE32_ALPHABET[(b & 31) as usize] as char)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_token_shape() {
        let a = random_token().unwrap();
        let b = random_token().unwrap();
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_numeric_code_is_six_digits() {
        for _ in 0..200 {
            let code = numeric_code().unwrap();
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_base32_secret_alphabet() {
        let secret = base32_secret(16).unwrap();
        assert_eq!(secret.len(), 16);
        assert!(secret.bytes().all(|b| BASE32_ALPHABET.contains(&b)));
    }
}
