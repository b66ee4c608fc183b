//! Webhook signature verification.
//!
//! Both schemes operate on the exact request bytes and must run before any JSON parsing.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::errors::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a Stripe signature timestamp, in seconds.
pub const STRIPE_TOLERANCE_SECS: i64 = 300;

/// Verifies a Lemon Squeezy `X-Signature` header: hex(HMAC-SHA256(secret, body)).
pub fn verify_lemonsqueezy(payload: &[u8], signature: &str, secret: &str) -> Result<(), AppError> {
    let signature = signature.trim();
    if signature.is_empty() {
        return Err(AppError::InvalidSignature("missing X-Signature".to_string()));
    }

    let expected = hex_hmac(secret, &[payload])?;
    if constant_time_eq(&expected, signature) {
        Ok(())
    } else {
        Err(AppError::InvalidSignature("X-Signature mismatch".to_string()))
    }
}

/// Verifies a Stripe `Stripe-Signature` header of the form `t=<ts>,v1=<hex>[,v1=<hex>]`.
///
/// The signed payload is `"{t}.{body}"`. Any matching `v1` entry is accepted, which keeps
/// verification working while Stripe rolls a secret.
pub fn verify_stripe(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<(), AppError> {
    let mut timestamp: Option<&str> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| AppError::InvalidSignature("missing timestamp".to_string()))?;
    if candidates.is_empty() {
        return Err(AppError::InvalidSignature("missing v1 signature".to_string()));
    }

    let issued_at: i64 = timestamp
        .parse()
        .map_err(|_| AppError::InvalidSignature("malformed timestamp".to_string()))?;
    let age = now_unix.abs_diff(issued_at);
    if age > STRIPE_TOLERANCE_SECS.unsigned_abs() {
        return Err(AppError::InvalidSignature(format!(
            "timestamp outside tolerance ({age}s)"
        )));
    }

    let expected = hex_hmac(secret, &[timestamp.as_bytes(), &b"."[..], payload])?;
    if candidates
        .iter()
        .any(|candidate| constant_time_eq(&expected, candidate))
    {
        Ok(())
    } else {
        Err(AppError::InvalidSignature("Stripe-Signature mismatch".to_string()))
    }
}

fn hex_hmac(secret: &str, parts: &[&[u8]]) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::InvalidSignature("unusable webhook secret".to_string()))?;
    for part in parts {
        mac.update(part);
    }
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_eq(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
