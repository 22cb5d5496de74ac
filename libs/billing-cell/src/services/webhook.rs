use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::models::BillingError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, BillingError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::WebhookSignature("invalid signing secret".to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Builds a `Stripe-Signature` header value for `payload`.
pub fn signature_header(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, BillingError> {
    let signature = mac_for(secret, timestamp, payload)?.finalize().into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex::encode(signature)))
}

/// Checks a `Stripe-Signature` header (`t=<ts>,v1=<hex>[,v1=<hex>...]`)
/// against the raw request body.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, now: i64) -> Result<(), BillingError> {
    if secret.is_empty() {
        return Err(BillingError::PaymentsNotConfigured);
    }

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {},
        }
    }

    let timestamp = timestamp.ok_or_else(|| BillingError::WebhookSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(BillingError::WebhookSignature("missing v1 signature".to_string()));
    }
    let stale = now
        .checked_sub(timestamp)
        .map_or(true, |age| age.unsigned_abs() > SIGNATURE_TOLERANCE_SECS as u64);
    if stale {
        debug!("Webhook timestamp {} outside tolerance (now {})", timestamp, now);
        return Err(BillingError::WebhookSignature("timestamp outside tolerance".to_string()));
    }

    let mac = mac_for(secret, timestamp, payload)?;
    let matched = signatures
        .iter()
        .filter_map(|sig| hex::decode(sig).ok())
        .any(|sig| mac.clone().verify_slice(&sig).is_ok());

    if matched {
        Ok(())
    } else {
        Err(BillingError::WebhookSignature("no matching signature".to_string()))
    }
}
