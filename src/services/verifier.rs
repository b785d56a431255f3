//! IPN authenticity verification.
//!
//! The gateway posts URL-encoded form data whose `kr-answer` field carries
//! the notification payload as an opaque string. The signature in `kr-hash`
//! is an HMAC-SHA256 over that exact string, keyed by one of two shared
//! secrets selected by `kr-hash-key`. Verification therefore has to run on
//! the raw request bytes, before any re-serialization.

use crate::config::IzipayConfig;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Decoded `kr-*` form fields of an inbound notification.
#[derive(Debug, Deserialize)]
struct IpnForm {
    #[serde(rename = "kr-answer")]
    answer: String,
    #[serde(rename = "kr-hash")]
    hash: String,
    #[serde(rename = "kr-hash-key")]
    hash_key: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOrderStatus {
    #[serde(rename = "PAID")]
    Paid,
    #[serde(rename = "UNPAID")]
    Unpaid,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayOrderDetails {
    #[serde(rename = "orderId")]
    pub order_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayTransaction {
    #[serde(default)]
    pub uuid: Option<String>,
}

/// The decoded notification payload, validated against an explicit schema.
#[derive(Debug, Deserialize, Clone)]
pub struct IzipayAnswer {
    #[serde(rename = "orderStatus")]
    pub order_status: GatewayOrderStatus,
    #[serde(rename = "orderDetails", default)]
    pub order_details: Option<GatewayOrderDetails>,
    #[serde(default)]
    pub transactions: Vec<GatewayTransaction>,
}

/// A notification that passed signature and schema checks.
#[derive(Debug, Clone)]
pub struct VerifiedNotification {
    pub answer: IzipayAnswer,
    /// The exact `kr-answer` string the signature covered; archived on the
    /// payment record for audit.
    pub raw_answer: String,
}

/// Reasons an IPN is rejected. Never surfaced to the caller: the webhook
/// handler answers with an "ignored" acknowledgment for all of them.
#[derive(Debug, Error)]
pub enum IpnRejection {
    #[error("missing or malformed kr-* form fields")]
    MalformedForm,

    #[error("unknown kr-hash-key selector: {0}")]
    UnknownHashKey(String),

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("answer failed schema validation")]
    InvalidAnswer,
}

/// Validates inbound webhook authenticity against the two configured
/// shared secrets.
#[derive(Clone)]
pub struct NotificationVerifier {
    password: Secret<String>,
    hmac_key: Secret<String>,
}

impl NotificationVerifier {
    pub fn new(config: &IzipayConfig) -> Self {
        Self {
            password: config.password.clone(),
            hmac_key: config.hmac_key.clone(),
        }
    }

    /// Verify the raw webhook body and decode the notification payload.
    pub fn verify(&self, raw_body: &[u8]) -> Result<VerifiedNotification, IpnRejection> {
        let form: IpnForm =
            serde_urlencoded::from_bytes(raw_body).map_err(|_| IpnRejection::MalformedForm)?;

        if form.answer.is_empty() || form.hash.is_empty() {
            return Err(IpnRejection::MalformedForm);
        }

        let secret = match form.hash_key.as_str() {
            "sha256_hmac" => &self.hmac_key,
            "password" => &self.password,
            other => return Err(IpnRejection::UnknownHashKey(other.to_string())),
        };

        let expected = compute_digest(secret.expose_secret(), &form.answer)
            .map_err(|_| IpnRejection::MalformedForm)?;

        if !digest_matches(&expected, &form.hash) {
            return Err(IpnRejection::SignatureMismatch);
        }

        let answer: IzipayAnswer =
            serde_json::from_str(&form.answer).map_err(|_| IpnRejection::InvalidAnswer)?;

        Ok(VerifiedNotification {
            answer,
            raw_answer: form.answer,
        })
    }
}

/// HMAC-SHA256 hex digest of `payload` under `secret`.
fn compute_digest(secret: &str, payload: &str) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of two hex digests.
fn digest_matches(expected: &str, received: &str) -> bool {
    let expected = expected.as_bytes();
    let received = received.as_bytes();

    if expected.len() != received.len() {
        return false;
    }

    expected.ct_eq(received).into()
}
