//! Time-based one-time passwords (SHA1, 6 digits, 30 s step).

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use data_encoding::BASE32_NOPAD;
use rand::Rng;
use totp_rs::{Algorithm, TOTP};
use tracing::info;

use crate::config::TotpConfig;
use crate::constants::totp::{DIGITS, SECRET_BYTES, STEP_SECONDS};
use crate::db::Store;

/// Fresh random secret, base32 without padding.
#[must_use]
pub fn generate_secret() -> String {
    let bytes: [u8; SECRET_BYTES] = rand::rng().random();
    BASE32_NOPAD.encode(&bytes)
}

fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .collect::<String>()
        .to_ascii_uppercase();
    BASE32_NOPAD.decode(normalized.as_bytes()).ok()
}

fn build(
    secret: &str,
    skew: u8,
    issuer: Option<&str>,
    account_name: &str,
) -> Result<TOTP> {
    let bytes = decode_secret(secret).ok_or_else(|| anyhow!("OTP secret is not base32"))?;
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        skew,
        STEP_SECONDS,
        bytes,
        issuer.map(ToString::to_string),
        account_name.to_string(),
    )
    .map_err(|e| anyhow!("TOTP init error: {e}"))
}

/// Code for the step containing `unix_time`; `None` for an unusable secret.
#[must_use]
pub fn code_at(secret: &str, unix_time: i64) -> Option<String> {
    let time = u64::try_from(unix_time).ok()?;
    let totp = build(secret, 0, None, "account").ok()?;
    Some(totp.generate(time))
}

/// Accepts a code from any step within `skew_steps` of `unix_time`.
#[must_use]
pub fn verify_code(secret: &str, code: &str, unix_time: i64, skew_steps: u8) -> bool {
    let code = code.trim();
    if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let Ok(time) = u64::try_from(unix_time) else {
        return false;
    };

    build(secret, skew_steps, None, "account").is_ok_and(|totp| totp.check(code, time))
}

/// `otpauth://` URI consumed by authenticator apps.
pub fn provisioning_uri(secret: &str, account_name: &str, issuer: &str) -> Result<String> {
    Ok(build(secret, 0, Some(issuer), account_name)?.get_url())
}

/// Issues and checks second-factor secrets for accounts.
#[derive(Debug, Clone)]
pub struct TotpManager {
    issuer: String,
    skew_steps: u8,
}

impl TotpManager {
    #[must_use]
    pub fn new(config: &TotpConfig) -> Self {
        Self {
            issuer: config.issuer.clone(),
            skew_steps: config.skew_steps,
        }
    }

    /// Generates and stores a new secret, replacing any existing one, and
    /// returns its provisioning URI.
    pub async fn provision(&self, store: &Store, account_id: i32, email: &str) -> Result<String> {
        let secret = generate_secret();
        let uri = provisioning_uri(&secret, email, &self.issuer)?;

        store
            .user_repo()
            .set_otp_secret(account_id, &secret)
            .await
            .context("Failed to persist OTP secret")?;

        info!(user_id = account_id, "Second factor provisioned");
        Ok(uri)
    }

    /// False when the account has no secret yet.
    #[must_use]
    pub fn verify(&self, otp_secret: Option<&str>, code: &str, now: DateTime<Utc>) -> bool {
        otp_secret.is_some_and(|secret| verify_code(secret, code, now.timestamp(), self.skew_steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 appendix B seed "12345678901234567890", truncated to 6 digits
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    const STEP: i64 = 30;

    #[test]
    fn test_rfc6238_vectors() {
        assert_eq!(code_at(RFC_SECRET, 59).unwrap(), "287082");
        assert_eq!(code_at(RFC_SECRET, 1_111_111_109).unwrap(), "081804");
        assert_eq!(code_at(RFC_SECRET, 1_234_567_890).unwrap(), "005924");
    }

    #[test]
    fn test_generated_secret_shape() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 32);
        assert!(secret.chars().all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn test_skew_window() {
        let secret = generate_secret();
        let now = 1_700_000_010;
        let code = code_at(&secret, now).unwrap();

        assert!(verify_code(&secret, &code, now, 1));
        assert!(verify_code(&secret, &code, now - STEP, 1));
        assert!(verify_code(&secret, &code, now + STEP, 1));
        assert!(!verify_code(&secret, &code, now + 3 * STEP, 1));
        assert!(!verify_code(&secret, &code, now + STEP, 0));
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(!verify_code(RFC_SECRET, "28708", 59, 1));
        assert!(!verify_code(RFC_SECRET, "28708a", 59, 1));
        assert!(!verify_code("not base32!", "287082", 59, 1));
        assert!(code_at("not base32!", 59).is_none());
        assert!(verify_code(&RFC_SECRET.to_lowercase(), "287082", 59, 0));
    }

    #[test]
    fn test_manager_without_secret_rejects() {
        let manager = TotpManager::new(&TotpConfig::default());
        assert!(!manager.verify(None, "123456", Utc::now()));
    }

    #[test]
    fn test_provisioning_uri() {
        let uri = provisioning_uri(RFC_SECRET, "alice@example.com", "IncidentTracker").unwrap();
        assert!(uri.starts_with("otpauth://totp/IncidentTracker:alice%40example.com?"));
        assert!(uri.contains("secret=GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ"));
        assert!(uri.contains("issuer=IncidentTracker"));
    }
}
