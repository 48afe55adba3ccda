//! Signed, time-boxed password reset tokens.
//!
//! Format: `base64url(json payload).base64url(hmac-sha256)`. The payload binds
//! the account id, an expiry, a fixed purpose and a fingerprint of the current
//! password hash, so a token stops verifying once the password changes.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const PURPOSE: &str = "password-reset";
const SALT: &[u8] = b"password-reset-salt";
const MAX_TOKEN_LEN: usize = 512;

/// Every rejection reads the same to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("The reset link is invalid or has expired.")]
pub struct InvalidResetToken;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct ResetClaims {
    sub: i32,
    exp: i64,
    purpose: String,
    fp: String,
}

#[derive(Clone)]
pub struct ResetTokenSigner {
    mac: HmacSha256,
    ttl: chrono::Duration,
}

impl std::fmt::Debug for ResetTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetTokenSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn fingerprint(password_hash: &str) -> String {
    let digest = Sha256::digest(password_hash.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..12])
}

impl ResetTokenSigner {
    pub fn new(secret_key: &str, ttl_seconds: i64) -> anyhow::Result<Self> {
        let mut key = secret_key.as_bytes().to_vec();
        key.extend_from_slice(SALT);
        let mac = <HmacSha256 as Mac>::new_from_slice(&key)
            .map_err(|e| anyhow::anyhow!("Invalid reset token key: {e}"))?;

        Ok(Self {
            mac,
            ttl: chrono::Duration::seconds(ttl_seconds),
        })
    }

    pub fn issue(
        &self,
        account_id: i32,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<String> {
        let claims = ResetClaims {
            sub: account_id,
            exp: (now + self.ttl).timestamp(),
            purpose: PURPOSE.to_string(),
            fp: fingerprint(password_hash),
        };

        let payload = serde_json::to_vec(&claims)?;
        let payload_part = URL_SAFE_NO_PAD.encode(payload);

        let mut mac = self.mac.clone();
        mac.update(payload_part.as_bytes());
        let sig_part = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{payload_part}.{sig_part}"))
    }

    /// Checks signature, purpose and expiry and returns the account id. The
    /// caller must still confirm the fingerprint with [`Self::matches_password`].
    pub fn verify(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<(i32, String), InvalidResetToken> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(InvalidResetToken);
        }

        let (payload_part, sig_part) = token.split_once('.').ok_or(InvalidResetToken)?;

        let signature = URL_SAFE_NO_PAD
            .decode(sig_part)
            .map_err(|_| InvalidResetToken)?;
        let mut mac = self.mac.clone();
        mac.update(payload_part.as_bytes());
        mac.verify_slice(&signature).map_err(|_| InvalidResetToken)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_part)
            .map_err(|_| InvalidResetToken)?;
        let claims: ResetClaims =
            serde_json::from_slice(&payload).map_err(|_| InvalidResetToken)?;

        if claims.purpose != PURPOSE || now.timestamp() > claims.exp {
            return Err(InvalidResetToken);
        }

        Ok((claims.sub, claims.fp))
    }

    #[must_use]
    pub fn matches_password(token_fingerprint: &str, password_hash: &str) -> bool {
        fingerprint(password_hash) == token_fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> ResetTokenSigner {
        ResetTokenSigner::new("test-secret", 600).unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let now = Utc::now();
        let token = signer().issue(42, "$argon2id$hash", now).unwrap();

        let (id, fp) = signer().verify(&token, now).unwrap();
        assert_eq!(id, 42);
        assert!(ResetTokenSigner::matches_password(&fp, "$argon2id$hash"));
        assert!(!ResetTokenSigner::matches_password(&fp, "$argon2id$other"));
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let token = signer().issue(1, "h", now).unwrap();

        assert!(signer().verify(&token, now + chrono::Duration::seconds(600)).is_ok());
        assert_eq!(
            signer().verify(&token, now + chrono::Duration::seconds(601)),
            Err(InvalidResetToken)
        );
    }

    #[test]
    fn test_tampering_is_rejected() {
        let now = Utc::now();
        let token = signer().issue(1, "h", now).unwrap();
        let (payload, sig) = token.split_once('.').unwrap();

        let forged_claims = ResetClaims {
            sub: 2,
            exp: now.timestamp() + 600,
            purpose: PURPOSE.to_string(),
            fp: fingerprint("h"),
        };
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());
        assert!(signer().verify(&format!("{forged_payload}.{sig}"), now).is_err());

        assert!(signer().verify(payload, now).is_err());
        assert!(signer().verify("garbage", now).is_err());
        assert!(signer().verify(&format!("{payload}.AAAA"), now).is_err());

        let other_key = ResetTokenSigner::new("other-secret", 600).unwrap();
        assert!(other_key.verify(&token, now).is_err());
    }

    #[test]
    fn test_error_message_is_uniform() {
        assert_eq!(
            InvalidResetToken.to_string(),
            "The reset link is invalid or has expired."
        );
    }
}
