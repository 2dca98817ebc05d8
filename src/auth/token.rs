//! HMAC-SHA256 signed access tokens.
//!
//! Token layout: `{user_id}.{expiry_unix}.{hex_signature}` where the
//! signature covers `{user_id}.{expiry_unix}`. Stateless: any process
//! holding the signing secret can mint and verify.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

use super::traits::{Authenticator, Identity};

type HmacSha256 = Hmac<Sha256>;

pub struct HmacTokenAuthenticator {
    secret: Vec<u8>,
    ttl: Duration,
}

impl HmacTokenAuthenticator {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            secret: secret.to_vec(),
            ttl,
        }
    }

    pub fn from_config(config: &crate::config::AuthConfig) -> Self {
        let secret = match &config.secret {
            Some(s) if !s.trim().is_empty() => s.clone().into_bytes(),
            _ => {
                tracing::warn!(
                    "auth.secret not configured; using a random secret — minted tokens will not survive a restart"
                );
                random_secret()
            }
        };
        Self::new(&secret, Duration::from_secs(config.token_ttl_secs))
    }

    /// Mint a signed token for `user_id`, valid for the configured TTL.
    pub fn mint(&self, user_id: &str) -> Result<String> {
        if user_id.trim().is_empty() {
            anyhow::bail!("user id must not be empty");
        }
        if user_id.contains('.') {
            anyhow::bail!("user id must not contain '.'");
        }
        let expiry = Utc::now().timestamp() + self.ttl.as_secs() as i64;
        let base = format!("{user_id}.{expiry}");
        Ok(format!("{base}.{}", self.sign(&base)))
    }

    fn sign(&self, base: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(base.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn verify(&self, base: &str, signature_hex: &str) -> bool {
        let Ok(signature) = hex::decode(signature_hex) else {
            return false;
        };
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(base.as_bytes());
        mac.verify_slice(&signature).is_ok()
    }
}

fn random_secret() -> Vec<u8> {
    use rand::Rng;
    rand::thread_rng()
        .sample_iter(rand::distributions::Alphanumeric)
        .take(48)
        .collect()
}

#[async_trait]
impl Authenticator for HmacTokenAuthenticator {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>> {
        // user_id.expiry.signature, split from the right so user ids are not
        // ambiguous with the two trailing fields.
        let mut parts = token.rsplitn(3, '.');
        let (Some(signature), Some(expiry_str), Some(user_id)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Ok(None);
        };
        if user_id.is_empty() {
            return Ok(None);
        }

        let base = format!("{user_id}.{expiry_str}");
        if !self.verify(&base, signature) {
            return Ok(None);
        }

        let Ok(expiry) = expiry_str.parse::<i64>() else {
            return Ok(None);
        };
        if Utc::now().timestamp() > expiry {
            return Ok(None);
        }

        Ok(Some(Identity {
            user_id: user_id.to_string(),
            active: true,
        }))
    }

    fn name(&self) -> &str {
        "hmac_token"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> HmacTokenAuthenticator {
        HmacTokenAuthenticator::new(b"test-secret", Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn mint_and_resolve_round_trip() {
        let auth = authenticator();
        let token = auth.mint("alice").unwrap();
        let identity = auth.resolve(&token).await.unwrap().unwrap();
        assert_eq!(identity.user_id, "alice");
        assert!(identity.active);
    }

    #[tokio::test]
    async fn expired_token_rejected() {
        let auth = HmacTokenAuthenticator::new(b"test-secret", Duration::from_secs(0));
        let expiry = Utc::now().timestamp() - 10;
        let base = format!("alice.{expiry}");
        let token = format!("{base}.{}", auth.sign(&base));
        assert!(auth.resolve(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tampered_token_rejected() {
        let auth = authenticator();
        let token = auth.mint("alice").unwrap();
        let tampered = token.replacen("alice", "mallory", 1);
        assert!(auth.resolve(&tampered).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wrong_secret_rejected() {
        let minter = authenticator();
        let verifier = HmacTokenAuthenticator::new(b"other-secret", Duration::from_secs(3600));
        let token = minter.mint("alice").unwrap();
        assert!(verifier.resolve(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn garbage_tokens_rejected() {
        let auth = authenticator();
        for token in ["", "not-a-token", "a.b", "..", "alice.notanumber.deadbeef"] {
            assert!(
                auth.resolve(token).await.unwrap().is_none(),
                "token {token:?} should not resolve"
            );
        }
    }

    #[test]
    fn mint_rejects_empty_and_dotted_user_ids() {
        let auth = authenticator();
        assert!(auth.mint("").is_err());
        assert!(auth.mint("a.b").is_err());
    }
}
