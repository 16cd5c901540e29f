//! Time-based one-time codes: secret generation, provisioning images, and
//! code verification.
//!
//! A user's secret is generated once during enrollment (before the user row
//! exists), persisted, and reused for every later login. The provisioning
//! QR image is regenerated from the stored secret on repeat requests, never
//! recreated with a fresh secret.

use anyhow::{Result, anyhow};
use base64::Engine;
use totp_rs::{Algorithm, Secret, TOTP};

const TOTP_DIGITS: usize = 6;
const TOTP_SKEW: u8 = 1;
const TOTP_STEP: u64 = 30;

/// Code generation and verification bound to one issuer label.
#[derive(Clone, Debug)]
pub struct Totp {
    issuer: String,
}

impl Totp {
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    /// Fresh base32 secret for a new enrollment.
    #[must_use]
    pub fn generate_secret() -> String {
        match Secret::generate_secret().to_encoded() {
            Secret::Encoded(secret) => secret,
            // to_encoded always yields the encoded variant
            Secret::Raw(_) => String::new(),
        }
    }

    fn instance(&self, secret_base32: &str, account: &str) -> Result<TOTP> {
        let secret_bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| anyhow!("invalid totp secret: {e:?}"))?;
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            secret_bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| anyhow!("totp init error: {e}"))
    }

    /// Provisioning QR image (PNG bytes) for the given account and secret.
    ///
    /// # Errors
    /// Returns an error if the secret is malformed or QR rendering fails.
    pub fn provisioning_png(&self, secret_base32: &str, account: &str) -> Result<Vec<u8>> {
        let totp = self.instance(secret_base32, account)?;
        let encoded = totp
            .get_qr_base64()
            .map_err(|e| anyhow!("qr render error: {e}"))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| anyhow!("qr payload is not valid base64: {e}"))
    }

    /// Check a submitted code against the stored secret for the current
    /// time step (with one step of skew).
    ///
    /// # Errors
    /// Returns an error if the secret is malformed.
    pub fn verify(&self, secret_base32: &str, code: &str) -> Result<bool> {
        let totp = self.instance(secret_base32, "account")?;
        Ok(totp.check_current(code).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secret_is_base32() {
        let secret = Totp::generate_secret();
        assert!(!secret.is_empty());
        assert!(
            secret
                .chars()
                .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c))
        );
    }

    #[test]
    fn current_code_verifies() -> Result<()> {
        let totp = Totp::new("Kesto");
        let secret = Totp::generate_secret();
        let code = totp
            .instance(&secret, "alice@example.com")?
            .generate_current()
            .map_err(|e| anyhow!("code generation failed: {e}"))?;
        assert!(totp.verify(&secret, &code)?);
        Ok(())
    }

    #[test]
    fn altered_code_fails() -> Result<()> {
        let totp = Totp::new("Kesto");
        let secret = Totp::generate_secret();
        let code = totp
            .instance(&secret, "alice@example.com")?
            .generate_current()
            .map_err(|e| anyhow!("code generation failed: {e}"))?;
        // Flip every digit so the altered code cannot collide with the
        // current or adjacent time steps.
        let altered: String = code
            .chars()
            .map(|c| if c == '0' { '1' } else { '0' })
            .collect();
        assert_ne!(code, altered);
        assert!(!totp.verify(&secret, &altered)?);
        Ok(())
    }

    #[test]
    fn provisioning_image_is_png() -> Result<()> {
        let totp = Totp::new("Kesto");
        let secret = Totp::generate_secret();
        let png = totp.provisioning_png(&secret, "alice@example.com")?;
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
        Ok(())
    }

    #[test]
    fn malformed_secret_is_rejected() {
        let totp = Totp::new("Kesto");
        assert!(totp.verify("not-base32!", "000000").is_err());
    }

    #[test]
    fn image_is_stable_for_a_stored_secret() -> Result<()> {
        let totp = Totp::new("Kesto");
        let secret = Totp::generate_secret();
        let first = totp.provisioning_png(&secret, "alice@example.com")?;
        let second = totp.provisioning_png(&secret, "alice@example.com")?;
        assert_eq!(first, second);
        Ok(())
    }
}
