//! Small helpers for credentials: usernames, codes, secrets, hashing.

use anyhow::{Context, Result, anyhow};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use rand::{Rng, RngCore, rngs::OsRng};
use regex::Regex;

const VERIFICATION_CODE_LEN: usize = 6;
const APP_SECRET_LEN: usize = 26;
const APP_SECRET_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Usernames double as the verification-mail destination, so they must
/// look like an email address.
pub(super) fn valid_username(username: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(username))
}

/// Six-digit code sent to the user's address.
pub(super) fn generate_verification_code() -> String {
    let mut rng = rand::thread_rng();
    (0..VERIFICATION_CODE_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10)))
        .collect()
}

/// Application secret handed out at signup; distinct from the TOTP secret.
pub(super) fn generate_application_secret() -> Result<String> {
    let mut bytes = vec![0u8; APP_SECRET_LEN];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate application secret")?;
    let token: String = bytes
        .iter()
        .map(|byte| char::from(APP_SECRET_ALPHABET[usize::from(*byte) % APP_SECRET_ALPHABET.len()]))
        .collect();
    Ok(format!("KESTO-{token}"))
}

/// Argon2id PHC string for storage; raw passwords never reach the database.
pub(super) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("failed to hash password: {e}"))
}

pub(super) fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}
