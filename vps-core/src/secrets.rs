//! Secret generation and one-way password hashing.
//!
//! Panel passwords are generated here, shown to the tenant once, and only the
//! salted PBKDF2 digest is ever persisted.

use base64::{
    engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD},
    Engine,
};
use pbkdf2::pbkdf2_hmac;
use rand::{Rng, RngCore};
use sha2::Sha256;

use crate::error::{CoreError, Result};

/// Number of PBKDF2 iterations for password hashing
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt length in bytes
const SALT_LENGTH: usize = 16;

/// Derived key length in bytes
const HASH_LENGTH: usize = 32;

/// Scheme tag stored in front of every encoded hash
const SCHEME: &str = "pbkdf2-sha256";

/// Length of generated panel passwords
pub const PASSWORD_LENGTH: usize = 16;

/// Generate a random alphanumeric password.
///
/// Uses the thread-local CSPRNG (ChaCha, seeded from the OS).
pub fn generate_random_password(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ\
                            abcdefghijklmnopqrstuvwxyz\
                            0123456789";
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Generate a URL-safe random token (256 bits), e.g. for panel sessions.
pub fn generate_token() -> String {
    let mut token_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut token_bytes);
    URL_SAFE_NO_PAD.encode(token_bytes)
}

/// Hash a password with a fresh random salt.
///
/// Encoded as `pbkdf2-sha256$<iterations>$<salt>$<hash>` (unpadded base64).
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::rng().fill_bytes(&mut salt);
    hash_with_salt(password, &salt, PBKDF2_ITERATIONS)
}

fn hash_with_salt(password: &str, salt: &[u8], iterations: u32) -> String {
    let mut key = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    format!(
        "{}${}${}${}",
        SCHEME,
        iterations,
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(key)
    )
}

/// Check a password against an encoded hash produced by [`hash_password`].
///
/// Returns `Err` only when the stored hash is malformed.
pub fn verify_password(password: &str, encoded: &str) -> Result<bool> {
    let parts: Vec<&str> = encoded.split('$').collect();
    let [scheme, iterations, salt, expected] = parts.as_slice() else {
        return Err(CoreError::Crypto("Malformed password hash".to_string()));
    };

    if *scheme != SCHEME {
        return Err(CoreError::Crypto(format!(
            "Unsupported hash scheme: {}",
            scheme
        )));
    }

    let iterations: u32 = iterations
        .parse()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| CoreError::Crypto("Invalid iteration count".to_string()))?;
    let salt = STANDARD_NO_PAD
        .decode(salt)
        .map_err(|e| CoreError::Crypto(format!("Failed to decode salt: {}", e)))?;
    let expected = STANDARD_NO_PAD
        .decode(expected)
        .map_err(|e| CoreError::Crypto(format!("Failed to decode hash: {}", e)))?;
    if expected.len() != HASH_LENGTH {
        return Err(CoreError::Crypto(format!(
            "Hash has {} bytes, expected {}",
            expected.len(),
            HASH_LENGTH
        )));
    }

    let mut key = vec![0u8; expected.len()];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut key);

    Ok(constant_time_eq(&key, &expected))
}

/// Compare two byte strings without short-circuiting on the first mismatch.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
