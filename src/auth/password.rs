//! One-way password hashing.
//!
//! Passwords are stretched with iterated, salted SHA-256 and stored in a
//! self-describing form:
//!
//! ```text
//! sha256$<iterations>$<salt hex>$<digest hex>
//! ```
//!
//! The iteration count travels with the hash, so raising
//! `auth.hash_iterations` only affects passwords set afterwards.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Algorithm tag at the head of every encoded hash.
const ALGORITHM: &str = "sha256";

/// Salt byte length for password hashing.
const SALT_BYTES: usize = 16;

/// Default number of SHA-256 rounds.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Salt used for the throwaway hash computed when a username does not exist.
const DUMMY_SALT: &str = "00000000000000000000000000000000";

/// Hashes and verifies passwords.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl PasswordHasher {
    /// Create a hasher that stretches new hashes with `iterations` rounds.
    /// Zero is clamped to one round.
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Hash `password` with a fresh random salt.
    pub fn hash(&self, password: &str) -> String {
        let salt = generate_salt();
        let digest = stretch(password, &salt, self.iterations);
        format!("{ALGORITHM}${}${salt}${digest}", self.iterations)
    }

    /// Check `password` against an encoded hash produced by [`hash`](Self::hash).
    ///
    /// An encoded value in any other format never verifies.
    pub fn verify(&self, password: &str, encoded: &str) -> bool {
        let Some((iterations, salt, expected)) = parse_encoded(encoded) else {
            return false;
        };
        let attempt = stretch(password, salt, iterations);
        constant_time_eq(attempt.as_bytes(), expected.as_bytes())
    }

    /// Burn the same amount of work as a real verification.
    ///
    /// Called when the username is unknown so response time does not reveal
    /// whether an account exists.
    pub fn dummy_verify(&self, password: &str) {
        let _ = stretch(password, DUMMY_SALT, self.iterations);
    }
}

fn parse_encoded(encoded: &str) -> Option<(u32, &str, &str)> {
    let mut parts = encoded.split('$');
    let algorithm = parts.next()?;
    let iterations = parts.next()?.parse::<u32>().ok()?;
    let salt = parts.next()?;
    let digest = parts.next()?;
    if algorithm != ALGORITHM || iterations == 0 || parts.next().is_some() {
        return None;
    }
    Some((iterations, salt, digest))
}

/// Generate a random salt (hex-encoded).
fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Iterated SHA-256 over salt + password.
fn stretch(password: &str, salt: &str, iterations: u32) -> String {
    let mut hash = Sha256::new();
    hash.update(salt.as_bytes());
    hash.update(password.as_bytes());
    let mut result = hash.finalize();

    for _ in 1..iterations {
        let mut h = Sha256::new();
        h.update(result);
        h.update(salt.as_bytes());
        result = h.finalize();
    }

    hex::encode(result)
}

/// Constant-time byte comparison to prevent timing attacks.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> PasswordHasher {
        PasswordHasher::new(1_000)
    }

    #[test]
    fn hash_and_verify() {
        let hasher = fast_hasher();
        let encoded = hasher.hash("p1");

        assert!(encoded.starts_with("sha256$1000$"));
        assert!(hasher.verify("p1", &encoded));
        assert!(!hasher.verify("p2", &encoded));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let hasher = fast_hasher();
        let h1 = hasher.hash("same");
        let h2 = hasher.hash("same");

        assert_ne!(h1, h2);
        assert!(hasher.verify("same", &h1));
        assert!(hasher.verify("same", &h2));
    }

    #[test]
    fn verify_uses_iterations_from_encoded_hash() {
        let encoded = PasswordHasher::new(10).hash("secret");
        let stronger = PasswordHasher::new(5_000);
        assert!(stronger.verify("secret", &encoded));
    }

    #[test]
    fn malformed_hashes_never_verify() {
        let hasher = fast_hasher();
        assert!(!hasher.verify("x", ""));
        assert!(!hasher.verify("x", "plaintext"));
        assert!(!hasher.verify("x", "md5$10$aa$bb"));
        assert!(!hasher.verify("x", "sha256$zero$aa$bb"));
        assert!(!hasher.verify("x", "sha256$0$aa$bb"));
        assert!(!hasher.verify("x", "sha256$10$aa$bb$extra"));
    }

    #[test]
    fn zero_iterations_clamped() {
        assert_eq!(PasswordHasher::new(0).iterations(), 1);
    }

    #[test]
    fn stretch_is_deterministic_with_same_salt() {
        assert_eq!(stretch("pw", "salt_a", 3), stretch("pw", "salt_a", 3));
        assert_ne!(stretch("pw", "salt_a", 3), stretch("pw", "salt_b", 3));
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
