//! Salted password digest.
//!
//! §1 leaves the hash primitive itself out of scope ("any salted one-way
//! function with a stored salt is acceptable"); this picks one concrete,
//! testable implementation: a random salt plus SHA-256 over
//! `salt || password`, hex-encoded for storage. Only `(salt, digest)` is
//! ever persisted — never the plaintext password.

use rand::RngCore;
use sha2::{Digest, Sha256};

const SALT_BYTES: usize = 16;

/// A random salt, hex-encoded for storage alongside the digest.
pub fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Computes the hex-encoded digest of `salt || password`.
pub fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verifies a plaintext password against a stored `(salt, digest)` pair.
pub fn verify(salt: &str, stored_digest: &str, candidate: &str) -> bool {
    digest(salt, candidate) == stored_digest
}
