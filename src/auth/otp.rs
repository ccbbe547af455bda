use rand::Rng;
use sha2::{Digest, Sha256};

/// Failed attempts after which a code is burned.
pub const MAX_OTP_ATTEMPTS: u32 = 5;

/// Generate a 6-digit one-time code, zero-padded.
pub fn generate_code() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{n:06}")
}

/// Codes are stored hashed; only the emailed copy is in clear text.
pub fn hash_code(email: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(b":");
    hasher.update(code.trim().as_bytes());
    hex::encode(hasher.finalize())
}
