//! Secret handling utilities.
//!
//! Re-exports secrecy types and adds a constant-time comparison for tokens
//! presented by HTTP callers.

pub use secrecy::{ExposeSecret, SecretString};

/// Compare a presented token against a secret without short-circuiting on the
/// first mismatched byte.
pub fn matches_secret(secret: &SecretString, presented: &str) -> bool {
    let expected = secret.expose_secret().as_bytes();
    let presented = presented.as_bytes();
    if expected.len() != presented.len() {
        return false;
    }
    expected
        .iter()
        .zip(presented)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
