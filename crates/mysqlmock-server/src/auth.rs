//! Credential verification for the two supported auth plugins.
//!
//! # mysql_native_password
//!
//! The client proves knowledge of the password with:
//! ```text
//! SHA1(password) XOR SHA1(challenge + SHA1(SHA1(password)))
//! ```
//!
//! # caching_sha2_password (fast path)
//!
//! ```text
//! SHA256(password) XOR SHA256(SHA256(SHA256(password)) + challenge)
//! ```
//!
//! The server recomputes the mask, unmasks the response and checks that the
//! result hashes to the stored `SHA256(SHA256(password))`. There is no full
//! (RSA or TLS) path.
//!
//! Verification is a pure function of `(password, challenge, response)`.

use rand::Rng;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Length of the server challenge sent in the greeting.
pub const CHALLENGE_LEN: usize = 20;

/// Well-known authentication plugin names.
pub mod plugins {
    /// SHA1-based authentication (announced in the greeting)
    pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
    /// SHA256-based authentication (MySQL 8.0+ default)
    pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";
}

/// An auth plugin the server can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum AuthPlugin {
    #[default]
    #[serde(rename = "mysql_native_password")]
    NativePassword,
    #[serde(rename = "caching_sha2_password")]
    CachingSha2Password,
}

impl AuthPlugin {
    /// Look up a plugin by the name a client sent.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            plugins::MYSQL_NATIVE_PASSWORD => Some(AuthPlugin::NativePassword),
            plugins::CACHING_SHA2_PASSWORD => Some(AuthPlugin::CachingSha2Password),
            _ => None,
        }
    }

    /// Wire name of the plugin.
    pub fn name(self) -> &'static str {
        match self {
            AuthPlugin::NativePassword => plugins::MYSQL_NATIVE_PASSWORD,
            AuthPlugin::CachingSha2Password => plugins::CACHING_SHA2_PASSWORD,
        }
    }

    /// Check a client's auth response against the configured password.
    pub fn verify(self, password: &str, challenge: &[u8], response: &[u8]) -> bool {
        match self {
            AuthPlugin::NativePassword => verify_native_password(password, challenge, response),
            AuthPlugin::CachingSha2Password => {
                verify_caching_sha2_password(password, challenge, response)
            }
        }
    }
}

/// Compute the mysql_native_password response a client would send.
///
/// Returns an empty vec for an empty password.
pub fn scramble_native_password(password: &str, challenge: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let stage1: [u8; 20] = Sha1::digest(password.as_bytes()).into();
    let stage2: [u8; 20] = Sha1::digest(stage1).into();

    let mut hasher = Sha1::new();
    hasher.update(challenge);
    hasher.update(stage2);
    let stage3: [u8; 20] = hasher.finalize().into();

    stage1.iter().zip(stage3.iter()).map(|(a, b)| a ^ b).collect()
}

/// Compute the caching_sha2_password fast-auth response a client would send.
///
/// Returns `[0x00]` for an empty password, which is what clients put on the
/// wire in that case.
pub fn scramble_caching_sha2(password: &str, challenge: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return vec![0];
    }

    let stage1: [u8; 32] = Sha256::digest(password.as_bytes()).into();
    let stage3 = caching_sha2_mask(&stage1, challenge);

    stage1.iter().zip(stage3.iter()).map(|(a, b)| a ^ b).collect()
}

/// Verify a mysql_native_password response.
///
/// An empty password matches only an empty response.
pub fn verify_native_password(password: &str, challenge: &[u8], response: &[u8]) -> bool {
    if password.is_empty() {
        return response.is_empty();
    }
    let expected = scramble_native_password(password, challenge);
    expected.len() == response.len() && bool::from(expected.ct_eq(response))
}

/// Verify a caching_sha2_password fast-auth response.
///
/// An empty password matches only the single byte `0x00`.
pub fn verify_caching_sha2_password(password: &str, challenge: &[u8], response: &[u8]) -> bool {
    if password.is_empty() {
        return response == [0];
    }
    if response.len() != 32 {
        return false;
    }

    let stage1: [u8; 32] = Sha256::digest(password.as_bytes()).into();
    let stage2: [u8; 32] = Sha256::digest(stage1).into();
    let stage3 = caching_sha2_mask(&stage1, challenge);

    let candidate: Vec<u8> = stage3.iter().zip(response).map(|(a, b)| a ^ b).collect();
    let digest: [u8; 32] = Sha256::digest(&candidate).into();
    bool::from(digest[..].ct_eq(&stage2[..]))
}

/// `SHA256(SHA256(stage1) + challenge)`
fn caching_sha2_mask(stage1: &[u8; 32], challenge: &[u8]) -> [u8; 32] {
    let stage2: [u8; 32] = Sha256::digest(stage1).into();
    let mut hasher = Sha256::new();
    hasher.update(stage2);
    hasher.update(challenge);
    hasher.finalize().into()
}

const CHALLENGE_ALPHABET: &[u8; 52] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generate a fresh greeting challenge.
///
/// The bytes are ASCII letters, never zero, since the greeting carries the
/// challenge in null-terminated segments.
pub fn generate_challenge() -> [u8; CHALLENGE_LEN] {
    let mut rng = rand::thread_rng();
    let mut challenge = [0u8; CHALLENGE_LEN];
    for byte in &mut challenge {
        *byte = CHALLENGE_ALPHABET[rng.gen_range(0..CHALLENGE_ALPHABET.len())];
    }
    challenge
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHALLENGE: &[u8; 20] = b"abcdefghijABCDEFGHIJ";

    // Responses a stock MySQL client sends for "123456" and CHALLENGE.
    const NATIVE_123456: [u8; 20] = [
        0x47, 0x87, 0xb7, 0xbc, 0x68, 0xc1, 0x7a, 0xa3, 0xf3, 0x7d, 0x62, 0x72, 0x79, 0xae, 0x37,
        0xc4, 0x05, 0x62, 0x5b, 0x8a,
    ];
    const SHA2_123456: [u8; 32] = [
        0xe9, 0x63, 0x41, 0x7d, 0xcb, 0x8e, 0xe0, 0x63, 0x3d, 0x55, 0x94, 0xbe, 0xda, 0x4c, 0x34,
        0x47, 0x31, 0xf0, 0xa5, 0x78, 0x92, 0x60, 0xcd, 0xd8, 0x65, 0xb2, 0x8a, 0xa8, 0x62, 0xc8,
        0x45, 0x75,
    ];

    #[test]
    fn test_native_password_accepts_exact_response() {
        let response = scramble_native_password("123456", CHALLENGE);
        assert_eq!(response.len(), 20);
        assert!(verify_native_password("123456", CHALLENGE, &response));
    }

    #[test]
    fn test_native_password_known_vector() {
        let response = scramble_native_password("123456", CHALLENGE);
        assert_eq!(response, NATIVE_123456);
        assert!(verify_native_password("123456", CHALLENGE, &NATIVE_123456));
    }

    #[test]
    fn test_native_password_rejects_every_bit_flip() {
        for bit in 0..NATIVE_123456.len() * 8 {
            let mut response = NATIVE_123456;
            response[bit / 8] ^= 1u8 << (bit % 8);
            assert!(
                !verify_native_password("123456", CHALLENGE, &response),
                "bit {} accepted",
                bit
            );
        }
    }

    #[test]
    fn test_native_password_rejects_wrong_password_and_length() {
        let response = scramble_native_password("654321", CHALLENGE);
        assert!(!verify_native_password("123456", CHALLENGE, &response));
        assert!(!verify_native_password("123456", CHALLENGE, &response[..19]));
        assert!(!verify_native_password("123456", CHALLENGE, &[]));
    }

    #[test]
    fn test_native_password_empty() {
        assert!(scramble_native_password("", CHALLENGE).is_empty());
        assert!(verify_native_password("", CHALLENGE, &[]));
        assert!(!verify_native_password("", CHALLENGE, &[0]));
    }

    #[test]
    fn test_native_password_depends_on_challenge() {
        let other = b"ABCDEFGHIJabcdefghij";
        assert_ne!(
            scramble_native_password("123456", CHALLENGE),
            scramble_native_password("123456", other)
        );
    }

    #[test]
    fn test_caching_sha2_accepts_exact_response() {
        let response = scramble_caching_sha2("123456", CHALLENGE);
        assert_eq!(response.len(), 32);
        assert!(verify_caching_sha2_password("123456", CHALLENGE, &response));
    }

    #[test]
    fn test_caching_sha2_known_vector() {
        let response = scramble_caching_sha2("123456", CHALLENGE);
        assert_eq!(response, SHA2_123456);
        assert!(verify_caching_sha2_password("123456", CHALLENGE, &SHA2_123456));
        assert!(!verify_caching_sha2_password("123456", CHALLENGE, &SHA2_123456[..20]));
    }

    #[test]
    fn test_caching_sha2_rejects_every_bit_flip() {
        for bit in 0..SHA2_123456.len() * 8 {
            let mut response = SHA2_123456;
            response[bit / 8] ^= 1u8 << (bit % 8);
            assert!(
                !verify_caching_sha2_password("123456", CHALLENGE, &response),
                "bit {} accepted",
                bit
            );
        }
    }

    #[test]
    fn test_caching_sha2_empty() {
        assert!(verify_caching_sha2_password("", CHALLENGE, &[0]));
        assert!(!verify_caching_sha2_password("", CHALLENGE, &[]));
        assert!(!verify_caching_sha2_password("", CHALLENGE, &[0, 0]));
    }

    #[test]
    fn test_plugin_names() {
        assert_eq!(
            AuthPlugin::from_name("mysql_native_password"),
            Some(AuthPlugin::NativePassword)
        );
        assert_eq!(
            AuthPlugin::from_name("caching_sha2_password"),
            Some(AuthPlugin::CachingSha2Password)
        );
        assert_eq!(AuthPlugin::from_name("sha256_password"), None);
        assert_eq!(AuthPlugin::CachingSha2Password.name(), "caching_sha2_password");
    }

    #[test]
    fn test_plugin_verify_dispatch() {
        let native = scramble_native_password("pw", CHALLENGE);
        let sha2 = scramble_caching_sha2("pw", CHALLENGE);
        assert!(AuthPlugin::NativePassword.verify("pw", CHALLENGE, &native));
        assert!(!AuthPlugin::NativePassword.verify("pw", CHALLENGE, &sha2));
        assert!(AuthPlugin::CachingSha2Password.verify("pw", CHALLENGE, &sha2));
    }

    #[test]
    fn test_generate_challenge_is_printable() {
        let challenge = generate_challenge();
        assert!(challenge.iter().all(|b| b.is_ascii_alphabetic()));
        assert!(!challenge.contains(&0));
    }
}
