//! PKCE S256 verifier and challenge generation
//!
//! Implements the Proof Key for Code Exchange extension (RFC 7636) with the
//! `S256` challenge method.  Providers that support PKCE call these helpers
//! from their `build_auth_params` hook and send the verifier back during the
//! code exchange.
//!
//! # References
//!
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use base64::Engine as _;
use sha2::{Digest, Sha256};

/// Number of random bytes behind a verifier. 48 bytes encode to 64
/// base64url characters, inside the 43..=128 range RFC 7636 allows.
const VERIFIER_ENTROPY_BYTES: usize = 48;

/// The only challenge method produced by this module.
pub const CHALLENGE_METHOD: &str = "S256";

// ---------------------------------------------------------------------------
// PkcePair
// ---------------------------------------------------------------------------

/// A verifier together with its derived S256 challenge.
///
/// # Examples
///
/// ```
/// use credflow::auth::pkce::PkcePair;
///
/// let pair = PkcePair::generate();
/// assert_eq!(pair.verifier.len(), 64);
/// assert_eq!(pair.method, "S256");
/// ```
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// Sent to the token endpoint as `code_verifier`
    pub verifier: String,
    /// Sent to the authorization endpoint as `code_challenge`
    pub challenge: String,
    /// Always `"S256"`
    pub method: String,
}

impl PkcePair {
    /// Generates a fresh verifier and computes its challenge.
    pub fn generate() -> Self {
        let verifier = generate_code_verifier();
        let challenge = generate_code_challenge(&verifier);
        Self {
            verifier,
            challenge,
            method: CHALLENGE_METHOD.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

/// Generates a cryptographically random, URL-safe code verifier.
///
/// The result is 64 characters from the base64url alphabet with no `=`
/// padding.  Two calls never return the same value in practice.
///
/// # Examples
///
/// ```
/// use credflow::auth::pkce::generate_code_verifier;
///
/// let v = generate_code_verifier();
/// assert!(v.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
/// ```
pub fn generate_code_verifier() -> String {
    use rand::RngCore as _;

    let mut random_bytes = [0u8; VERIFIER_ENTROPY_BYTES];
    rand::rng().fill_bytes(&mut random_bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Derives the S256 code challenge for `verifier`.
///
/// `BASE64URL(SHA256(ASCII(verifier)))` without padding.  Deterministic for a
/// given input.
///
/// # Examples
///
/// ```
/// use credflow::auth::pkce::generate_code_challenge;
///
/// // RFC 7636 Appendix B
/// let challenge = generate_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
/// assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
/// ```
pub fn generate_code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
