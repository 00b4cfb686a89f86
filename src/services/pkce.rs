// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! PKCE verifier/challenge and opaque token generation.
//!
//! All randomness comes from the operating system CSPRNG. Encodings are
//! base64url without padding, so every value is safe in a query string.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Random bytes behind a code verifier (43 characters once encoded).
pub const VERIFIER_BYTES: usize = 32;

/// Smallest length accepted for `state` / `nonce` values.
pub const MIN_OPAQUE_TOKEN_BYTES: usize = 16;

/// Generate a code verifier from 32 random bytes.
pub fn generate_verifier() -> String {
    random_base64url(VERIFIER_BYTES)
}

/// Derive the S256 code challenge: `BASE64URL(SHA256(ascii(verifier)))`.
pub fn derive_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Generate an opaque `state` or `nonce` value.
///
/// Requests shorter than 16 bytes are raised to 16.
pub fn generate_opaque_token(byte_length: usize) -> String {
    random_base64url(byte_length.max(MIN_OPAQUE_TOKEN_BYTES))
}

fn random_base64url(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
