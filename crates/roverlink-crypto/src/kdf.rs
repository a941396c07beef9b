//! Password-based key derivation.
//!
//! Both ends of the link derive the same key from a shared password and salt
//! with PBKDF2-HMAC-SHA512. The round count is deliberately high so an
//! intercepted datagram cannot be used to brute-force a weak password cheaply.

use sha2::{Digest, Sha512};

use crate::error::{CryptoError, Result};
use crate::key::Key;

/// PBKDF2 round count used by every deployed rover and operator console.
pub const KDF_ROUNDS: u32 = 1_200_000;

/// Derive a `key_len`-byte key from `password` and `salt` using [`KDF_ROUNDS`].
pub fn derive_key(password: &[u8], salt: &[u8], key_len: usize) -> Result<Key> {
    derive_key_with_rounds(password, salt, key_len, KDF_ROUNDS)
}

/// Derive a key with an explicit PBKDF2 round count.
///
/// Both peers must use the same round count or they end up with different keys.
pub fn derive_key_with_rounds(
    password: &[u8],
    salt: &[u8],
    key_len: usize,
    rounds: u32,
) -> Result<Key> {
    if key_len == 0 {
        return Err(CryptoError::ZeroKeyLength);
    }
    if rounds == 0 {
        return Err(CryptoError::ZeroRounds);
    }

    let mut out = vec![0u8; key_len];
    pbkdf2::pbkdf2_hmac::<Sha512>(password, salt, rounds, &mut out);
    Ok(Key::from_bytes(out))
}

/// Fast SHA-512 digest. Not suitable for passwords; see [`derive_key`].
pub fn fingerprint(data: &[u8]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    hasher.update(data);
    hasher.finalize().into()
}
