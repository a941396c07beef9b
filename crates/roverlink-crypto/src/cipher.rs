//! AES-CBC with a self-describing random padding.
//!
//! Padded plaintext layout:
//!
//! ```text
//! ┌───────────────────┬──────────────────────────┬──────────────┐
//! │ plaintext (n B)   │ random bytes (pad_len B) │ pad_len (1B) │
//! └───────────────────┴──────────────────────────┴──────────────┘
//! pad_len = 16 + (16 - n % 16) - 1, so 16 <= pad_len <= 31
//! ```
//!
//! The total is always a whole number of AES blocks, and at least one full
//! block of noise hides the exact plaintext length. There is no
//! authentication: a tampered ciphertext decrypts to garbage, and the only
//! check performed is that the trailing length byte is plausible.

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, Result};
use crate::key::Key;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Initialization vector length in bytes.
pub const IV_LEN: usize = 16;

/// Smallest padding run (excluding the length byte).
pub const MIN_PAD_LEN: usize = BLOCK_SIZE;

/// Largest padding run (excluding the length byte).
pub const MAX_PAD_LEN: usize = 2 * BLOCK_SIZE - 1;

/// A CBC initialization vector.
pub type Iv = [u8; IV_LEN];

/// The fixed IV used by raw-mode datagrams.
pub const ZERO_IV: Iv = [0u8; IV_LEN];

/// Generate a fresh IV from the OS random source.
pub fn random_iv() -> Iv {
    let mut iv = ZERO_IV;
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Number of random padding bytes appended to an `len`-byte plaintext.
pub fn pad_len_for(len: usize) -> usize {
    BLOCK_SIZE + (BLOCK_SIZE - len % BLOCK_SIZE) - 1
}

/// Pad and encrypt `plaintext` under `key` and `iv`.
pub fn encrypt(key: &Key, iv: &Iv, plaintext: &[u8]) -> Result<Vec<u8>> {
    if plaintext.is_empty() {
        return Err(CryptoError::EmptyPlaintext);
    }

    let pad_len = pad_len_for(plaintext.len());
    let mut padded = Vec::with_capacity(plaintext.len() + pad_len + 1);
    padded.extend_from_slice(plaintext);
    padded.resize(plaintext.len() + pad_len, 0);
    OsRng.fill_bytes(&mut padded[plaintext.len()..]);
    padded.push(pad_len as u8);
    debug_assert_eq!(padded.len() % BLOCK_SIZE, 0);

    match key.len() {
        16 => encrypt_blocks::<cbc::Encryptor<Aes128>>(key, iv, &padded),
        24 => encrypt_blocks::<cbc::Encryptor<Aes192>>(key, iv, &padded),
        32 => encrypt_blocks::<cbc::Encryptor<Aes256>>(key, iv, &padded),
        len => Err(CryptoError::InvalidKeyLength { len }),
    }
}

/// Decrypt `ciphertext` under `key` and `iv` and strip the padding.
pub fn decrypt(key: &Key, iv: &Iv, ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::Misaligned {
            len: ciphertext.len(),
        });
    }

    let mut decrypted = match key.len() {
        16 => decrypt_blocks::<cbc::Decryptor<Aes128>>(key, iv, ciphertext)?,
        24 => decrypt_blocks::<cbc::Decryptor<Aes192>>(key, iv, ciphertext)?,
        32 => decrypt_blocks::<cbc::Decryptor<Aes256>>(key, iv, ciphertext)?,
        len => return Err(CryptoError::InvalidKeyLength { len }),
    };

    let plaintext_len = unpadded_len(&decrypted)?;
    decrypted.truncate(plaintext_len);
    Ok(decrypted)
}

/// Validate the trailing length byte and return the plaintext length.
fn unpadded_len(decrypted: &[u8]) -> Result<usize> {
    let len = decrypted.len();
    let pad_len = match decrypted.last() {
        Some(&byte) => byte as usize,
        None => return Err(CryptoError::InvalidPadding { pad_len: 0, len }),
    };

    // Anything outside the range encrypt() produces is garbage, and the
    // result must keep at least one plaintext byte.
    if !(MIN_PAD_LEN..=MAX_PAD_LEN).contains(&pad_len) || pad_len + 1 >= len {
        return Err(CryptoError::InvalidPadding { pad_len, len });
    }

    Ok(len - pad_len - 1)
}

fn encrypt_blocks<E>(key: &Key, iv: &Iv, padded: &[u8]) -> Result<Vec<u8>>
where
    E: KeyIvInit + BlockEncryptMut,
{
    let encryptor = E::new_from_slices(key.as_bytes(), iv)
        .map_err(|_| CryptoError::InvalidKeyLength { len: key.len() })?;
    Ok(encryptor.encrypt_padded_vec_mut::<NoPadding>(padded))
}

fn decrypt_blocks<D>(key: &Key, iv: &Iv, ciphertext: &[u8]) -> Result<Vec<u8>>
where
    D: KeyIvInit + BlockDecryptMut,
{
    let decryptor = D::new_from_slices(key.as_bytes(), iv)
        .map_err(|_| CryptoError::InvalidKeyLength { len: key.len() })?;
    decryptor
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| CryptoError::Misaligned {
            len: ciphertext.len(),
        })
}
