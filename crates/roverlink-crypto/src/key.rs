use std::fmt;

use zeroize::Zeroizing;

use crate::kdf::fingerprint;

/// Shared symmetric key.
///
/// Derived once per process and shared between channels behind an `Arc`.
/// The bytes are wiped on drop and never appear in `Debug` output.
pub struct Key {
    bytes: Zeroizing<Vec<u8>>,
}

impl Key {
    /// Wrap raw key material.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
        }
    }

    /// Borrow the raw key material.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Short SHA-512 fingerprint, safe to log.
    ///
    /// Both ends of a link print this at startup so a password or salt
    /// mismatch shows up before any traffic is lost to it.
    pub fn fingerprint_hex(&self) -> String {
        let digest = fingerprint(&self.bytes);
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("bytes", &format_args!("<redacted:{} bytes>", self.len()))
            .finish()
    }
}
