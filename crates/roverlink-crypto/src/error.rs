/// Errors that can occur during key derivation, encryption, or decryption.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The cipher refuses to encrypt an empty payload.
    #[error("plaintext must not be empty")]
    EmptyPlaintext,

    /// A zero-length key was requested from the KDF.
    #[error("requested key length must be greater than zero")]
    ZeroKeyLength,

    /// The KDF was asked to run zero rounds.
    #[error("kdf rounds must be greater than zero")]
    ZeroRounds,

    /// The key does not select an AES variant.
    #[error("invalid key length ({len} bytes, expected 16, 24 or 32)")]
    InvalidKeyLength { len: usize },

    /// The ciphertext is empty or not a whole number of blocks.
    #[error("ciphertext is not block aligned ({len} bytes)")]
    Misaligned { len: usize },

    /// The trailing padding-length byte is out of range for the decrypted buffer.
    #[error("invalid padding length {pad_len} for {len} decrypted bytes")]
    InvalidPadding { pad_len: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, CryptoError>;
