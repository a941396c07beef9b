//! Symmetric crypto primitives for the rover link.
//!
//! - [`kdf`]: PBKDF2-HMAC-SHA512 key derivation from a shared password
//! - [`cipher`]: AES-CBC with a length-obscuring random padding scheme
//!
//! This is the lowest layer of roverlink. The datagram channels in
//! `roverlink-link` are built on the [`Key`] and the `encrypt`/`decrypt`
//! pair provided here.

pub mod cipher;
pub mod error;
pub mod kdf;
pub mod key;

pub use cipher::{decrypt, encrypt, random_iv, Iv, BLOCK_SIZE, IV_LEN, ZERO_IV};
pub use error::{CryptoError, Result};
pub use kdf::{derive_key, derive_key_with_rounds, fingerprint, KDF_ROUNDS};
pub use key::Key;
