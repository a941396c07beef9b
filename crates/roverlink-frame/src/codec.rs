use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use roverlink_crypto::{decrypt, encrypt, Iv, Key, ZERO_IV};

use crate::error::{FrameError, Result};

/// Separator between the IV and the ciphertext in a framed datagram.
pub const FRAME_SEPARATOR: u8 = b',';

/// Datagram layout, fixed per channel for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMode {
    /// Ciphertext only, implicit all-zero IV. Used for media units.
    Raw,
    /// `base64(iv),base64(ciphertext)` text. Used for telemetry and commands.
    Framed,
}

impl WireMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WireMode::Raw => "raw",
            WireMode::Framed => "framed",
        }
    }
}

impl fmt::Display for WireMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encode a framed datagram.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬─────┬────────────────────────┐
/// │ base64(IV, 16B)  │ "," │ base64(ciphertext)     │
/// └──────────────────┴─────┴────────────────────────┘
/// ```
pub fn encode_framed(iv: &Iv, ciphertext: &[u8]) -> String {
    let mut out = STANDARD.encode(iv);
    out.push(FRAME_SEPARATOR as char);
    STANDARD.encode_string(ciphertext, &mut out);
    out
}

/// Split a framed datagram on its first separator and decode both halves.
pub fn decode_framed(datagram: &[u8]) -> Result<(Iv, Vec<u8>)> {
    let text = std::str::from_utf8(datagram).map_err(|_| FrameError::NotUtf8)?;
    let (iv_b64, ct_b64) = text
        .split_once(FRAME_SEPARATOR as char)
        .ok_or(FrameError::MissingSeparator)?;

    let iv_bytes = STANDARD
        .decode(iv_b64)
        .map_err(|source| FrameError::Base64 { part: "iv", source })?;
    let iv: Iv = iv_bytes
        .as_slice()
        .try_into()
        .map_err(|_| FrameError::InvalidIvLength {
            len: iv_bytes.len(),
        })?;

    let ciphertext = STANDARD
        .decode(ct_b64)
        .map_err(|source| FrameError::Base64 {
            part: "ciphertext",
            source,
        })?;

    Ok((iv, ciphertext))
}

/// Encrypt `plaintext` into one datagram.
///
/// `iv` is only used in framed mode; raw mode always encrypts under the zero IV.
pub fn seal(mode: WireMode, key: &Key, iv: &Iv, plaintext: &[u8]) -> Result<Vec<u8>> {
    match mode {
        WireMode::Raw => Ok(encrypt(key, &ZERO_IV, plaintext)?),
        WireMode::Framed => {
            let ciphertext = encrypt(key, iv, plaintext)?;
            Ok(encode_framed(iv, &ciphertext).into_bytes())
        }
    }
}

/// Recover the plaintext carried by one datagram.
pub fn open(mode: WireMode, key: &Key, datagram: &[u8]) -> Result<Vec<u8>> {
    match mode {
        WireMode::Raw => Ok(decrypt(key, &ZERO_IV, datagram)?),
        WireMode::Framed => {
            let (iv, ciphertext) = decode_framed(datagram)?;
            Ok(decrypt(key, &iv, &ciphertext)?)
        }
    }
}
