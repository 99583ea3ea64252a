//! URL-path-safe reversible token encoding.
//!
//! This is transport obfuscation only. There is no key and no signature,
//! so anyone who can read this module can mint a token that decodes
//! cleanly; callers must treat decoded payloads as untrusted input and
//! cross-check them against stored records.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("token is not valid url-safe base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("token payload is not valid utf-8")]
    Payload(#[from] std::string::FromUtf8Error),
}

/// Encode arbitrary text as a token safe to embed in a URL path segment.
/// Output uses the url-safe base64 alphabet with trailing padding stripped.
pub fn encode(plaintext: &str) -> String {
    URL_SAFE_NO_PAD.encode(plaintext.as_bytes())
}

/// Exact inverse of [`encode`]: `decode(encode(x)) == x` for every string.
/// Malformed input (wrong alphabet, stray padding, truncated length) is
/// rejected with [`DecodeError`], never a panic.
pub fn decode(token: &str) -> Result<String, DecodeError> {
    let bytes = URL_SAFE_NO_PAD.decode(token.as_bytes())?;
    Ok(String::from_utf8(bytes)?)
}
