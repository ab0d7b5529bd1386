//! HMAC-SHA256 webhook signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::SignatureError;

type HmacSha256 = Hmac<Sha256>;

fn mac_over(secret: &str, parts: &[&[u8]]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Mismatch)?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac)
}

/// Hex HMAC-SHA256 of the concatenated parts.
pub fn sign_hex(secret: &str, parts: &[&[u8]]) -> Result<String, SignatureError> {
    Ok(hex::encode(mac_over(secret, parts)?.finalize().into_bytes()))
}

/// Checks a hex signature in constant time.
pub fn verify_hex(secret: &str, parts: &[&[u8]], signature_hex: &str) -> Result<(), SignatureError> {
    let expected = hex::decode(signature_hex.trim()).map_err(|_| SignatureError::MalformedHeader)?;
    mac_over(secret, parts)?
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}
