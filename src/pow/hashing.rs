use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{constants, ProtocolError, Result};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 keyed by the decimal string of `nonce`.
pub fn pow_digest(nonce: u32, message: &[u8]) -> Result<[u8; 32]> {
    let key = nonce.to_string();
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|_| ProtocolError::PowWorkerFailed(constants::ERR_HMAC_KEY.to_string()))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

/// Success predicate: the big-endian value of the first four digest bytes is
/// strictly below `difficulty`.
#[inline]
pub fn meets_difficulty(digest: &[u8; 32], difficulty: u32) -> bool {
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) < difficulty
}

/// Recompute the digest for `nonce` and check it against `difficulty`.
pub fn verify(nonce: u32, message: &[u8], digest: &[u8; 32], difficulty: u32) -> bool {
    match pow_digest(nonce, message) {
        Ok(expected) => &expected == digest && meets_difficulty(digest, difficulty),
        Err(_) => false,
    }
}
