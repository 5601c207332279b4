use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Prefix carried by every EventSub signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Errors returned when an inbound callback fails authentication.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature mismatch")]
    Mismatch,
    #[error("failed to initialize signature verifier")]
    InvalidKey,
}

/// Computes the `sha256=<hex>` header value expected for a callback.
///
/// The MAC covers `message_id || timestamp || body`, keyed by the shared
/// webhook secret.
pub fn compute_signature(
    secret: &[u8],
    message_id: &str,
    timestamp: &str,
    body: &[u8],
) -> Result<String, SignatureError> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(message_id.as_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(body);
    Ok(format!(
        "{SIGNATURE_PREFIX}{}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Checks `provided` against the signature computed from the request parts.
///
/// The body is only borrowed so it stays available for decoding afterwards.
/// The comparison runs in constant time over the full header value.
pub fn verify_signature(
    secret: &[u8],
    message_id: &str,
    timestamp: &str,
    body: &[u8],
    provided: &str,
) -> Result<(), SignatureError> {
    let expected = compute_signature(secret, message_id, timestamp, body)?;
    if expected.as_bytes().ct_eq(provided.as_bytes()).into() {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}
