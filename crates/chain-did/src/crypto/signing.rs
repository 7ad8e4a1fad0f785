//! Ed25519 signing and verification over ordered input sequences.
//!
//! A signature covers the plain concatenation of its inputs. Signatures
//! are carried as unpadded URL-safe base64.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};

use super::keys::verifying_key_from_base58;

/// Concatenate signing inputs into one message.
pub fn concat(inputs: &[&[u8]]) -> Vec<u8> {
    let len = inputs.iter().map(|i| i.len()).sum();
    let mut message = Vec::with_capacity(len);
    for input in inputs {
        message.extend_from_slice(input);
    }
    message
}

/// Sign the concatenated inputs and return the base64 signature.
pub fn sign(signing_key: &SigningKey, inputs: &[&[u8]]) -> String {
    let sig = signing_key.sign(&concat(inputs));
    URL_SAFE_NO_PAD.encode(sig.to_bytes())
}

/// Verify a base64 signature over the concatenated inputs.
///
/// Any decoding failure counts as a failed verification.
pub fn verify(public_key: &str, signature: &str, inputs: &[&[u8]]) -> bool {
    let Ok(verifying_key) = verifying_key_from_base58(public_key) else {
        return false;
    };
    let Ok(sig_bytes) = URL_SAFE_NO_PAD.decode(signature) else {
        return false;
    };
    let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    verifying_key
        .verify(&concat(inputs), &Signature::from_bytes(&sig_array))
        .is_ok()
}
