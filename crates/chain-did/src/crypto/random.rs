//! Secure random identifiers.
//!
//! Uses the operating system's cryptographic random source via `rand`.

use rand::RngCore;

/// Generate a fixed-size array of cryptographically secure random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// Generate a random 128-bit identifier as lowercase hex.
pub fn random_id() -> String {
    hex::encode(random_bytes::<16>())
}
