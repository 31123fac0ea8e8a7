//! Key generation and validation
//!
//! Device keypairs are P-256; the network key is a random 32-byte AES-256
//! secret generated by the hub on first use. The RNG handed in here must be
//! seeded from a hardware entropy source.

use rand_core::CryptoRngCore;

use crate::crypto::ecies::{self, PRIVATE_KEY_LEN, PUBLIC_KEY_LEN};
use crate::crypto::encryption::NETWORK_KEY_LEN;

/// Generate a device keypair, returned as `(public, private)`
pub fn generate_keypair(
    rng: &mut impl CryptoRngCore,
) -> ([u8; PUBLIC_KEY_LEN], [u8; PRIVATE_KEY_LEN]) {
    ecies::generate_keypair(rng)
}

/// Generate a fresh network key
pub fn generate_network_key(rng: &mut impl CryptoRngCore) -> [u8; NETWORK_KEY_LEN] {
    let mut key = [0u8; NETWORK_KEY_LEN];
    rng.fill_bytes(&mut key);
    key
}

/// Whether a byte slice is a plausible public key
pub fn is_valid_public_key(key: &[u8]) -> bool {
    key.len() == PUBLIC_KEY_LEN
}

/// Whether a byte slice is a plausible private key
pub fn is_valid_private_key(key: &[u8]) -> bool {
    key.len() == PRIVATE_KEY_LEN
}

/// Whether a byte slice is a plausible network key
pub fn is_valid_network_key(key: &[u8]) -> bool {
    key.len() == NETWORK_KEY_LEN
}
