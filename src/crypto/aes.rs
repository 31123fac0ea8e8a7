//! AES-256 in counter mode
//!
//! A 16-byte IV whose last four bytes are a big-endian block counter, no
//! padding; ciphertext length equals plaintext length and decryption is the
//! same keystream application.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr32BE;

/// AES-256 key length in bytes
pub const KEY_LEN: usize = 32;

/// IV length in bytes
pub const IV_LEN: usize = 16;

/// The fixed all-zero IV used for packet payloads
pub const ZERO_IV: [u8; IV_LEN] = [0; IV_LEN];

type Aes256Ctr = Ctr32BE<Aes256>;

/// Apply the AES-256-CTR keystream to `data` in place
///
/// CTR mode is symmetric: applying the keystream twice with the same key and
/// IV restores the original bytes, so this serves as both `encrypt` and
/// `decrypt`.
pub fn apply_keystream(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], data: &mut [u8]) {
    let mut cipher = Aes256Ctr::new(key.into(), iv.into());
    cipher.apply_keystream(data);
}

/// Encrypt `data` in place with the zero IV
pub fn encrypt_in_place(key: &[u8; KEY_LEN], data: &mut [u8]) {
    apply_keystream(key, &ZERO_IV, data);
}

/// Decrypt `data` in place with the zero IV
pub fn decrypt_in_place(key: &[u8; KEY_LEN], data: &mut [u8]) {
    apply_keystream(key, &ZERO_IV, data);
}
