//! AES-CMAC message integrity codes
//!
//! RFC 4493 CMAC over AES-256. The full 16-byte tag is truncated to the
//! first four bytes for the on-wire MIC; verification compares in constant
//! time.

use aes::Aes256;
use cmac::{Cmac, Mac};
use subtle::ConstantTimeEq;

use crate::crypto::aes::KEY_LEN;
use crate::packet::MIC_LEN;

/// Length of the untruncated CMAC tag
pub const TAG_LEN: usize = 16;

/// Compute the full 16-byte CMAC tag over `parts` in order
pub fn compute_tag(key: &[u8; KEY_LEN], parts: &[&[u8]]) -> [u8; TAG_LEN] {
    let mut mac = <Cmac<Aes256> as Mac>::new(key.into());
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// Compute the 4-byte MIC over a header and encrypted payload
pub fn compute_mic(key: &[u8; KEY_LEN], header: &[u8], encrypted_payload: &[u8]) -> [u8; MIC_LEN] {
    let tag = compute_tag(key, &[header, encrypted_payload]);
    let mut mic = [0u8; MIC_LEN];
    mic.copy_from_slice(&tag[..MIC_LEN]);
    mic
}

/// Verify a received MIC in constant time
pub fn verify_mic(
    key: &[u8; KEY_LEN],
    header: &[u8],
    encrypted_payload: &[u8],
    received: &[u8; MIC_LEN],
) -> bool {
    let computed = compute_mic(key, header, encrypted_payload);
    computed.as_slice().ct_eq(received.as_slice()).into()
}
