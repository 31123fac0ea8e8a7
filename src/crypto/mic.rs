//! MIC key selection, computation and verification
//!
//! The MIC is an AES-CMAC over the packet header (with the CRC field zeroed,
//! see [`crate::packet::Packet::mic_header_bytes`]) followed by the encrypted
//! payload, truncated to four bytes and appended after the payload.
//!
//! Key selection:
//!
//! | Topic | Key |
//! |---|---|
//! | INCLUDE_OPEN, INCLUDE_REQUEST | none (cleartext key exchange) |
//! | INCLUDE_RESPONSE | SHA-256 of the static ECDH between the two devices |
//! | INCLUDE_CONFIRM, INCLUDE_SUCCESS | network key |
//! | regular traffic | network key (device included, or hub) |

use crate::config::device::{DeviceType, InclusionState};
use crate::crypto::{cmac, ecies, EncryptionService};
use crate::packet::{Topic, MIC_LEN};
use crate::{Error, Result};

/// Whether packets with this topic carry a MIC
///
/// The two cleartext public-key exchange messages are the only unprotected
/// topics.
pub fn requires_mic(topic: u8) -> bool {
    topic != Topic::IncludeOpen as u8 && topic != Topic::IncludeRequest as u8
}

/// Select the 32-byte MIC key for a message
pub fn mic_key(
    enc: &EncryptionService,
    topic: u8,
    device_type: DeviceType,
    state: InclusionState,
) -> Result<[u8; 32]> {
    if topic == Topic::IncludeOpen as u8 || topic == Topic::IncludeRequest as u8 {
        return Err(Error::MissingKey);
    }
    if topic == Topic::IncludeResponse as u8 {
        return response_mac_key(enc, device_type);
    }
    if topic == Topic::IncludeConfirm as u8 || topic == Topic::IncludeSuccess as u8 {
        return enc.network_key().copied().ok_or(Error::MissingKey);
    }
    // Regular traffic requires the device to hold the network key.
    if state == InclusionState::Included || device_type == DeviceType::Hub {
        enc.network_key().copied().ok_or(Error::MissingKey)
    } else {
        Err(Error::MissingKey)
    }
}

/// Compute the 4-byte MIC for a message
pub fn compute(
    enc: &EncryptionService,
    header: &[u8],
    encrypted_payload: &[u8],
    topic: u8,
    device_type: DeviceType,
    state: InclusionState,
) -> Result<[u8; MIC_LEN]> {
    let key = mic_key(enc, topic, device_type, state)?;
    Ok(cmac::compute_mic(&key, header, encrypted_payload))
}

/// Verify a received MIC
///
/// Returns [`Error::MicFail`] on mismatch and [`Error::MissingKey`] when the
/// key material to verify is not available.
pub fn verify(
    enc: &EncryptionService,
    header: &[u8],
    encrypted_payload: &[u8],
    received: &[u8; MIC_LEN],
    topic: u8,
    device_type: DeviceType,
    state: InclusionState,
) -> Result<()> {
    let key = mic_key(enc, topic, device_type, state)?;
    if cmac::verify_mic(&key, header, encrypted_payload, received) {
        Ok(())
    } else {
        Err(Error::MicFail)
    }
}

/// k_mac for INCLUDE_RESPONSE: SHA-256 of the static-static ECDH between the
/// hub and the candidate device
///
/// Both sides derive the same key: the hub pairs its private key with the
/// candidate's public key, the device pairs its private key with the hub's
/// public key.
fn response_mac_key(enc: &EncryptionService, device_type: DeviceType) -> Result<[u8; 32]> {
    let private = enc.device_private().ok_or(Error::MissingKey)?;
    let peer = if device_type == DeviceType::Hub {
        enc.temp_peer_public().ok_or(Error::MissingKey)?
    } else {
        enc.hub_public().ok_or(Error::MissingKey)?
    };
    ecies::shared_key(private, peer)
}
