//! Encryption method selection and key material
//!
//! Packets are encrypted with one of three methods chosen by message topic,
//! device role and inclusion state:
//!
//! | Topic | Role / state | Method |
//! |---|---|---|
//! | INCLUDE_OPEN | any | none |
//! | INCLUDE_REQUEST | any | none (cleartext public-key exchange) |
//! | INCLUDE_RESPONSE | hub, or pending standard device | ECIES |
//! | INCLUDE_CONFIRM / INCLUDE_SUCCESS | hub, or pending standard device | AES |
//! | anything else | included device or hub | AES |
//!
//! The service owns the key material: the shared network key, the device's
//! own keypair, the hub's public key, and (hub only) the public key of the
//! device currently being included.

use rand_core::CryptoRngCore;

use crate::config::device::{DeviceType, InclusionState};
use crate::crypto::{aes, ecies};
use crate::packet::{PayloadBuf, Topic};
use crate::{Error, Result};

/// Length of the shared network key
pub const NETWORK_KEY_LEN: usize = 32;

/// How a payload is protected on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncryptionMethod {
    /// Cleartext
    None,
    /// ECIES to the peer's public key
    Ecies,
    /// AES-256-CTR with the shared network key
    Aes,
}

/// Holds key material and applies the per-message encryption method
#[derive(Clone, Default)]
pub struct EncryptionService {
    network_key: Option<[u8; NETWORK_KEY_LEN]>,
    device_private: Option<[u8; ecies::PRIVATE_KEY_LEN]>,
    device_public: Option<[u8; ecies::PUBLIC_KEY_LEN]>,
    hub_public: Option<[u8; ecies::PUBLIC_KEY_LEN]>,
    temp_peer_public: Option<[u8; ecies::PUBLIC_KEY_LEN]>,
}

impl EncryptionService {
    /// Create a service with no key material
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shared network key
    pub fn set_network_key(&mut self, key: [u8; NETWORK_KEY_LEN]) {
        self.network_key = Some(key);
    }

    /// The shared network key, if known
    pub fn network_key(&self) -> Option<&[u8; NETWORK_KEY_LEN]> {
        self.network_key.as_ref()
    }

    /// Set this device's own keypair
    pub fn set_device_keys(
        &mut self,
        private: [u8; ecies::PRIVATE_KEY_LEN],
        public: [u8; ecies::PUBLIC_KEY_LEN],
    ) {
        self.device_private = Some(private);
        self.device_public = Some(public);
    }

    /// This device's private key, if known
    pub fn device_private(&self) -> Option<&[u8; ecies::PRIVATE_KEY_LEN]> {
        self.device_private.as_ref()
    }

    /// This device's public key, if known
    pub fn device_public(&self) -> Option<&[u8; ecies::PUBLIC_KEY_LEN]> {
        self.device_public.as_ref()
    }

    /// Set the hub's public key
    pub fn set_hub_public(&mut self, key: [u8; ecies::PUBLIC_KEY_LEN]) {
        self.hub_public = Some(key);
    }

    /// The hub's public key, if known
    pub fn hub_public(&self) -> Option<&[u8; ecies::PUBLIC_KEY_LEN]> {
        self.hub_public.as_ref()
    }

    /// Set the public key of the device currently being included (hub only)
    pub fn set_temp_peer_public(&mut self, key: [u8; ecies::PUBLIC_KEY_LEN]) {
        self.temp_peer_public = Some(key);
    }

    /// The candidate device's public key, if an inclusion is in progress
    pub fn temp_peer_public(&self) -> Option<&[u8; ecies::PUBLIC_KEY_LEN]> {
        self.temp_peer_public.as_ref()
    }

    /// Forget the candidate device's public key
    pub fn clear_temp_peer_public(&mut self) {
        self.temp_peer_public = None;
    }

    /// Select the encryption method for a message
    ///
    /// INCLUDE_REQUEST travels in cleartext: a fresh device cannot hold the
    /// hub's public key before INCLUDE_RESPONSE delivers it.
    pub fn determine_method(
        topic: u8,
        device_type: DeviceType,
        state: InclusionState,
    ) -> EncryptionMethod {
        if topic == Topic::IncludeOpen as u8 || topic == Topic::IncludeRequest as u8 {
            EncryptionMethod::None
        } else if topic == Topic::IncludeResponse as u8 {
            if device_type == DeviceType::Hub
                || (device_type == DeviceType::Standard && state == InclusionState::Pending)
            {
                EncryptionMethod::Ecies
            } else {
                EncryptionMethod::None
            }
        } else if topic == Topic::IncludeConfirm as u8 || topic == Topic::IncludeSuccess as u8 {
            if device_type == DeviceType::Hub
                || (device_type == DeviceType::Standard && state == InclusionState::Pending)
            {
                EncryptionMethod::Aes
            } else {
                EncryptionMethod::None
            }
        } else if state == InclusionState::Included || device_type == DeviceType::Hub {
            EncryptionMethod::Aes
        } else {
            EncryptionMethod::None
        }
    }

    /// Encrypt a cleartext payload for transmission
    pub fn encrypt(
        &self,
        rng: &mut impl CryptoRngCore,
        payload: &[u8],
        topic: u8,
        device_type: DeviceType,
        state: InclusionState,
    ) -> Result<PayloadBuf> {
        match Self::determine_method(topic, device_type, state) {
            EncryptionMethod::None => copy_payload(payload),
            EncryptionMethod::Ecies => {
                // The hub encrypts INCLUDE_RESPONSE to the candidate device.
                let peer = self.temp_peer_public.ok_or(Error::MissingKey)?;
                ecies::encrypt(rng, &peer, payload)
            }
            EncryptionMethod::Aes => {
                let key = self.network_key.ok_or(Error::MissingKey)?;
                let mut out = copy_payload(payload)?;
                aes::encrypt_in_place(&key, &mut out);
                Ok(out)
            }
        }
    }

    /// Decrypt a received payload
    pub fn decrypt(
        &self,
        payload: &[u8],
        topic: u8,
        device_type: DeviceType,
        state: InclusionState,
    ) -> Result<PayloadBuf> {
        if payload.is_empty() {
            return Ok(PayloadBuf::new());
        }
        match Self::determine_method(topic, device_type, state) {
            EncryptionMethod::None => copy_payload(payload),
            EncryptionMethod::Ecies => {
                let private = self.device_private.ok_or(Error::MissingKey)?;
                ecies::decrypt(&private, payload)
            }
            EncryptionMethod::Aes => {
                let key = self.network_key.ok_or(Error::MissingKey)?;
                let mut out = copy_payload(payload)?;
                aes::decrypt_in_place(&key, &mut out);
                Ok(out)
            }
        }
    }
}

fn copy_payload(payload: &[u8]) -> Result<PayloadBuf> {
    let mut out = PayloadBuf::new();
    out.extend_from_slice(payload).map_err(|_| Error::PacketTooLong)?;
    Ok(out)
}
