//! Device identity and configuration
//!
//! This module provides types for identifying mesh devices and configuring
//! their role in the network. It includes:
//! - The 4-byte device identifier and broadcast address
//! - The device role (standard node or hub)
//! - The persisted inclusion state
//! - Device configuration for standard and hub nodes

use crate::radio::traits::LoraParams;
use crate::{Error, Result};

/// Device identifier (4 bytes, opaque, compared byte-wise)
pub type DeviceId = [u8; 4];

/// The broadcast destination address
pub const BROADCAST_ID: DeviceId = [0xFF, 0xFF, 0xFF, 0xFF];

/// Check whether an identifier is the broadcast address
pub fn is_broadcast(id: &DeviceId) -> bool {
    *id == BROADCAST_ID
}

/// Role of a device in the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DeviceType {
    /// The device role is unknown
    Unknown = 1,
    /// A standard node: sends and receives, and relays when enabled
    Standard = 2,
    /// The coordinating node: routes all traffic and admits new devices
    Hub = 3,
}

impl DeviceType {
    /// Decode a device type from its wire value
    pub fn from_u8(value: u8) -> Self {
        match value {
            2 => DeviceType::Standard,
            3 => DeviceType::Hub,
            _ => DeviceType::Unknown,
        }
    }
}

/// Persisted inclusion state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum InclusionState {
    /// Fresh device, never admitted to a network
    NotIncluded = 0,
    /// Inclusion handshake in progress
    Pending = 1,
    /// Device holds the network key and may send application traffic
    Included = 2,
}

impl InclusionState {
    /// Decode an inclusion state from its persisted value
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => InclusionState::Pending,
            2 => InclusionState::Included,
            _ => InclusionState::NotIncluded,
        }
    }
}

/// Device configuration
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Device identifier
    pub id: DeviceId,
    /// Device role
    pub device_type: DeviceType,
    /// Whether this device forwards packets addressed to other nodes
    pub relay_enabled: bool,
    /// LoRa modem parameters
    pub lora: LoraParams,
}

impl DeviceConfig {
    /// Create a configuration for a standard node
    pub fn new_standard(id: DeviceId, lora: LoraParams) -> Self {
        Self {
            id,
            device_type: DeviceType::Standard,
            relay_enabled: false,
            lora,
        }
    }

    /// Create a configuration for a hub node
    pub fn new_hub(id: DeviceId, lora: LoraParams) -> Self {
        Self {
            id,
            device_type: DeviceType::Hub,
            relay_enabled: false,
            lora,
        }
    }

    /// Enable or disable relaying for this configuration
    pub fn with_relay(mut self, enabled: bool) -> Self {
        self.relay_enabled = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if is_broadcast(&self.id) {
            return Err(Error::InvalidParam);
        }
        if self.device_type == DeviceType::Unknown {
            return Err(Error::InvalidParam);
        }
        self.lora.validate()
    }
}
