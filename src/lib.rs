//! # radiomesh
//!
//! A `no_std` LoRa mesh-networking protocol stack for constrained devices.
//! This crate provides the RadioMesh protocol core: packet framing, duplicate
//! suppression, RSSI-based next-hop routing with relay forwarding, and a
//! context-aware encryption layer culminating in a five-message device
//! inclusion handshake.
//!
//! ## Features
//!
//! - Fixed 35-byte packet header, 256-byte maximum frame
//! - Hop-limited flooding with unicast next-hop hints
//! - Per-node duplicate detection (LRU packet tracker)
//! - RSSI/hop-count routing table with hysteresis
//! - AES-256-CTR payload encryption with a shared network key
//! - ECIES (P-256 + SHA-256 + AES-CTR) for the inclusion key exchange
//! - AES-CMAC message integrity codes truncated to 4 bytes
//! - Five-message inclusion protocol admitting new devices to the network
//! - `no_std` compatible for embedded systems
//!
//! ## Example
//!
//! ```rust,ignore
//! use radiomesh::{
//!     config::device::DeviceConfig,
//!     device::{DeviceEvent, MeshDevice},
//!     radio::traits::LoraParams,
//! };
//!
//! // Bring your own radio, storage and entropy source. The radio and
//! // storage are capability traits; any modem driver and key-value store
//! // can back them.
//! let radio = MyLoraRadio::new(/* SPI, DIO pins */);
//! let storage = MyEepromStorage::new();
//! let rng = MyHardwareRng::new();
//!
//! let config = DeviceConfig::new_standard([0x01, 0x01, 0x01, 0x01], LoraParams::default());
//! let mut device = MeshDevice::new(radio, storage, rng, config)?;
//!
//! // Cooperative loop: poll the device once per tick with the current time.
//! loop {
//!     if let Some(event) = device.tick(now_ms())? {
//!         match event {
//!             DeviceEvent::Received(msg) => handle_message(msg),
//!             DeviceEvent::Transmitted => {}
//!             DeviceEvent::Inclusion(ev) => handle_inclusion(ev),
//!         }
//!     }
//! }
//! ```
//!
//! ## Sending data
//!
//! ```rust,ignore
//! // Application topics start at 0x10. A standard device must complete the
//! // inclusion handshake before it may send application traffic.
//! device.send_data(0x10, [0x03, 0x03, 0x03, 0x03], b"hi", now_ms())?;
//! ```
//!
//! ## Safety
//!
//! This crate uses `#![no_std]` and is intended for use in embedded systems.
//! It has been designed with safety in mind but has not been audited.
//! Use at your own risk in production systems.

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod crc32;
pub mod crypto;
pub mod device;
pub mod inclusion;
pub mod keys;
pub mod packet;
pub mod radio;
pub mod routing;
pub mod storage;

use radio::traits::RadioError;
use storage::StorageError;

/// Error type for the RadioMesh stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Invalid parameter
    InvalidParam,
    /// A buffer or field has an invalid length
    InvalidLength,
    /// Payload exceeds the maximum frame size
    PacketTooLong,
    /// Protocol version byte does not match this implementation
    UnsupportedVersion,
    /// Packet has reached the maximum hop count
    MaxHops,
    /// Payload CRC mismatch
    Corrupted,
    /// Message integrity code verification failed
    MicFail,
    /// Frame too short to carry a packet header
    Malformed,
    /// Key material failed to construct (off-curve point, invalid scalar)
    CryptoSetup,
    /// Required key material is not available
    MissingKey,
    /// Key material has the wrong length
    InvalidKeyLength,
    /// Radio hardware error
    Radio(RadioError),
    /// Storage backend error
    Storage(StorageError),
    /// Operation not permitted in the current state
    InvalidState,
    /// Device has not been included in a network
    DeviceNotIncluded,
}

impl From<RadioError> for Error {
    fn from(error: RadioError) -> Self {
        Error::Radio(error)
    }
}

impl From<StorageError> for Error {
    fn from(error: StorageError) -> Self {
        Error::Storage(error)
    }
}

/// Result type for the RadioMesh stack
pub type Result<T> = core::result::Result<T, Error>;
