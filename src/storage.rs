//! Non-volatile storage
//!
//! The protocol core consumes an opaque key-value byte store through the
//! [`Storage`] capability trait and reads/writes its persisted state through
//! [`DeviceStore`], which owns the logical key layout:
//!
//! | Key | Value |
//! |---|---|
//! | `is` | 1 byte inclusion state |
//! | `mc` | 4 bytes frame counter (big-endian) |
//! | `pk` | 32-byte device private key |
//! | `hk` | 64-byte hub public key |
//! | `nk` | 32-byte network key |
//!
//! `write_and_commit` must be atomic across power loss for the inclusion
//! state and frame counter.

use heapless::Vec;

use crate::config::device::InclusionState;
use crate::crypto::ecies::{PRIVATE_KEY_LEN, PUBLIC_KEY_LEN};
use crate::crypto::encryption::NETWORK_KEY_LEN;
use crate::{Error, Result};

/// Storage error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Backend has not been initialized
    NotInit,
    /// No value stored under the requested key
    KeyNotFound,
    /// Read operation failed
    ReadFailed,
    /// Write or commit operation failed
    WriteFailed,
    /// No space left in the backend
    Full,
    /// Stored value has an unexpected size
    InvalidSize,
}

/// Largest value the protocol persists (the hub public key)
pub const MAX_VALUE_LEN: usize = PUBLIC_KEY_LEN;

/// Buffer holding a stored value
pub type ValueBuf = Vec<u8, MAX_VALUE_LEN>;

/// Keyed byte-vector storage consumed by the protocol core
pub trait Storage {
    /// Read the value stored under `key`
    fn read(&mut self, key: &str) -> core::result::Result<ValueBuf, StorageError>;

    /// Write a value and commit it durably
    fn write_and_commit(&mut self, key: &str, value: &[u8])
        -> core::result::Result<(), StorageError>;

    /// Remove the value stored under `key`
    fn remove(&mut self, key: &str) -> core::result::Result<(), StorageError>;

    /// Whether a value exists under `key`
    fn exists(&mut self, key: &str) -> bool;
}

// Logical storage keys
const STATE_KEY: &str = "is";
const COUNTER_KEY: &str = "mc";
const PRIVATE_KEY: &str = "pk";
const HUB_KEY: &str = "hk";
const NETWORK_KEY: &str = "nk";

/// Typed access to the persisted device state
///
/// Validates value sizes on every read and write.
#[derive(Debug)]
pub struct DeviceStore<S: Storage> {
    storage: S,
}

impl<S: Storage> DeviceStore<S> {
    /// Wrap a storage backend
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Load the persisted inclusion state; a fresh device reads NOT_INCLUDED
    pub fn load_inclusion_state(&mut self) -> Result<InclusionState> {
        match self.storage.read(STATE_KEY) {
            Ok(data) if !data.is_empty() => Ok(InclusionState::from_u8(data[0])),
            Ok(_) => Ok(InclusionState::NotIncluded),
            Err(StorageError::KeyNotFound) => Ok(InclusionState::NotIncluded),
            Err(e) => Err(Error::Storage(e)),
        }
    }

    /// Persist the inclusion state
    pub fn persist_inclusion_state(&mut self, state: InclusionState) -> Result<()> {
        self.storage
            .write_and_commit(STATE_KEY, &[state as u8])
            .map_err(Error::Storage)
    }

    /// Load the persisted frame counter; a fresh device reads zero
    pub fn load_frame_counter(&mut self) -> Result<u32> {
        match self.storage.read(COUNTER_KEY) {
            Ok(data) => {
                let bytes: [u8; 4] = data
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage(StorageError::InvalidSize))?;
                Ok(u32::from_be_bytes(bytes))
            }
            Err(StorageError::KeyNotFound) => Ok(0),
            Err(e) => Err(Error::Storage(e)),
        }
    }

    /// Persist the frame counter
    pub fn persist_frame_counter(&mut self, counter: u32) -> Result<()> {
        self.storage
            .write_and_commit(COUNTER_KEY, &counter.to_be_bytes())
            .map_err(Error::Storage)
    }

    /// Load the device private key, if one has been generated
    pub fn load_private_key(&mut self) -> Result<Option<[u8; PRIVATE_KEY_LEN]>> {
        self.load_key(PRIVATE_KEY)
    }

    /// Persist the device private key
    pub fn persist_private_key(&mut self, key: &[u8; PRIVATE_KEY_LEN]) -> Result<()> {
        self.storage
            .write_and_commit(PRIVATE_KEY, key)
            .map_err(Error::Storage)
    }

    /// Load the hub public key, if known
    pub fn load_hub_key(&mut self) -> Result<Option<[u8; PUBLIC_KEY_LEN]>> {
        self.load_key(HUB_KEY)
    }

    /// Persist the hub public key
    pub fn persist_hub_key(&mut self, key: &[u8; PUBLIC_KEY_LEN]) -> Result<()> {
        self.storage
            .write_and_commit(HUB_KEY, key)
            .map_err(Error::Storage)
    }

    /// Load the network key, if known
    pub fn load_network_key(&mut self) -> Result<Option<[u8; NETWORK_KEY_LEN]>> {
        self.load_key(NETWORK_KEY)
    }

    /// Persist the network key
    pub fn persist_network_key(&mut self, key: &[u8; NETWORK_KEY_LEN]) -> Result<()> {
        self.storage
            .write_and_commit(NETWORK_KEY, key)
            .map_err(Error::Storage)
    }

    /// The wrapped backend
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    fn load_key<const N: usize>(&mut self, key: &str) -> Result<Option<[u8; N]>> {
        match self.storage.read(key) {
            Ok(data) => {
                let bytes: [u8; N] = data
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage(StorageError::InvalidSize))?;
                Ok(Some(bytes))
            }
            Err(StorageError::KeyNotFound) => Ok(None),
            Err(e) => Err(Error::Storage(e)),
        }
    }
}
