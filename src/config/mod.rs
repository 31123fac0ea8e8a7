//! Device configuration
//!
//! This module contains the types that identify and configure a mesh device:
//! - Device identifiers and the broadcast address
//! - Device roles and inclusion states
//! - Device configuration for standard and hub nodes

/// Device identity and configuration types
pub mod device;

pub use device::{DeviceConfig, DeviceId, DeviceType, InclusionState, BROADCAST_ID};
