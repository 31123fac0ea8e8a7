//! Cryptographic services
//!
//! This module provides the security layer of the mesh protocol:
//! - AES-256 counter-mode payload encryption
//! - AES-CMAC message integrity codes truncated to 4 bytes
//! - ECIES (P-256 ECDH, SHA-256 KDF, AES-CTR) for the inclusion key exchange
//! - The encryption method matrix selecting between them per message
//!
//! Freshness in the regular traffic stream comes from the frame counter
//! feeding the CRC and MIC inputs, not from the (fixed, zero) CTR IV; the
//! ECIES key is fresh per message because every encryption generates a new
//! ephemeral keypair.

/// AES-256-CTR primitives
pub mod aes;

/// AES-CMAC message integrity codes
pub mod cmac;

/// ECIES over P-256
pub mod ecies;

/// Encryption method selection and key material
pub mod encryption;

/// MIC key selection, computation and verification
pub mod mic;

pub use encryption::{EncryptionMethod, EncryptionService};
