//! Radio interface
//!
//! The protocol core does not drive a modem itself; it consumes a byte-level
//! LoRa radio through the [`traits::Radio`] capability trait. Implementations
//! own the interrupt boundary: the RX/TX done flags and the IRQ error code
//! are the only state shared with the ISR.

/// Radio capability trait and parameters
pub mod traits;

pub use traits::{LoraParams, Radio, RadioError};
