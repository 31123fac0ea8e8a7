//! Routing engine
//!
//! This module contains the forwarding machinery of the mesh:
//! - Duplicate detection via a bounded LRU of packet identifiers
//! - A fixed-size routing table with RSSI hysteresis
//! - The outbound packet pipeline (hop limit, next hop, encrypt, MIC, CRC,
//!   transmit, track)

/// Bounded LRU duplicate tracker
pub mod tracker;

/// Next-hop routing table
pub mod table;

/// Outbound packet pipeline
pub mod router;

pub use router::PacketRouter;
pub use table::RoutingTable;
pub use tracker::PacketTracker;
