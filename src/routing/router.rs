//! Outbound packet pipeline
//!
//! Every transmitted packet, fresh or relayed, passes through
//! [`PacketRouter::route_packet`]:
//!
//! 1. Refuse packets at the hop limit
//! 2. Stamp our id as last hop and increment the hop count
//! 3. Resolve the next-hop hint for unicast destinations
//! 4. Clear the reserved bytes
//! 5. Encrypt the payload (INCLUDE_OPEN stays cleartext)
//! 6. Compute and append the MIC where required
//! 7. Compute the payload CRC over whatever will be on the wire
//! 8. Serialize and hand the frame to the radio
//! 9. Record the packet in the duplicate tracker
//!
//! Callers hand in cleartext payloads: the receive pipeline strips the MIC
//! and decrypts before a frame is considered for relaying, so the router
//! re-protects from scratch on every hop.

use rand_core::CryptoRngCore;

use crate::config::device::{is_broadcast, DeviceId, DeviceType, InclusionState};
use crate::crc32;
use crate::crypto::{mic, EncryptionService};
use crate::packet::{Packet, Topic, MAX_HOPS};
use crate::radio::traits::Radio;
use crate::routing::table::RoutingTable;
use crate::routing::tracker::PacketTracker;
use crate::{Error, Result};

/// Outbound pipeline plus the routing state it feeds
#[derive(Debug, Default)]
pub struct PacketRouter {
    tracker: PacketTracker,
    table: RoutingTable,
}

impl PacketRouter {
    /// Create a router with an empty tracker and table
    pub fn new() -> Self {
        Self {
            tracker: PacketTracker::new(),
            table: RoutingTable::new(),
        }
    }

    /// Route a packet out through the radio
    ///
    /// The caller passes the packet with its cleartext payload; encryption,
    /// MIC and CRC are applied here so the same path serves fresh sends and
    /// relayed forwards.
    #[allow(clippy::too_many_arguments)]
    pub fn route_packet<R: Radio>(
        &mut self,
        radio: &mut R,
        enc: &EncryptionService,
        rng: &mut impl CryptoRngCore,
        mut packet: Packet,
        our_id: &DeviceId,
        device_type: DeviceType,
        state: InclusionState,
        now_ms: u32,
    ) -> Result<()> {
        if packet.hop_count >= MAX_HOPS {
            return Err(Error::MaxHops);
        }

        packet.last_hop_id = *our_id;
        packet.hop_count += 1;

        if !is_broadcast(&packet.dst_id) {
            packet.next_hop_id = self
                .table
                .find_next_hop(&packet.dst_id, now_ms)
                .unwrap_or([0; 4]);
        }

        packet.reserved = [0; 3];

        if packet.topic != Topic::IncludeOpen as u8 && !packet.payload.is_empty() {
            packet.payload = enc.encrypt(rng, &packet.payload, packet.topic, device_type, state)?;
        }

        if mic::requires_mic(packet.topic) {
            let tag = mic::compute(
                enc,
                &packet.mic_header_bytes(),
                &packet.payload,
                packet.topic,
                device_type,
                state,
            )?;
            packet.append_mic(&tag)?;
        }

        packet.payload_crc = crc32::payload_crc(packet.frame_counter, &packet.payload);

        let frame = packet.serialize();
        radio.start_transmit(&frame)?;

        self.tracker.add(packet.packet_id_u32(), packet.payload_crc);

        Ok(())
    }

    /// Whether a received packet is a known duplicate
    pub fn is_duplicate(&mut self, packet_id: u32, payload_crc: u32) -> bool {
        self.tracker.contains(packet_id, payload_crc)
    }

    /// Record a received packet in the duplicate tracker
    pub fn track(&mut self, packet_id: u32, payload_crc: u32) {
        self.tracker.add(packet_id, payload_crc);
    }

    /// Learn routing information from a received packet
    pub fn update_route(
        &mut self,
        src_id: &DeviceId,
        last_hop_id: &DeviceId,
        hop_count: u8,
        rssi: i16,
        now_ms: u32,
    ) {
        self.table
            .update_route(src_id, last_hop_id, hop_count, rssi, now_ms);
    }

    /// The duplicate tracker
    pub fn tracker(&self) -> &PacketTracker {
        &self.tracker
    }

    /// The routing table
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }
}
