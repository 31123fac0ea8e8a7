//! Packet framing
//!
//! This module contains the wire format of the mesh protocol:
//! - The reserved topic namespace
//! - The fixed 35-byte packet header and its field offsets
//! - Serialization and parsing of complete frames
//! - MIC placement helpers (the MIC, when present, occupies the last four
//!   bytes of the payload region)
//!
//! All multi-byte integers are big-endian on the wire.

use heapless::Vec;

use crate::config::device::{DeviceId, DeviceType};
use crate::{Error, Result};

/// Protocol version carried in the first header byte
pub const PROTOCOL_VERSION: u8 = 3;

/// Maximum frame size on the wire
pub const MAX_FRAME_LEN: usize = 256;

/// Maximum number of relays a packet may traverse
pub const MAX_HOPS: u8 = 7;

/// Length of a device identifier field
pub const ID_LEN: usize = 4;

/// Length of a message integrity code
pub const MIC_LEN: usize = 4;

// Header field offsets
const VERSION_POS: usize = 0;
const SRC_ID_POS: usize = VERSION_POS + 1;
const DST_ID_POS: usize = SRC_ID_POS + ID_LEN;
const PKT_ID_POS: usize = DST_ID_POS + ID_LEN;
const TOPIC_POS: usize = PKT_ID_POS + ID_LEN;
const DEVICE_TYPE_POS: usize = TOPIC_POS + 1;
const HOP_COUNT_POS: usize = DEVICE_TYPE_POS + 1;
const PAYLOAD_CRC_POS: usize = HOP_COUNT_POS + 1;
const FCOUNTER_POS: usize = PAYLOAD_CRC_POS + 4;
const LAST_HOP_POS: usize = FCOUNTER_POS + 4;
const NEXT_HOP_POS: usize = LAST_HOP_POS + ID_LEN;
const RESERVED_POS: usize = NEXT_HOP_POS + ID_LEN;

/// Length of the packet header
pub const HEADER_LEN: usize = RESERVED_POS + 3;

/// Maximum payload length (including the MIC when present)
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - HEADER_LEN;

/// Payload buffer sized for the largest legal payload
pub type PayloadBuf = Vec<u8, MAX_PAYLOAD_LEN>;

/// Frame buffer sized for the largest legal frame
pub type FrameBuf = Vec<u8, MAX_FRAME_LEN>;

/// Message topics reserved by the protocol (0x00-0x0F)
///
/// Application topics start at 0x10.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Topic {
    /// Unused
    Unused = 0x00,
    /// Ping request
    Ping = 0x01,
    /// Ping reply
    Pong = 0x02,
    /// Acknowledgement
    Ack = 0x03,
    /// Command
    Cmd = 0x04,
    /// Leaving the network
    Bye = 0x05,
    /// Device requests inclusion, carrying its public key
    IncludeRequest = 0x06,
    /// Hub answers a request with the network key under ECIES
    IncludeResponse = 0x07,
    /// Hub opens the network for inclusion
    IncludeOpen = 0x08,
    /// Device confirms receipt of the network key
    IncludeConfirm = 0x09,
    /// Hub acknowledges a completed inclusion
    IncludeSuccess = 0x0A,
    /// Highest reserved topic value
    MaxReserved = 0x0F,
}

/// Check whether a topic belongs to the inclusion handshake
pub fn is_inclusion_topic(topic: u8) -> bool {
    topic == Topic::IncludeRequest as u8
        || topic == Topic::IncludeResponse as u8
        || topic == Topic::IncludeOpen as u8
        || topic == Topic::IncludeConfirm as u8
        || topic == Topic::IncludeSuccess as u8
}

/// Check whether a topic is in the reserved range
pub fn is_reserved_topic(topic: u8) -> bool {
    topic <= Topic::MaxReserved as u8
}

/// A mesh packet
///
/// Header layout (35 bytes, network byte order):
///
/// | Offset | Len | Field |
/// |---|---|---|
/// | 0  | 1 | protocol version |
/// | 1  | 4 | source device id |
/// | 5  | 4 | destination device id |
/// | 9  | 4 | packet id |
/// | 13 | 1 | topic |
/// | 14 | 1 | device type of originator |
/// | 15 | 1 | hop count |
/// | 16 | 4 | payload CRC |
/// | 20 | 4 | frame counter |
/// | 24 | 4 | last hop id |
/// | 28 | 4 | next hop id |
/// | 32 | 3 | reserved |
///
/// The payload follows, up to 221 bytes, optionally ending in a 4-byte MIC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Protocol version
    pub protocol_version: u8,
    /// Originating device
    pub src_id: DeviceId,
    /// Final destination, or broadcast
    pub dst_id: DeviceId,
    /// Random per-originator packet identifier, the dedup key
    pub packet_id: [u8; ID_LEN],
    /// Message topic
    pub topic: u8,
    /// Device type of the originator (raw wire value)
    pub device_type: u8,
    /// Number of relays traversed so far
    pub hop_count: u8,
    /// CRC-32 over frame counter and payload as on the wire
    pub payload_crc: u32,
    /// Per-originator monotonic frame counter
    pub frame_counter: u32,
    /// Immediate sender (previous relay)
    pub last_hop_id: DeviceId,
    /// Unicast next-hop hint; all zeros means any relay
    pub next_hop_id: DeviceId,
    /// Reserved, zero on transmit, ignored on receive
    pub reserved: [u8; 3],
    /// Payload bytes as on the wire (encrypted, MIC included when present)
    pub payload: PayloadBuf,
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl Packet {
    /// Create an empty packet with the current protocol version
    pub fn new() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            src_id: [0; ID_LEN],
            dst_id: [0; ID_LEN],
            packet_id: [0; ID_LEN],
            topic: Topic::Unused as u8,
            device_type: DeviceType::Unknown as u8,
            hop_count: 0,
            payload_crc: 0,
            frame_counter: 0,
            last_hop_id: [0; ID_LEN],
            next_hop_id: [0; ID_LEN],
            reserved: [0; 3],
            payload: Vec::new(),
        }
    }

    /// Parse a packet from a received frame
    ///
    /// Fails with [`Error::Malformed`] when the frame cannot hold a header
    /// and with [`Error::UnsupportedVersion`] when the version byte differs
    /// from [`PROTOCOL_VERSION`].
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN || buf.len() > MAX_FRAME_LEN {
            return Err(Error::Malformed);
        }
        if buf[VERSION_POS] != PROTOCOL_VERSION {
            return Err(Error::UnsupportedVersion);
        }

        let mut packet = Self::new();
        packet.protocol_version = buf[VERSION_POS];
        packet.src_id.copy_from_slice(&buf[SRC_ID_POS..SRC_ID_POS + ID_LEN]);
        packet.dst_id.copy_from_slice(&buf[DST_ID_POS..DST_ID_POS + ID_LEN]);
        packet.packet_id.copy_from_slice(&buf[PKT_ID_POS..PKT_ID_POS + ID_LEN]);
        packet.topic = buf[TOPIC_POS];
        packet.device_type = buf[DEVICE_TYPE_POS];
        packet.hop_count = buf[HOP_COUNT_POS];
        packet.payload_crc = u32::from_be_bytes(
            buf[PAYLOAD_CRC_POS..PAYLOAD_CRC_POS + 4].try_into().map_err(|_| Error::Malformed)?,
        );
        packet.frame_counter = u32::from_be_bytes(
            buf[FCOUNTER_POS..FCOUNTER_POS + 4].try_into().map_err(|_| Error::Malformed)?,
        );
        packet.last_hop_id.copy_from_slice(&buf[LAST_HOP_POS..LAST_HOP_POS + ID_LEN]);
        packet.next_hop_id.copy_from_slice(&buf[NEXT_HOP_POS..NEXT_HOP_POS + ID_LEN]);
        packet.reserved.copy_from_slice(&buf[RESERVED_POS..RESERVED_POS + 3]);
        packet
            .payload
            .extend_from_slice(&buf[HEADER_LEN..])
            .map_err(|_| Error::Malformed)?;
        Ok(packet)
    }

    /// Serialize the packet into a wire frame
    pub fn serialize(&self) -> FrameBuf {
        let mut buf = FrameBuf::new();
        // Header and payload always fit MAX_FRAME_LEN by construction.
        let _ = buf.extend_from_slice(&self.header_bytes());
        let _ = buf.extend_from_slice(&self.payload);
        buf
    }

    /// The 35 header bytes as they appear on the wire
    pub fn header_bytes(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[VERSION_POS] = self.protocol_version;
        header[SRC_ID_POS..SRC_ID_POS + ID_LEN].copy_from_slice(&self.src_id);
        header[DST_ID_POS..DST_ID_POS + ID_LEN].copy_from_slice(&self.dst_id);
        header[PKT_ID_POS..PKT_ID_POS + ID_LEN].copy_from_slice(&self.packet_id);
        header[TOPIC_POS] = self.topic;
        header[DEVICE_TYPE_POS] = self.device_type;
        header[HOP_COUNT_POS] = self.hop_count;
        header[PAYLOAD_CRC_POS..PAYLOAD_CRC_POS + 4].copy_from_slice(&self.payload_crc.to_be_bytes());
        header[FCOUNTER_POS..FCOUNTER_POS + 4].copy_from_slice(&self.frame_counter.to_be_bytes());
        header[LAST_HOP_POS..LAST_HOP_POS + ID_LEN].copy_from_slice(&self.last_hop_id);
        header[NEXT_HOP_POS..NEXT_HOP_POS + ID_LEN].copy_from_slice(&self.next_hop_id);
        header[RESERVED_POS..RESERVED_POS + 3].copy_from_slice(&self.reserved);
        header
    }

    /// Header bytes entering the MIC computation
    ///
    /// The payload CRC is computed after (and over) the MIC, so the MIC scope
    /// carries the CRC field zeroed. Both sender and receiver use this form.
    pub fn mic_header_bytes(&self) -> [u8; HEADER_LEN] {
        let mut header = self.header_bytes();
        header[PAYLOAD_CRC_POS..PAYLOAD_CRC_POS + 4].fill(0);
        header
    }

    /// Whether the payload region ends in a MIC
    pub fn has_mic(&self) -> bool {
        crate::crypto::mic::requires_mic(self.topic) && self.payload.len() >= MIC_LEN
    }

    /// The payload as seen by the application, excluding any trailing MIC
    pub fn payload_without_mic(&self) -> &[u8] {
        if self.has_mic() {
            &self.payload[..self.payload.len() - MIC_LEN]
        } else {
            &self.payload
        }
    }

    /// The trailing MIC, when present
    pub fn mic(&self) -> Option<[u8; MIC_LEN]> {
        if self.has_mic() {
            let start = self.payload.len() - MIC_LEN;
            let mut mic = [0u8; MIC_LEN];
            mic.copy_from_slice(&self.payload[start..]);
            Some(mic)
        } else {
            None
        }
    }

    /// Append a MIC to the payload region
    pub fn append_mic(&mut self, mic: &[u8; MIC_LEN]) -> Result<()> {
        self.payload
            .extend_from_slice(mic)
            .map_err(|_| Error::PacketTooLong)
    }

    /// Remove a trailing MIC, if present
    pub fn strip_mic(&mut self) {
        if self.has_mic() {
            self.payload.truncate(self.payload.len() - MIC_LEN);
        }
    }

    /// Packet id as the u32 dedup key
    pub fn packet_id_u32(&self) -> u32 {
        u32::from_be_bytes(self.packet_id)
    }

    /// Whether this packet belongs to the inclusion handshake
    pub fn is_inclusion(&self) -> bool {
        is_inclusion_topic(self.topic)
    }
}
