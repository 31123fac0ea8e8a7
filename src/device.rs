//! High-level mesh device interface
//!
//! [`MeshDevice`] glues the protocol core to the radio interrupt loop. The
//! host calls [`MeshDevice::tick`] once per iteration of its cooperative
//! loop; the device polls the radio flags, runs the receive pipeline
//! (duplicate check, CRC, routing update, MIC, decrypt, dispatch, relay) and
//! reports progress as returned events.
//!
//! Receive-side protocol errors are local: the offending frame is dropped
//! and no event fires. Send-side errors surface to the caller.

use rand_core::CryptoRngCore;

use crate::config::device::{
    is_broadcast, DeviceConfig, DeviceId, DeviceType, InclusionState,
};
use crate::crc32;
use crate::crypto::{ecies, mic, EncryptionService};
use crate::inclusion::{InclusionController, InclusionEvent, InclusionMessage};
use crate::keys;
use crate::packet::{
    Packet, PayloadBuf, Topic, MAX_FRAME_LEN, MAX_HOPS, MAX_PAYLOAD_LEN, MIC_LEN,
};
use crate::radio::traits::Radio;
use crate::routing::PacketRouter;
use crate::storage::{DeviceStore, Storage};
use crate::{Error, Result};

/// A decrypted application message delivered to the host
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    /// Originating device
    pub src: DeviceId,
    /// Final destination of the packet
    pub dst: DeviceId,
    /// Message topic
    pub topic: u8,
    /// Hops the packet traversed to reach this device
    pub hop_count: u8,
    /// The relay it arrived from
    pub last_hop: DeviceId,
    /// RSSI of the received frame in dBm
    pub rssi: i16,
    /// Decrypted payload, MIC removed
    pub payload: PayloadBuf,
}

/// Events reported by [`MeshDevice::tick`]
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A packet was received, verified and decrypted
    Received(ReceivedMessage),
    /// A transmission completed and the radio is receiving again
    Transmitted,
    /// Inclusion protocol progress
    Inclusion(InclusionEvent),
}

/// A mesh device: radio, storage, routing and crypto glued to a poll loop
pub struct MeshDevice<R: Radio, S: Storage, G: CryptoRngCore> {
    id: DeviceId,
    device_type: DeviceType,
    relay_enabled: bool,
    radio: R,
    rng: G,
    store: DeviceStore<S>,
    router: PacketRouter,
    encryption: EncryptionService,
    inclusion: InclusionController,
    frame_counter: u32,
}

impl<R: Radio, S: Storage, G: CryptoRngCore> MeshDevice<R, S, G> {
    /// Create a device, restore its persisted state and start receiving
    ///
    /// A standard device reloads its inclusion state and any stored keys. A
    /// hub bootstraps itself on first start: it generates and persists its
    /// keypair and the network key if none exist yet.
    pub fn new(mut radio: R, storage: S, mut rng: G, config: DeviceConfig) -> Result<Self> {
        config.validate()?;
        radio.set_params(&config.lora)?;

        let mut store = DeviceStore::new(storage);
        let mut encryption = EncryptionService::new();

        let persisted_state = store.load_inclusion_state()?;
        let frame_counter = store.load_frame_counter()?;

        if let Some(private) = store.load_private_key()? {
            let public = ecies::derive_public_key(&private)?;
            encryption.set_device_keys(private, public);
        }
        if let Some(hub_key) = store.load_hub_key()? {
            encryption.set_hub_public(hub_key);
        }
        if let Some(network_key) = store.load_network_key()? {
            encryption.set_network_key(network_key);
        }

        if config.device_type == DeviceType::Hub {
            if encryption.device_public().is_none() {
                let (public, private) = keys::generate_keypair(&mut rng);
                store.persist_private_key(&private)?;
                encryption.set_device_keys(private, public);
            }
            if encryption.network_key().is_none() {
                let network_key = keys::generate_network_key(&mut rng);
                store.persist_network_key(&network_key)?;
                encryption.set_network_key(network_key);
            }
        }

        let inclusion = InclusionController::new(config.device_type, persisted_state);

        radio.start_receive()?;

        Ok(Self {
            id: config.id,
            device_type: config.device_type,
            relay_enabled: config.relay_enabled,
            radio,
            rng,
            store,
            router: PacketRouter::new(),
            encryption,
            inclusion,
            frame_counter,
        })
    }

    /// This device's identifier
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// This device's role
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Current inclusion state
    pub fn inclusion_state(&self) -> InclusionState {
        self.inclusion.state()
    }

    /// Whether this device forwards packets for other nodes
    pub fn is_relay_enabled(&self) -> bool {
        self.relay_enabled
    }

    /// Enable or disable relaying
    pub fn enable_relay(&mut self, enabled: bool) {
        self.relay_enabled = enabled;
    }

    /// Whether the hub currently accepts inclusion requests
    pub fn is_inclusion_mode(&self) -> bool {
        self.inclusion.is_inclusion_mode()
    }

    /// Enter or leave inclusion mode (hub only)
    pub fn enable_inclusion_mode(&mut self, enable: bool) -> Result<()> {
        if enable {
            self.inclusion.enter_inclusion_mode()
        } else {
            self.inclusion.exit_inclusion_mode()
        }
    }

    /// Broadcast an INCLUDE_OPEN invitation (hub only, inclusion mode)
    pub fn send_inclusion_open(&mut self, now_ms: u32) -> Result<()> {
        let action = self.inclusion.prepare_open(now_ms)?;
        self.transmit_packet(action.topic, action.dest, &action.payload, now_ms)
    }

    /// Send an application message
    ///
    /// A standard device must be included before sending non-inclusion
    /// topics, and refuses inclusion topics afterwards; a hub refuses
    /// inclusion topics outside inclusion mode.
    pub fn send_data(&mut self, topic: u8, dest: DeviceId, data: &[u8], now_ms: u32) -> Result<()> {
        self.inclusion.can_send(topic)?;
        self.transmit_packet(topic, dest, data, now_ms)
    }

    /// Poll the radio and advance the protocol by one step
    ///
    /// Call once per iteration of the host's cooperative loop with the
    /// current time in milliseconds.
    pub fn tick(&mut self, now_ms: u32) -> Result<Option<DeviceEvent>> {
        if let Some(event) = self.inclusion.poll_timeout(now_ms) {
            return Ok(Some(DeviceEvent::Inclusion(event)));
        }

        if self.radio.check_and_clear_rx_flag() {
            if self.radio.radio_state_error().is_err() {
                // IRQ-level failure: reset the modem state and re-arm.
                self.radio.start_receive()?;
                return Ok(None);
            }
            if let Some(event) = self.handle_received(now_ms)? {
                return Ok(Some(event));
            }
        }

        if self.radio.check_and_clear_tx_flag() {
            self.radio.start_receive()?;
            return Ok(Some(DeviceEvent::Transmitted));
        }

        Ok(None)
    }

    /// The radio, for host-side control (sleep, standby, signal readout)
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// The storage backend
    pub fn storage_mut(&mut self) -> &mut S {
        self.store.storage_mut()
    }

    /// Assemble a fresh packet and hand it to the outbound pipeline
    fn transmit_packet(
        &mut self,
        topic: u8,
        dest: DeviceId,
        data: &[u8],
        now_ms: u32,
    ) -> Result<()> {
        if data.len() > MAX_PAYLOAD_LEN {
            return Err(Error::PacketTooLong);
        }

        self.frame_counter = self.frame_counter.wrapping_add(1);
        self.store.persist_frame_counter(self.frame_counter)?;

        let mut packet_id = [0u8; 4];
        self.rng.fill_bytes(&mut packet_id);

        let mut packet = Packet::new();
        packet.src_id = self.id;
        packet.dst_id = dest;
        packet.packet_id = packet_id;
        packet.topic = topic;
        packet.device_type = self.device_type as u8;
        packet.hop_count = 0;
        packet.frame_counter = self.frame_counter;
        packet.last_hop_id = self.id;
        packet.next_hop_id = [0; 4];
        packet
            .payload
            .extend_from_slice(data)
            .map_err(|_| Error::PacketTooLong)?;

        self.router.route_packet(
            &mut self.radio,
            &self.encryption,
            &mut self.rng,
            packet,
            &self.id,
            self.device_type,
            self.inclusion.state(),
            now_ms,
        )
    }

    /// The receive pipeline: read, parse, dedup, CRC, route update, MIC,
    /// decrypt, dispatch, relay
    ///
    /// Protocol-level failures drop the frame and return no event.
    fn handle_received(&mut self, now_ms: u32) -> Result<Option<DeviceEvent>> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = match self.radio.read_received(&mut buf) {
            Ok(len) => len,
            Err(_) => {
                self.radio.start_receive()?;
                return Ok(None);
            }
        };

        let packet = match Packet::parse(&buf[..len]) {
            Ok(packet) => packet,
            Err(_) => return Ok(None),
        };
        let rssi = self.radio.rssi();

        let for_us = packet.dst_id == self.id || is_broadcast(&packet.dst_id);

        // A frame at the hop limit cannot be forwarded; if it is not for us
        // either, there is nothing to do with it.
        if packet.hop_count >= MAX_HOPS && !for_us {
            return Ok(None);
        }

        let packet_key = packet.packet_id_u32();
        if self.router.is_duplicate(packet_key, packet.payload_crc) {
            return Ok(None);
        }

        if crc32::payload_crc(packet.frame_counter, &packet.payload) != packet.payload_crc {
            return Ok(None);
        }
        self.router.track(packet_key, packet.payload_crc);

        self.router.update_route(
            &packet.src_id,
            &packet.last_hop_id,
            packet.hop_count,
            rssi,
            now_ms,
        );

        let role = self.device_type;
        let state = self.inclusion.state();

        // Verify the MIC over the received header and ciphertext. The
        // INCLUDE_RESPONSE key is derived from the hub key inside the
        // encrypted payload, so a pending device defers that one check to
        // the inclusion controller.
        let mut ciphertext = PayloadBuf::new();
        let mut received_mic = None;
        let mut mic_deferred = false;
        if mic::requires_mic(packet.topic) {
            let tag = match packet.mic() {
                Some(tag) => tag,
                // Too short to carry the MIC this topic requires.
                None => return Ok(None),
            };
            // Cannot overflow, the source is payload-sized.
            let _ = ciphertext.extend_from_slice(packet.payload_without_mic());
            received_mic = Some(tag);

            mic_deferred = packet.topic == Topic::IncludeResponse as u8
                && role == DeviceType::Standard
                && self.encryption.hub_public().is_none();
            if !mic_deferred {
                let verified = mic::verify(
                    &self.encryption,
                    &packet.mic_header_bytes(),
                    &ciphertext,
                    &tag,
                    packet.topic,
                    role,
                    state,
                );
                if verified.is_err() {
                    return Ok(None);
                }
            }
        } else {
            let _ = ciphertext.extend_from_slice(&packet.payload);
        }

        let plaintext = match self
            .encryption
            .decrypt(&ciphertext, packet.topic, role, state)
        {
            Ok(plaintext) => plaintext,
            Err(_) => return Ok(None),
        };

        let event = if packet.is_inclusion() {
            self.dispatch_inclusion(
                &packet,
                &plaintext,
                &ciphertext,
                received_mic,
                mic_deferred,
                now_ms,
            )?
        } else {
            Some(DeviceEvent::Received(ReceivedMessage {
                src: packet.src_id,
                dst: packet.dst_id,
                topic: packet.topic,
                hop_count: packet.hop_count,
                last_hop: packet.last_hop_id,
                rssi,
                payload: plaintext.clone(),
            }))
        };

        // Forward traffic addressed to someone else.
        if role == DeviceType::Standard
            && self.relay_enabled
            && packet.dst_id != self.id
            && !is_broadcast(&packet.dst_id)
        {
            let mut relay = packet.clone();
            relay.payload = plaintext;
            // Hop-limit refusal and radio errors on the relay path are not
            // surfaced; the packet is simply not forwarded.
            let _ = self.router.route_packet(
                &mut self.radio,
                &self.encryption,
                &mut self.rng,
                relay,
                &self.id,
                role,
                self.inclusion.state(),
                now_ms,
            );
        }

        Ok(event)
    }

    /// Hand an inclusion message to the controller and act on the outcome
    fn dispatch_inclusion(
        &mut self,
        packet: &Packet,
        plaintext: &[u8],
        ciphertext: &[u8],
        received_mic: Option<[u8; MIC_LEN]>,
        mic_deferred: bool,
        now_ms: u32,
    ) -> Result<Option<DeviceEvent>> {
        let mic_header = packet.mic_header_bytes();
        let msg = InclusionMessage {
            topic: packet.topic,
            src: packet.src_id,
            payload: plaintext,
            mic_header: mic_deferred.then_some(&mic_header[..]),
            ciphertext: mic_deferred.then_some(ciphertext),
            mic: if mic_deferred { received_mic } else { None },
        };

        let outcome = self.inclusion.handle_message(
            &msg,
            self.frame_counter.wrapping_add(1),
            &mut self.encryption,
            &mut self.store,
            &mut self.rng,
            now_ms,
        );

        match outcome {
            Ok((action, event)) => {
                if let Some(action) = action {
                    // A failed reply is not fatal; the session times out.
                    let _ =
                        self.transmit_packet(action.topic, action.dest, &action.payload, now_ms);
                }
                Ok(event.map(DeviceEvent::Inclusion))
            }
            Err(_) => {
                self.inclusion.reset_session();
                Ok(Some(DeviceEvent::Inclusion(InclusionEvent::Failed)))
            }
        }
    }
}
