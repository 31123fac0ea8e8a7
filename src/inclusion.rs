//! Device inclusion protocol
//!
//! The five-message handshake that admits a device into a network:
//!
//! 1. INCLUDE_OPEN: the hub broadcasts an empty cleartext invitation while
//!    inclusion mode is enabled
//! 2. INCLUDE_REQUEST: the device answers in cleartext with its public key
//!    and initial frame counter
//! 3. INCLUDE_RESPONSE: the hub returns its own public key, the network key
//!    and a session nonce under ECIES to the device's key, authenticated
//!    with a MAC key derived from the static ECDH between the two devices
//! 4. INCLUDE_CONFIRM: the device echoes the nonce under the freshly
//!    received network key
//! 5. INCLUDE_SUCCESS: the hub acknowledges; the device persists its state,
//!    the hub key and the network key, and becomes INCLUDED
//!
//! Either side abandons a session 60 seconds after entering a non-idle
//! protocol state. MIC, decryption and nonce failures drop the offending
//! packet without advancing the state machine.

use rand_core::CryptoRngCore;

use crate::config::device::{DeviceId, DeviceType, InclusionState, BROADCAST_ID};
use crate::crypto::ecies::{self, PUBLIC_KEY_LEN};
use crate::crypto::encryption::NETWORK_KEY_LEN;
use crate::crypto::{cmac, EncryptionService};
use crate::keys;
use crate::packet::{PayloadBuf, Topic, MIC_LEN};
use crate::storage::{DeviceStore, Storage};
use crate::{Error, Result};

/// Inclusion session timeout
pub const SESSION_TIMEOUT_MS: u32 = 60_000;

/// Length of the session nonce
pub const NONCE_LEN: usize = 4;

/// INCLUDE_REQUEST payload: device public key and initial frame counter
const REQUEST_PAYLOAD_LEN: usize = PUBLIC_KEY_LEN + 4;

/// INCLUDE_RESPONSE plaintext: hub public key, network key and nonce
const RESPONSE_PLAINTEXT_LEN: usize = PUBLIC_KEY_LEN + NETWORK_KEY_LEN + NONCE_LEN;

/// Protocol sub-state of an inclusion session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolState {
    /// No session in progress
    Idle,
    /// Hub: INCLUDE_OPEN sent, waiting for a request
    WaitingRequest,
    /// Device: INCLUDE_REQUEST sent, waiting for the hub's response
    WaitingResponse,
    /// Hub: INCLUDE_RESPONSE sent, waiting for confirmation
    WaitingConfirmation,
    /// Device: INCLUDE_CONFIRM sent, waiting for the final acknowledgement
    WaitingSuccess,
}

/// Progress reported to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InclusionEvent {
    /// This device completed inclusion and may now send application traffic
    Included,
    /// The hub admitted the given device
    DeviceIncluded(DeviceId),
    /// The session timed out and the protocol state was reset
    Timeout,
    /// The session failed and the protocol state was reset
    Failed,
}

/// A message the controller wants transmitted
#[derive(Debug, Clone)]
pub struct InclusionAction {
    /// Message topic
    pub topic: u8,
    /// Destination device
    pub dest: DeviceId,
    /// Cleartext payload; the outbound pipeline applies encryption and MIC
    pub payload: PayloadBuf,
}

/// A received inclusion message after the common receive pipeline
#[derive(Debug)]
pub struct InclusionMessage<'a> {
    /// Message topic
    pub topic: u8,
    /// Originating device
    pub src: DeviceId,
    /// Decrypted payload, MIC removed
    pub payload: &'a [u8],
    /// MIC-scope header bytes, present when verification was deferred
    pub mic_header: Option<&'a [u8]>,
    /// Encrypted payload bytes, present when verification was deferred
    pub ciphertext: Option<&'a [u8]>,
    /// Received MIC, present when verification was deferred
    pub mic: Option<[u8; MIC_LEN]>,
}

/// Outcome of handling an inclusion message
pub type HandleOutcome = (Option<InclusionAction>, Option<InclusionEvent>);

/// Controls the device inclusion sequence
#[derive(Debug)]
pub struct InclusionController {
    device_type: DeviceType,
    state: InclusionState,
    protocol_state: ProtocolState,
    inclusion_mode: bool,
    state_entered_ms: u32,
    nonce: Option<[u8; NONCE_LEN]>,
    peer_id: Option<DeviceId>,
    peer_initial_counter: u32,
}

impl InclusionController {
    /// Create a controller for a device with the given persisted state
    ///
    /// Hubs are permanently included.
    pub fn new(device_type: DeviceType, persisted_state: InclusionState) -> Self {
        let state = if device_type == DeviceType::Hub {
            InclusionState::Included
        } else {
            persisted_state
        };
        Self {
            device_type,
            state,
            protocol_state: ProtocolState::Idle,
            inclusion_mode: false,
            state_entered_ms: 0,
            nonce: None,
            peer_id: None,
            peer_initial_counter: 0,
        }
    }

    /// Current inclusion state
    pub fn state(&self) -> InclusionState {
        self.state
    }

    /// Current protocol sub-state
    pub fn protocol_state(&self) -> ProtocolState {
        self.protocol_state
    }

    /// Whether the hub currently accepts inclusion requests
    pub fn is_inclusion_mode(&self) -> bool {
        self.inclusion_mode
    }

    /// Check whether this device may send a message with the given topic
    ///
    /// A standard device may only send inclusion topics until it is
    /// included, and must not send them afterwards; a hub may only send
    /// inclusion topics while inclusion mode is enabled.
    pub fn can_send(&self, topic: u8) -> Result<()> {
        let inclusion = crate::packet::is_inclusion_topic(topic);
        if self.device_type == DeviceType::Hub {
            if inclusion && !self.inclusion_mode {
                return Err(Error::InvalidState);
            }
            return Ok(());
        }
        if self.state == InclusionState::Included {
            if inclusion {
                return Err(Error::InvalidState);
            }
            Ok(())
        } else if inclusion {
            Ok(())
        } else {
            Err(Error::DeviceNotIncluded)
        }
    }

    /// Enter inclusion mode (hub only)
    pub fn enter_inclusion_mode(&mut self) -> Result<()> {
        if self.device_type != DeviceType::Hub {
            return Err(Error::InvalidState);
        }
        self.inclusion_mode = true;
        Ok(())
    }

    /// Exit inclusion mode (hub only); cancels any session in progress
    pub fn exit_inclusion_mode(&mut self) -> Result<()> {
        if self.device_type != DeviceType::Hub {
            return Err(Error::InvalidState);
        }
        self.inclusion_mode = false;
        self.reset_session();
        Ok(())
    }

    /// Build the INCLUDE_OPEN broadcast (hub only, inclusion mode enabled)
    pub fn prepare_open(&mut self, now_ms: u32) -> Result<InclusionAction> {
        if self.device_type != DeviceType::Hub || !self.inclusion_mode {
            return Err(Error::InvalidState);
        }
        self.transition(ProtocolState::WaitingRequest, now_ms);
        Ok(InclusionAction {
            topic: Topic::IncludeOpen as u8,
            dest: BROADCAST_ID,
            payload: PayloadBuf::new(),
        })
    }

    /// Handle a received inclusion message
    ///
    /// Messages that are unexpected for the current role and protocol state,
    /// malformed, or failing authentication are dropped without effect.
    /// Returned errors indicate a broken session (missing key material,
    /// storage failure); the caller resets the session and reports failure.
    pub fn handle_message<S: Storage>(
        &mut self,
        msg: &InclusionMessage<'_>,
        next_frame_counter: u32,
        enc: &mut EncryptionService,
        store: &mut DeviceStore<S>,
        rng: &mut impl CryptoRngCore,
        now_ms: u32,
    ) -> Result<HandleOutcome> {
        if msg.topic == Topic::IncludeOpen as u8 {
            self.handle_open(msg, next_frame_counter, enc, store, rng, now_ms)
        } else if msg.topic == Topic::IncludeRequest as u8 {
            self.handle_request(msg, enc, rng, now_ms)
        } else if msg.topic == Topic::IncludeResponse as u8 {
            self.handle_response(msg, enc, now_ms)
        } else if msg.topic == Topic::IncludeConfirm as u8 {
            self.handle_confirm(msg, enc)
        } else if msg.topic == Topic::IncludeSuccess as u8 {
            self.handle_success(msg, enc, store)
        } else {
            Ok((None, None))
        }
    }

    /// Check for a session timeout; resets the protocol state when one fires
    pub fn poll_timeout(&mut self, now_ms: u32) -> Option<InclusionEvent> {
        if self.protocol_state == ProtocolState::Idle {
            return None;
        }
        if now_ms.wrapping_sub(self.state_entered_ms) >= SESSION_TIMEOUT_MS {
            self.reset_session();
            return Some(InclusionEvent::Timeout);
        }
        None
    }

    /// Abandon the current session without touching the inclusion state
    pub fn reset_session(&mut self) {
        self.protocol_state = ProtocolState::Idle;
        self.nonce = None;
        self.peer_id = None;
    }

    /// Initial frame counter announced by the candidate device, if any
    pub fn peer_initial_counter(&self) -> u32 {
        self.peer_initial_counter
    }

    fn transition(&mut self, state: ProtocolState, now_ms: u32) {
        self.protocol_state = state;
        self.state_entered_ms = now_ms;
    }

    /// Device: an open network invitation starts (or restarts) a session
    fn handle_open<S: Storage>(
        &mut self,
        msg: &InclusionMessage<'_>,
        next_frame_counter: u32,
        enc: &mut EncryptionService,
        store: &mut DeviceStore<S>,
        rng: &mut impl CryptoRngCore,
        now_ms: u32,
    ) -> Result<HandleOutcome> {
        if self.device_type != DeviceType::Standard || self.state == InclusionState::Included {
            return Ok((None, None));
        }
        // A fresh INCLUDE_OPEN cancels any session in flight and restarts.
        self.reset_session();

        self.state = InclusionState::Pending;
        store.persist_inclusion_state(InclusionState::Pending)?;

        if enc.device_public().is_none() {
            match store.load_private_key()? {
                Some(private) => {
                    let public = ecies::derive_public_key(&private)?;
                    enc.set_device_keys(private, public);
                }
                None => {
                    let (public, private) = keys::generate_keypair(rng);
                    store.persist_private_key(&private)?;
                    enc.set_device_keys(private, public);
                }
            }
        }
        let public = enc.device_public().ok_or(Error::MissingKey)?;

        let mut payload = PayloadBuf::new();
        payload
            .extend_from_slice(public)
            .map_err(|_| Error::PacketTooLong)?;
        payload
            .extend_from_slice(&next_frame_counter.to_be_bytes())
            .map_err(|_| Error::PacketTooLong)?;

        self.peer_id = Some(msg.src);
        self.transition(ProtocolState::WaitingResponse, now_ms);

        Ok((
            Some(InclusionAction {
                topic: Topic::IncludeRequest as u8,
                dest: msg.src,
                payload,
            }),
            None,
        ))
    }

    /// Hub: a candidate announced itself, answer with the network key
    fn handle_request(
        &mut self,
        msg: &InclusionMessage<'_>,
        enc: &mut EncryptionService,
        rng: &mut impl CryptoRngCore,
        now_ms: u32,
    ) -> Result<HandleOutcome> {
        if self.device_type != DeviceType::Hub
            || !self.inclusion_mode
            || self.protocol_state != ProtocolState::WaitingRequest
        {
            return Ok((None, None));
        }
        if msg.payload.len() != REQUEST_PAYLOAD_LEN {
            return Ok((None, None));
        }

        let mut peer_public = [0u8; PUBLIC_KEY_LEN];
        peer_public.copy_from_slice(&msg.payload[..PUBLIC_KEY_LEN]);
        self.peer_initial_counter = u32::from_be_bytes(
            msg.payload[PUBLIC_KEY_LEN..REQUEST_PAYLOAD_LEN]
                .try_into()
                .map_err(|_| Error::InvalidLength)?,
        );
        enc.set_temp_peer_public(peer_public);

        let hub_public = *enc.device_public().ok_or(Error::MissingKey)?;
        let network_key = *enc.network_key().ok_or(Error::MissingKey)?;

        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);
        self.nonce = Some(nonce);

        let mut payload = PayloadBuf::new();
        payload
            .extend_from_slice(&hub_public)
            .map_err(|_| Error::PacketTooLong)?;
        payload
            .extend_from_slice(&network_key)
            .map_err(|_| Error::PacketTooLong)?;
        payload
            .extend_from_slice(&nonce)
            .map_err(|_| Error::PacketTooLong)?;

        self.peer_id = Some(msg.src);
        self.transition(ProtocolState::WaitingConfirmation, now_ms);

        Ok((
            Some(InclusionAction {
                topic: Topic::IncludeResponse as u8,
                dest: msg.src,
                payload,
            }),
            None,
        ))
    }

    /// Device: the hub delivered its key material, confirm with the nonce
    fn handle_response(
        &mut self,
        msg: &InclusionMessage<'_>,
        enc: &mut EncryptionService,
        now_ms: u32,
    ) -> Result<HandleOutcome> {
        if self.device_type != DeviceType::Standard
            || self.protocol_state != ProtocolState::WaitingResponse
            || self.peer_id != Some(msg.src)
        {
            return Ok((None, None));
        }
        if msg.payload.len() != RESPONSE_PLAINTEXT_LEN {
            return Ok((None, None));
        }

        let mut hub_public = [0u8; PUBLIC_KEY_LEN];
        hub_public.copy_from_slice(&msg.payload[..PUBLIC_KEY_LEN]);
        let mut network_key = [0u8; NETWORK_KEY_LEN];
        network_key
            .copy_from_slice(&msg.payload[PUBLIC_KEY_LEN..PUBLIC_KEY_LEN + NETWORK_KEY_LEN]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&msg.payload[PUBLIC_KEY_LEN + NETWORK_KEY_LEN..]);

        // The MIC key depends on the hub key carried inside the encrypted
        // payload, so the receive pipeline defers verification to here.
        // Verify before any state changes.
        if let (Some(header), Some(ciphertext), Some(mic)) =
            (msg.mic_header, msg.ciphertext, msg.mic)
        {
            let private = enc.device_private().ok_or(Error::MissingKey)?;
            let k_mac = ecies::shared_key(private, &hub_public)?;
            if !cmac::verify_mic(&k_mac, header, ciphertext, &mic) {
                return Ok((None, None));
            }
        }

        enc.set_hub_public(hub_public);
        enc.set_network_key(network_key);
        self.nonce = Some(nonce);

        let mut payload = PayloadBuf::new();
        payload
            .extend_from_slice(&nonce)
            .map_err(|_| Error::PacketTooLong)?;

        self.transition(ProtocolState::WaitingSuccess, now_ms);

        Ok((
            Some(InclusionAction {
                topic: Topic::IncludeConfirm as u8,
                dest: msg.src,
                payload,
            }),
            None,
        ))
    }

    /// Hub: the candidate proved it holds the network key
    fn handle_confirm(
        &mut self,
        msg: &InclusionMessage<'_>,
        enc: &mut EncryptionService,
    ) -> Result<HandleOutcome> {
        if self.device_type != DeviceType::Hub
            || self.protocol_state != ProtocolState::WaitingConfirmation
            || self.peer_id != Some(msg.src)
        {
            return Ok((None, None));
        }
        // Nonce mismatch: drop and keep waiting until the session times out.
        match self.nonce {
            Some(nonce) if msg.payload == nonce.as_slice() => {}
            _ => return Ok((None, None)),
        }

        let peer = msg.src;
        self.reset_session();
        enc.clear_temp_peer_public();

        Ok((
            Some(InclusionAction {
                topic: Topic::IncludeSuccess as u8,
                dest: peer,
                payload: PayloadBuf::new(),
            }),
            Some(InclusionEvent::DeviceIncluded(peer)),
        ))
    }

    /// Device: inclusion is complete, persist everything
    fn handle_success<S: Storage>(
        &mut self,
        msg: &InclusionMessage<'_>,
        enc: &mut EncryptionService,
        store: &mut DeviceStore<S>,
    ) -> Result<HandleOutcome> {
        if self.device_type != DeviceType::Standard
            || self.protocol_state != ProtocolState::WaitingSuccess
            || self.peer_id != Some(msg.src)
        {
            return Ok((None, None));
        }

        let hub_public = *enc.hub_public().ok_or(Error::MissingKey)?;
        let network_key = *enc.network_key().ok_or(Error::MissingKey)?;
        store.persist_hub_key(&hub_public)?;
        store.persist_network_key(&network_key)?;
        store.persist_inclusion_state(InclusionState::Included)?;

        self.state = InclusionState::Included;
        self.reset_session();

        Ok((None, Some(InclusionEvent::Included)))
    }
}
