#![no_std]
#![allow(dead_code)]

use heapless::{Deque, FnvIndexMap, String, Vec};
use rand_core::{CryptoRng, RngCore};

use radiomesh::packet::{FrameBuf, MAX_FRAME_LEN};
use radiomesh::radio::traits::{LoraParams, Radio, RadioError};
use radiomesh::storage::{Storage, StorageError, ValueBuf};

/// Mock radio for testing
///
/// Frames handed to `start_transmit` are captured in order; frames injected
/// with `inject_frame` raise the RX flag and are returned by the next
/// `read_received`. Transmissions complete immediately, raising the TX flag.
pub struct MockRadio {
    rx_queue: Deque<FrameBuf, 8>,
    tx_queue: Deque<FrameBuf, 16>,
    rx_flag: bool,
    tx_flag: bool,
    rssi: i16,
    snr: i8,
    params: Option<LoraParams>,
    receiving: bool,
    error_mode: bool,
    irq_error: bool,
    tx_count: usize,
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRadio {
    /// Create a new mock radio
    pub fn new() -> Self {
        Self {
            rx_queue: Deque::new(),
            tx_queue: Deque::new(),
            rx_flag: false,
            tx_flag: false,
            rssi: -50,
            snr: 10,
            params: None,
            receiving: false,
            error_mode: false,
            irq_error: false,
            tx_count: 0,
        }
    }

    /// Queue a frame for reception and raise the RX flag
    pub fn inject_frame(&mut self, frame: &[u8]) {
        let mut buf = FrameBuf::new();
        buf.extend_from_slice(frame).unwrap();
        self.rx_queue.push_back(buf).unwrap();
        self.rx_flag = true;
    }

    /// Pop the oldest captured transmission
    pub fn take_tx(&mut self) -> Option<FrameBuf> {
        self.tx_queue.pop_front()
    }

    /// Number of frames transmitted so far
    pub fn tx_count(&self) -> usize {
        self.tx_count
    }

    /// Set the RSSI reported for received frames
    pub fn set_rssi(&mut self, rssi: i16) {
        self.rssi = rssi;
    }

    /// Make every radio operation fail
    pub fn set_error_mode(&mut self, enabled: bool) {
        self.error_mode = enabled;
    }

    /// Report an IRQ-level error on the next poll
    pub fn set_irq_error(&mut self, enabled: bool) {
        self.irq_error = enabled;
    }

    /// Whether the radio is in receive mode
    pub fn is_receiving(&self) -> bool {
        self.receiving
    }
}

impl Radio for MockRadio {
    fn set_params(&mut self, params: &LoraParams) -> Result<(), RadioError> {
        if self.error_mode {
            return Err(RadioError::Failure);
        }
        self.params = Some(*params);
        Ok(())
    }

    fn start_receive(&mut self) -> Result<(), RadioError> {
        if self.error_mode {
            return Err(RadioError::Failure);
        }
        self.receiving = true;
        Ok(())
    }

    fn start_transmit(&mut self, data: &[u8]) -> Result<(), RadioError> {
        if self.error_mode {
            return Err(RadioError::Failure);
        }
        if data.len() > MAX_FRAME_LEN {
            return Err(RadioError::Failure);
        }
        let mut buf = FrameBuf::new();
        buf.extend_from_slice(data).map_err(|_| RadioError::Failure)?;
        self.tx_queue.push_back(buf).map_err(|_| RadioError::Failure)?;
        self.tx_count += 1;
        self.receiving = false;
        self.tx_flag = true;
        Ok(())
    }

    fn read_received(&mut self, buf: &mut [u8]) -> Result<usize, RadioError> {
        if self.error_mode {
            return Err(RadioError::Failure);
        }
        match self.rx_queue.pop_front() {
            Some(frame) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                if !self.rx_queue.is_empty() {
                    self.rx_flag = true;
                }
                Ok(len)
            }
            None => Err(RadioError::RxTimeout),
        }
    }

    fn standby(&mut self) -> Result<(), RadioError> {
        self.receiving = false;
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), RadioError> {
        self.receiving = false;
        Ok(())
    }

    fn rssi(&mut self) -> i16 {
        self.rssi
    }

    fn snr(&mut self) -> i8 {
        self.snr
    }

    fn check_and_clear_rx_flag(&mut self) -> bool {
        let flag = self.rx_flag;
        self.rx_flag = false;
        flag
    }

    fn check_and_clear_tx_flag(&mut self) -> bool {
        let flag = self.tx_flag;
        self.tx_flag = false;
        flag
    }

    fn radio_state_error(&mut self) -> Result<(), RadioError> {
        if self.irq_error {
            self.irq_error = false;
            return Err(RadioError::Failure);
        }
        Ok(())
    }
}

/// In-memory key-value storage for testing
pub struct MemoryStorage {
    map: FnvIndexMap<String<8>, ValueBuf, 16>,
    fail_writes: bool,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            map: FnvIndexMap::new(),
            fail_writes: false,
        }
    }

    /// Make every write fail
    pub fn set_fail_writes(&mut self, enabled: bool) {
        self.fail_writes = enabled;
    }

    fn key_of(key: &str) -> Result<String<8>, StorageError> {
        let mut out = String::new();
        out.push_str(key).map_err(|_| StorageError::WriteFailed)?;
        Ok(out)
    }
}

impl Storage for MemoryStorage {
    fn read(&mut self, key: &str) -> Result<ValueBuf, StorageError> {
        let key = Self::key_of(key)?;
        self.map.get(&key).cloned().ok_or(StorageError::KeyNotFound)
    }

    fn write_and_commit(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::WriteFailed);
        }
        let key = Self::key_of(key)?;
        let mut buf = ValueBuf::new();
        buf.extend_from_slice(value).map_err(|_| StorageError::InvalidSize)?;
        self.map.insert(key, buf).map_err(|_| StorageError::Full)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let key = Self::key_of(key)?;
        self.map.remove(&key);
        Ok(())
    }

    fn exists(&mut self, key: &str) -> bool {
        match Self::key_of(key) {
            Ok(key) => self.map.contains_key(&key),
            Err(_) => false,
        }
    }
}

/// Deterministic xorshift RNG for tests
///
/// Not cryptographically secure; the `CryptoRng` marker is a test-only lie
/// that lets the deterministic sequence drive key generation.
pub struct TestRng(u32);

impl TestRng {
    /// Create a generator from a nonzero seed
    pub fn new(seed: u32) -> Self {
        Self(if seed == 0 { 0xA5A5_A5A5 } else { seed })
    }
}

impl RngCore for TestRng {
    fn next_u32(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }

    fn next_u64(&mut self) -> u64 {
        (u64::from(self.next_u32()) << 32) | u64::from(self.next_u32())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for TestRng {}
