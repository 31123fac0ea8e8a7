use crate::{Error, Result};

/// Radio error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// Radio is not initialized or not in a usable state
    NotReady,
    /// Transmission timed out
    TxTimeout,
    /// Reception timed out
    RxTimeout,
    /// Radio operation failed
    Failure,
}

/// LoRa modem parameters
#[derive(Debug, Clone, Copy)]
pub struct LoraParams {
    /// Carrier frequency in MHz
    pub frequency_mhz: f32,
    /// Spreading factor (6-12)
    pub spreading_factor: u8,
    /// Bandwidth in kHz (7.8-500)
    pub bandwidth_khz: f32,
    /// Output power in dBm (-9..22)
    pub tx_power_dbm: i8,
    /// Sync word
    pub sync_word: u8,
    /// Whether the network uses the private sync word space
    pub private_network: bool,
}

impl Default for LoraParams {
    fn default() -> Self {
        Self {
            frequency_mhz: 915.0,
            spreading_factor: 7,
            bandwidth_khz: 125.0,
            tx_power_dbm: 14,
            sync_word: 0x12,
            private_network: true,
        }
    }
}

impl LoraParams {
    /// Validate the parameter ranges
    pub fn validate(&self) -> Result<()> {
        if !(6..=12).contains(&self.spreading_factor) {
            return Err(Error::InvalidParam);
        }
        if !(7.8..=500.0).contains(&self.bandwidth_khz) {
            return Err(Error::InvalidParam);
        }
        if !(-9..=22).contains(&self.tx_power_dbm) {
            return Err(Error::InvalidParam);
        }
        Ok(())
    }
}

/// Radio trait for mesh devices
///
/// Byte-granularity access to a LoRa modem. The modem provides packet
/// boundaries; frames cross this interface exactly as serialized. The two
/// flag accessors and [`Radio::radio_state_error`] are the interrupt
/// boundary: the ISR only ever raises a flag, the polling loop is the sole
/// clearer, and implementations must use atomic load/store for all three.
pub trait Radio {
    /// Configure the modem
    fn set_params(&mut self, params: &LoraParams) -> core::result::Result<(), RadioError>;

    /// Switch the radio to receive mode
    fn start_receive(&mut self) -> core::result::Result<(), RadioError>;

    /// Begin transmitting a frame; completion is signaled via the TX flag
    fn start_transmit(&mut self, data: &[u8]) -> core::result::Result<(), RadioError>;

    /// Read the most recently received frame into `buf`, returning its length
    fn read_received(&mut self, buf: &mut [u8]) -> core::result::Result<usize, RadioError>;

    /// Put the radio in standby mode
    fn standby(&mut self) -> core::result::Result<(), RadioError>;

    /// Put the radio in sleep mode
    fn sleep(&mut self) -> core::result::Result<(), RadioError>;

    /// RSSI of the last received frame in dBm
    fn rssi(&mut self) -> i16;

    /// SNR of the last received frame in dB
    fn snr(&mut self) -> i8;

    /// Check and clear the receive-done flag
    fn check_and_clear_rx_flag(&mut self) -> bool;

    /// Check and clear the transmit-done flag
    fn check_and_clear_tx_flag(&mut self) -> bool;

    /// Error recorded by the interrupt handler, if any
    fn radio_state_error(&mut self) -> core::result::Result<(), RadioError>;
}
