//! Manager Configuration
//!
//! Compile/config-time knobs for the CHIPoBLE manager. Defaults follow the
//! Matter commissioning recommendations for advertising cadence.

use embassy_time::Duration;

use crate::ble::adv_data::MAX_DEVICE_NAME_LEN;
use crate::error::BleError;

/// Maximum number of simultaneous CHIPoBLE connections
pub const MAX_CONNECTIONS: usize = 2;

/// Depth of the radio event queue drained by the protocol task
pub const EVENT_QUEUE_DEPTH: usize = 8;

/// Smallest advertising interval accepted by the link layer (20ms)
pub const MIN_ADV_INTERVAL: u16 = 0x0020;

/// Largest advertising interval accepted by the link layer (10.24s)
pub const MAX_ADV_INTERVAL: u16 = 0x4000;

/// Largest discriminator value (12 bits)
pub const MAX_DISCRIMINATOR: u16 = 0x0FFF;

/// Advertising interval range in 0.625ms units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IntervalRange {
    /// Advertising interval minimum (0.625ms units)
    pub min: u16,
    /// Advertising interval maximum (0.625ms units)
    pub max: u16,
}

impl IntervalRange {
    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    fn validate(&self) -> Result<(), BleError> {
        if self.min < MIN_ADV_INTERVAL || self.max > MAX_ADV_INTERVAL || self.min > self.max {
            return Err(BleError::InvalidArgument);
        }
        Ok(())
    }
}

/// What to do with advertising once every connection slot is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FullTablePolicy {
    /// Keep advertising, but non-connectable
    NonConnectable,
    /// Stop advertising until a slot frees up
    Stop,
}

/// CHIPoBLE manager configuration
#[derive(Debug, Clone)]
pub struct BleConfig {
    /// Fast tier interval (20ms - 60ms)
    pub fast_interval: IntervalRange,
    /// Slow tier interval (150ms)
    pub slow_interval: IntervalRange,
    /// Extended tier interval (1.2s)
    pub extended_interval: IntervalRange,
    /// Time spent in the fast tier before dropping to slow
    pub fast_window: Duration,
    /// Time spent in the slow tier before moving to extended, `None` disables the extended tier
    pub slow_window: Option<Duration>,
    /// How long an indication may stay unconfirmed
    pub indication_timeout: Duration,
    /// Prefix of the generated device name
    pub device_name_prefix: &'static str,
    /// Number of discriminator digits appended to the prefix
    pub device_name_suffix_len: u8,
    /// Setup discriminator (12 bits)
    pub discriminator: u16,
    /// Vendor id advertised in the device identification block
    pub vendor_id: u16,
    /// Product id advertised in the device identification block
    pub product_id: u16,
    /// Set the additional-data flag in the device identification block
    pub additional_data: bool,
    /// Advertising behaviour when the connection table is full
    pub when_full: FullTablePolicy,
    /// GATT value handle of the CHIPoBLE RX (write) characteristic
    pub rx_char_handle: u16,
    /// GATT value handle of the CHIPoBLE TX (indicate) characteristic
    pub tx_char_handle: u16,
    /// Draw a fresh random static address for every advertising session
    pub rotate_random_address: bool,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            fast_interval: IntervalRange::new(32, 96),
            slow_interval: IntervalRange::new(240, 240),
            extended_interval: IntervalRange::new(1920, 1936),
            fast_window: Duration::from_secs(30),
            slow_window: None,
            indication_timeout: Duration::from_secs(6),
            device_name_prefix: "MATTER-",
            device_name_suffix_len: 4,
            discriminator: 0x0F00,
            vendor_id: 0xFFF1,
            product_id: 0x8000,
            additional_data: false,
            when_full: FullTablePolicy::NonConnectable,
            rx_char_handle: 0x000E,
            tx_char_handle: 0x0010,
            rotate_random_address: true,
        }
    }
}

impl BleConfig {
    /// Check the configuration for values the radio or the payload cannot carry
    pub fn validate(&self) -> Result<(), BleError> {
        self.fast_interval.validate()?;
        self.slow_interval.validate()?;
        self.extended_interval.validate()?;

        if self.discriminator > MAX_DISCRIMINATOR {
            return Err(BleError::InvalidArgument);
        }

        // u16 discriminators never need more than 5 digits
        if self.device_name_suffix_len > 5 {
            return Err(BleError::InvalidArgument);
        }
        if self.device_name_prefix.len() + self.device_name_suffix_len as usize > MAX_DEVICE_NAME_LEN {
            return Err(BleError::InvalidLength);
        }

        if self.indication_timeout.as_ticks() == 0 || self.fast_window.as_ticks() == 0 {
            return Err(BleError::InvalidArgument);
        }
        if let Some(window) = self.slow_window {
            if window.as_ticks() == 0 {
                return Err(BleError::InvalidArgument);
            }
        }

        if self.rx_char_handle == self.tx_char_handle {
            return Err(BleError::InvalidArgument);
        }

        Ok(())
    }
}
