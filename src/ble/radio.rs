//! Radio Service Interface
//!
//! The narrow downstream interface the manager drives. A vendor binding
//! implements [`RadioService`]; every call is fire-and-forget and completion is
//! reported later through the radio event queue.

use embassy_time::Duration;

use crate::ble::adv_data::AdvertisingPayload;
use crate::error::BleError;

/// Identifier of a radio soft timer
///
/// The low byte names the owner slot, the high byte is a generation bumped on
/// every arm. A fire that was queued before its slot was re-armed carries the
/// old generation and no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerId(pub u16);

impl TimerId {
    pub const fn new(slot: u8, generation: u8) -> Self {
        TimerId(((generation as u16) << 8) | slot as u16)
    }

    /// Owner slot
    pub const fn slot(self) -> u8 {
        self.0 as u8
    }

    pub const fn generation(self) -> u8 {
        (self.0 >> 8) as u8
    }
}

/// Advertising parameters handed to the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvertisingParams {
    /// Advertising interval minimum (0.625ms units)
    pub interval_min: u16,
    /// Advertising interval maximum (0.625ms units)
    pub interval_max: u16,
    /// Whether centrals may connect
    pub connectable: bool,
}

/// Downstream radio / link-layer service
///
/// Implementations translate their vendor status codes into [`BleError`]
/// through `Self::Error`; nothing vendor specific crosses into the manager.
pub trait RadioService {
    /// Vendor status type
    type Error: Into<BleError>;

    /// Configure payload and timing, then start advertising
    fn start_advertising(
        &mut self,
        params: &AdvertisingParams,
        payload: &AdvertisingPayload,
    ) -> Result<(), Self::Error>;

    /// Stop advertising
    fn stop_advertising(&mut self) -> Result<(), Self::Error>;

    /// Queue an indication on a characteristic
    fn send_indication(&mut self, conn_handle: u16, char_handle: u16, data: &[u8]) -> Result<(), Self::Error>;

    /// Request link termination
    fn close_connection(&mut self, conn_handle: u16) -> Result<(), Self::Error>;

    /// Set the random static device address used while advertising
    fn set_random_device_address(&mut self, addr: [u8; 6]) -> Result<(), Self::Error>;

    /// ATT MTU negotiated on a link, 0 when unknown
    fn negotiated_mtu(&self, conn_handle: u16) -> u16;

    /// Arm a one-shot soft timer, replacing any running timer with the same id
    fn start_soft_timer(&mut self, timer: TimerId, timeout: Duration) -> Result<(), Self::Error>;

    /// Disarm a soft timer
    fn stop_soft_timer(&mut self, timer: TimerId) -> Result<(), Self::Error>;

    /// Fill `buf` from the radio's entropy source
    fn fill_random(&mut self, buf: &mut [u8]) -> Result<(), Self::Error>;
}

/// Translate a radio call result into the crate taxonomy
pub fn status<T, E: Into<BleError>>(result: Result<T, E>) -> Result<T, BleError> {
    result.map_err(Into::into)
}

/// nRF SoftDevice status code (`NRF_ERROR_*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SdStatus(pub u32);

impl SdStatus {
    pub const SUCCESS: SdStatus = SdStatus(0);
    pub const SOFTDEVICE_NOT_ENABLED: SdStatus = SdStatus(2);
    pub const INTERNAL: SdStatus = SdStatus(3);
    pub const NO_MEM: SdStatus = SdStatus(4);
    pub const NOT_FOUND: SdStatus = SdStatus(5);
    pub const NOT_SUPPORTED: SdStatus = SdStatus(6);
    pub const INVALID_PARAM: SdStatus = SdStatus(7);
    pub const INVALID_STATE: SdStatus = SdStatus(8);
    pub const INVALID_LENGTH: SdStatus = SdStatus(9);
    pub const INVALID_FLAGS: SdStatus = SdStatus(10);
    pub const INVALID_DATA: SdStatus = SdStatus(11);
    pub const DATA_SIZE: SdStatus = SdStatus(12);
    pub const TIMEOUT: SdStatus = SdStatus(13);
    pub const NULL: SdStatus = SdStatus(14);
    pub const FORBIDDEN: SdStatus = SdStatus(15);
    pub const INVALID_ADDR: SdStatus = SdStatus(16);
    pub const BUSY: SdStatus = SdStatus(17);
    pub const CONN_COUNT: SdStatus = SdStatus(18);
    pub const RESOURCES: SdStatus = SdStatus(19);

    /// Turn a raw return code into a `Result`
    pub fn check(code: u32) -> Result<(), SdStatus> {
        if code == Self::SUCCESS.0 {
            Ok(())
        } else {
            Err(SdStatus(code))
        }
    }
}

impl From<SdStatus> for BleError {
    fn from(status: SdStatus) -> Self {
        match status {
            SdStatus::INVALID_PARAM
            | SdStatus::INVALID_FLAGS
            | SdStatus::INVALID_DATA
            | SdStatus::NULL
            | SdStatus::INVALID_ADDR
            | SdStatus::NOT_FOUND => BleError::InvalidArgument,
            SdStatus::INVALID_LENGTH | SdStatus::DATA_SIZE => BleError::InvalidLength,
            SdStatus::INVALID_STATE | SdStatus::SOFTDEVICE_NOT_ENABLED | SdStatus::BUSY => {
                BleError::IncorrectState
            }
            SdStatus::NOT_SUPPORTED => BleError::Unsupported,
            SdStatus::NO_MEM | SdStatus::CONN_COUNT | SdStatus::RESOURCES => BleError::ResourceExhausted,
            SdStatus(code) => BleError::Unknown(code),
        }
    }
}
