//! Error Taxonomy
//!
//! Every failure that leaves the manager is expressed as a [`BleError`] kind.
//! Vendor status codes from the radio are translated at the
//! [`RadioService`](crate::ble::radio::RadioService) boundary and never reach
//! the core.

use core::fmt;

/// Errors reported by the CHIPoBLE manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleError {
    /// A parameter was out of range or referred to something unknown
    InvalidArgument,
    /// A buffer or payload had the wrong length
    InvalidLength,
    /// The operation is not allowed in the current state
    IncorrectState,
    /// The operation is not supported by this build or radio
    Unsupported,
    /// A fixed-capacity table or timer pool is full
    ResourceExhausted,
    /// Platform specific failure that has no portable meaning
    Unknown(u32),
}

impl fmt::Display for BleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BleError::InvalidArgument => f.write_str("invalid argument"),
            BleError::InvalidLength => f.write_str("invalid length"),
            BleError::IncorrectState => f.write_str("incorrect state"),
            BleError::Unsupported => f.write_str("unsupported"),
            BleError::ResourceExhausted => f.write_str("resource exhausted"),
            BleError::Unknown(code) => write!(f, "unknown platform error {:#x}", code),
        }
    }
}

impl From<crate::ble::connection::ConnectionError> for BleError {
    fn from(err: crate::ble::connection::ConnectionError) -> Self {
        match err {
            crate::ble::connection::ConnectionError::TableFull => BleError::ResourceExhausted,
            crate::ble::connection::ConnectionError::DuplicateHandle => BleError::InvalidArgument,
            crate::ble::connection::ConnectionError::ConnectionNotFound => BleError::InvalidArgument,
        }
    }
}

impl From<crate::ble::indication::NoSlot> for BleError {
    fn from(_: crate::ble::indication::NoSlot) -> Self {
        BleError::ResourceExhausted
    }
}
