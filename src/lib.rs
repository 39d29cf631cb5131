#![cfg_attr(not(test), no_std)]

//! CHIPoBLE Connection Manager
//!
//! Connection, indication and advertising management for the Matter
//! BLE transport (CHIPoBLE), organized into these layers:
//!
//! - `ble`: the manager, its tables and the radio/transport interfaces
//! - `config`: build-time knobs and runtime configuration
//! - `error`: the error taxonomy every operation reports in

// Must come first so the logging macros are visible in every module
#[macro_use]
mod fmt;

pub mod ble;
pub mod config;
pub mod error;

pub use ble::advertising::{AdvertisingMode, AdvertisingState, AdvertisingTier, ServiceMode};
pub use ble::events::{
    AdvertisingActivity, ConnectionErrorReason, RadioEvent, RadioEventListener, RadioEventQueue, RadioEventSender,
    TransportListener,
};
pub use ble::manager::BleManager;
pub use ble::radio::{AdvertisingParams, RadioService, SdStatus, TimerId};
pub use config::{BleConfig, FullTablePolicy, IntervalRange};
pub use error::BleError;
