//! Common test utilities for host tests
//!
//! - `FakeRadio`: records every radio call and can be told to fail them
//! - `RecordingListener`: records every upper-layer event
//! - Helpers that build managers and feed them radio events

#![allow(dead_code)]

use std::vec::Vec;

use chipoble_manager::ble::adv_data::AdvertisingPayload;
use chipoble_manager::ble::events::{AdvertisingActivity, ConnectionErrorReason, RadioEvent, TransportListener};
use chipoble_manager::ble::gatt::CCCD_INDICATE;
use chipoble_manager::ble::manager::BleManager;
use chipoble_manager::ble::radio::{AdvertisingParams, RadioService, SdStatus, TimerId};
use chipoble_manager::config::BleConfig;
use embassy_time::Duration;

/// One recorded radio call
#[derive(Debug, Clone, PartialEq)]
pub enum RadioCall {
    StartAdvertising(AdvertisingParams, AdvertisingPayload),
    StopAdvertising,
    SendIndication { conn_handle: u16, char_handle: u16, data: Vec<u8> },
    CloseConnection(u16),
    SetAddress([u8; 6]),
    StartTimer(TimerId, Duration),
    StopTimer(TimerId),
    FillRandom,
}

/// Radio double with injectable failures
#[derive(Debug, Default)]
pub struct FakeRadio {
    pub calls: Vec<RadioCall>,
    pub fail_start_advertising: Option<SdStatus>,
    pub fail_send_indication: Option<SdStatus>,
    pub fail_close: Option<SdStatus>,
    pub fail_start_timer: Option<SdStatus>,
    pub negotiated_mtu: u16,
    pub random_byte: u8,
}

impl FakeRadio {
    pub fn new() -> Self {
        Self {
            random_byte: 0x11,
            ..Self::default()
        }
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    /// Parameters of every `start_advertising` call so far
    pub fn advertising_starts(&self) -> Vec<AdvertisingParams> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                RadioCall::StartAdvertising(params, _) => Some(*params),
                _ => None,
            })
            .collect()
    }

    pub fn last_payload(&self) -> Option<&AdvertisingPayload> {
        self.calls.iter().rev().find_map(|c| match c {
            RadioCall::StartAdvertising(_, payload) => Some(payload),
            _ => None,
        })
    }

    /// Ids of every started soft timer, in order
    pub fn started_timers(&self) -> Vec<TimerId> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                RadioCall::StartTimer(timer, _) => Some(*timer),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&RadioCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }
}

impl RadioService for FakeRadio {
    type Error = SdStatus;

    fn start_advertising(&mut self, params: &AdvertisingParams, payload: &AdvertisingPayload) -> Result<(), SdStatus> {
        if let Some(status) = self.fail_start_advertising {
            return Err(status);
        }
        self.calls.push(RadioCall::StartAdvertising(*params, payload.clone()));
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), SdStatus> {
        self.calls.push(RadioCall::StopAdvertising);
        Ok(())
    }

    fn send_indication(&mut self, conn_handle: u16, char_handle: u16, data: &[u8]) -> Result<(), SdStatus> {
        if let Some(status) = self.fail_send_indication {
            return Err(status);
        }
        self.calls.push(RadioCall::SendIndication {
            conn_handle,
            char_handle,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn close_connection(&mut self, conn_handle: u16) -> Result<(), SdStatus> {
        if let Some(status) = self.fail_close {
            return Err(status);
        }
        self.calls.push(RadioCall::CloseConnection(conn_handle));
        Ok(())
    }

    fn set_random_device_address(&mut self, addr: [u8; 6]) -> Result<(), SdStatus> {
        self.calls.push(RadioCall::SetAddress(addr));
        Ok(())
    }

    fn negotiated_mtu(&self, _conn_handle: u16) -> u16 {
        self.negotiated_mtu
    }

    fn start_soft_timer(&mut self, timer: TimerId, timeout: Duration) -> Result<(), SdStatus> {
        if let Some(status) = self.fail_start_timer {
            return Err(status);
        }
        self.calls.push(RadioCall::StartTimer(timer, timeout));
        Ok(())
    }

    fn stop_soft_timer(&mut self, timer: TimerId) -> Result<(), SdStatus> {
        self.calls.push(RadioCall::StopTimer(timer));
        Ok(())
    }

    fn fill_random(&mut self, buf: &mut [u8]) -> Result<(), SdStatus> {
        self.calls.push(RadioCall::FillRandom);
        buf.fill(self.random_byte);
        Ok(())
    }
}

/// One recorded upper-layer event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Subscribe(u16),
    Unsubscribe(u16),
    Write(u16, Vec<u8>),
    Confirmed(u16),
    ConnectionError(u16, ConnectionErrorReason),
    Advertising(AdvertisingActivity),
}

/// Listener recording every event, optionally claiming writes to one characteristic
#[derive(Debug, Default)]
pub struct RecordingListener {
    pub events: Vec<TransportEvent>,
    pub intercepted: Vec<(u16, u16, Vec<u8>)>,
    pub claim_char: Option<u16>,
}

impl RecordingListener {
    pub fn take(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut self.events)
    }
}

impl TransportListener for RecordingListener {
    fn on_subscribe(&mut self, conn_handle: u16) {
        self.events.push(TransportEvent::Subscribe(conn_handle));
    }

    fn on_unsubscribe(&mut self, conn_handle: u16) {
        self.events.push(TransportEvent::Unsubscribe(conn_handle));
    }

    fn on_write_received(&mut self, conn_handle: u16, data: &[u8]) {
        self.events.push(TransportEvent::Write(conn_handle, data.to_vec()));
    }

    fn on_indication_confirmed(&mut self, conn_handle: u16) {
        self.events.push(TransportEvent::Confirmed(conn_handle));
    }

    fn on_connection_error(&mut self, conn_handle: u16, reason: ConnectionErrorReason) {
        self.events.push(TransportEvent::ConnectionError(conn_handle, reason));
    }

    fn on_advertising_change(&mut self, activity: AdvertisingActivity) {
        self.events.push(TransportEvent::Advertising(activity));
    }

    fn intercept_write(&mut self, conn_handle: u16, char_handle: u16, data: &[u8]) -> bool {
        self.intercepted.push((conn_handle, char_handle, data.to_vec()));
        self.claim_char == Some(char_handle)
    }
}

pub type TestManager = BleManager<FakeRadio, RecordingListener>;

pub fn manager_with(config: BleConfig) -> TestManager {
    BleManager::new(config, FakeRadio::new(), RecordingListener::default()).unwrap()
}

/// Manager whose radio has booted, with advertising still disabled
pub fn booted_manager() -> TestManager {
    let mut manager = manager_with(BleConfig::default());
    manager.handle_event(RadioEvent::Booted);
    manager
}

/// Booted manager that is advertising, with recordings cleared
pub fn advertising_manager(config: BleConfig) -> TestManager {
    let mut manager = manager_with(config);
    manager.handle_event(RadioEvent::Booted);
    manager.set_advertising_enabled(true).unwrap();
    manager.radio_mut().clear();
    manager.listener_mut().events.clear();
    manager
}

pub fn open(manager: &mut TestManager, conn_handle: u16) {
    manager.handle_event(RadioEvent::ConnectionOpened {
        conn_handle,
        bonding_handle: 0,
    });
}

pub fn close(manager: &mut TestManager, conn_handle: u16, reason: u8) {
    manager.handle_event(RadioEvent::ConnectionClosed { conn_handle, reason });
}

/// Open a connection and enable indications on the TX characteristic
pub fn subscribe(manager: &mut TestManager, conn_handle: u16) {
    let tx = BleConfig::default().tx_char_handle;
    open(manager, conn_handle);
    manager.handle_event(RadioEvent::CccdStatusChanged {
        conn_handle,
        char_handle: tx,
        flags: CCCD_INDICATE,
    });
}

/// Test helper to create test data arrays
pub fn create_test_data(size: usize, pattern: u8) -> Vec<u8> {
    (0..size).map(|i| pattern.wrapping_add(i as u8)).collect()
}
