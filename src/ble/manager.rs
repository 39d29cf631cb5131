//! CHIPoBLE Manager
//!
//! The single object that owns the connection table, the indication timers and
//! the advertising controller, together with the injected radio service and
//! the upper-layer listener. It lives on the protocol task; radio events reach
//! it through the queue drained in [`dispatcher`](crate::ble::dispatcher).

use embassy_time::{Duration, Instant};

use crate::ble::advertising::{
    AdvertisingController, AdvertisingMode, AdvertisingState, DriveInputs, ServiceMode, ADV_ESCALATION_SLOT,
};
use crate::ble::connection::{ConnectionState, ConnectionTable};
use crate::ble::events::{AdvertisingActivity, TransportListener};
use crate::ble::gatt;
use crate::ble::indication::{IndicationTimeoutTracker, IndicationTimer, INDICATION_TIMER_BASE};
use crate::ble::radio::{self, RadioService, TimerId};
use crate::config::{BleConfig, MAX_CONNECTIONS};
use crate::error::BleError;

const _: () = assert!(ADV_ESCALATION_SLOT < INDICATION_TIMER_BASE);

/// CHIPoBLE connection manager
pub struct BleManager<R: RadioService, L: TransportListener, const CONNS: usize = MAX_CONNECTIONS> {
    pub(crate) connections: ConnectionTable<CONNS>,
    pub(crate) indications: IndicationTimeoutTracker<CONNS>,
    pub(crate) advertising: AdvertisingController,
    pub(crate) radio: R,
    pub(crate) listener: L,
    pub(crate) rx_char_handle: u16,
    pub(crate) tx_char_handle: u16,
    indication_timeout: Duration,
    pub(crate) stack_ready: bool,
}

impl<R: RadioService, L: TransportListener, const CONNS: usize> BleManager<R, L, CONNS> {
    /// Build a manager from a validated configuration
    ///
    /// Advertising stays off until the radio reports boot and the application
    /// enables it.
    pub fn new(config: BleConfig, radio: R, listener: L) -> Result<Self, BleError> {
        config.validate()?;

        if CONNS == 0 {
            return Err(BleError::InvalidArgument);
        }

        let advertising = AdvertisingController::new(&config)?;

        info!(
            "MANAGER: CHIPoBLE manager ready, {} connection slots, device name {}",
            CONNS,
            advertising.device_name()
        );

        Ok(Self {
            connections: ConnectionTable::new(),
            indications: IndicationTimeoutTracker::new(),
            advertising,
            radio,
            listener,
            rx_char_handle: config.rx_char_handle,
            tx_char_handle: config.tx_char_handle,
            indication_timeout: config.indication_timeout,
            stack_ready: false,
        })
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// Radio stack has booted
    pub fn is_stack_ready(&self) -> bool {
        self.stack_ready
    }

    pub fn service_mode(&self) -> ServiceMode {
        self.advertising.service_mode()
    }

    /// Enable or disable the CHIPoBLE service
    pub fn set_service_mode(&mut self, mode: ServiceMode) -> Result<(), BleError> {
        self.advertising.set_service_mode(mode, &mut self.radio)?;
        self.drive_advertising()
    }

    pub fn is_advertising_enabled(&self) -> bool {
        self.advertising.is_advertising_enabled()
    }

    /// Radio is currently advertising
    pub fn is_advertising(&self) -> bool {
        self.advertising.is_advertising()
    }

    pub fn advertising_state(&self) -> AdvertisingState {
        self.advertising.state()
    }

    /// Tier escalation timer currently armed on the radio
    pub fn escalation_timer(&self) -> Option<TimerId> {
        self.advertising.escalation_timer()
    }

    /// Turn CHIPoBLE advertising on or off
    pub fn set_advertising_enabled(&mut self, enabled: bool) -> Result<(), BleError> {
        self.advertising.set_advertising_enabled(enabled, &mut self.radio)?;
        self.drive_advertising()
    }

    /// Restart advertising in the fast or slow tier
    pub fn set_advertising_mode(&mut self, mode: AdvertisingMode) -> Result<(), BleError> {
        self.advertising.set_advertising_mode(mode, &mut self.radio);
        self.drive_advertising()
    }

    pub fn device_name(&self) -> &str {
        self.advertising.device_name()
    }

    /// Set the advertised device name, `None` reverts to the generated name
    pub fn set_device_name(&mut self, name: Option<&str>) -> Result<(), BleError> {
        self.advertising.set_device_name(name)?;
        self.drive_advertising()
    }

    /// Number of live CHIPoBLE connections
    pub fn connection_count(&self) -> usize {
        self.connections.count()
    }

    pub fn connection(&self, conn_handle: u16) -> Option<&ConnectionState> {
        self.connections.find(conn_handle)
    }

    /// Indication awaiting confirmation on a connection
    pub fn pending_indication(&self, conn_handle: u16) -> Option<&IndicationTimer> {
        self.indications.pending(conn_handle)
    }

    /// ATT MTU of a connection, 0 for unknown connections
    pub fn get_mtu(&self, conn_handle: u16) -> u16 {
        match self.connections.find(conn_handle) {
            None => 0,
            Some(conn) if conn.mtu != 0 => conn.mtu,
            Some(_) => self.radio.negotiated_mtu(conn_handle),
        }
    }

    /// Send an indication on the TX characteristic and arm its confirmation timer
    pub fn send_indication(&mut self, conn_handle: u16, data: &[u8]) -> Result<(), BleError> {
        let Some(conn) = self.connections.find(conn_handle) else {
            warn!("MANAGER: Indication for unknown connection {}", conn_handle);
            return Err(BleError::InvalidArgument);
        };
        if !conn.subscribed {
            warn!("MANAGER: Connection {} has not subscribed", conn_handle);
            return Err(BleError::IncorrectState);
        }

        let limit = gatt::max_indication_len(self.get_mtu(conn_handle));
        if data.len() > limit {
            warn!(
                "MANAGER: Indication of {} bytes exceeds {} on connection {}",
                data.len(),
                limit,
                conn_handle
            );
            return Err(BleError::InvalidLength);
        }

        let timer = self
            .indications
            .start(conn_handle, Instant::now() + self.indication_timeout)?;

        // Every indication on the air has an armed timer
        if let Err(e) = radio::status(self.radio.start_soft_timer(timer, self.indication_timeout)) {
            error!("MANAGER: Could not arm indication timer {:#x} ({:?})", timer.0, e);
            self.indications.cancel(conn_handle);
            return Err(e);
        }

        if let Err(e) = radio::status(self.radio.send_indication(conn_handle, self.tx_char_handle, data)) {
            error!("MANAGER: Sending indication on connection {} failed ({:?})", conn_handle, e);
            if let Some(released) = self.indications.cancel(conn_handle) {
                self.stop_indication_timer(&released);
            }
            return Err(e);
        }

        trace!("MANAGER: Sent {} byte indication on connection {}", data.len(), conn_handle);
        Ok(())
    }

    /// Ask the radio to close a connection; closure is reported later as an event
    pub fn close_connection(&mut self, conn_handle: u16) -> Result<(), BleError> {
        let Some(conn) = self.connections.find_mut(conn_handle) else {
            warn!("MANAGER: Close requested for unknown connection {}", conn_handle);
            return Err(BleError::InvalidArgument);
        };
        conn.close_requested = true;

        if let Err(e) = radio::status(self.radio.close_connection(conn_handle)) {
            error!("MANAGER: Closing connection {} failed ({:?})", conn_handle, e);
            if let Some(conn) = self.connections.find_mut(conn_handle) {
                conn.close_requested = false;
            }
            return Err(e);
        }

        info!("MANAGER: Closing connection {}", conn_handle);
        Ok(())
    }

    /// Reconcile advertising with the current state and report activity changes
    fn drive_advertising(&mut self) -> Result<(), BleError> {
        self.drive_advertising_since(self.advertising.is_advertising())
    }

    /// Drive advertising, reporting a change against an earlier activity
    pub(crate) fn drive_advertising_since(&mut self, was_advertising: bool) -> Result<(), BleError> {
        let inputs = DriveInputs {
            stack_ready: self.stack_ready,
            connection_count: self.connections.count(),
            max_connections: CONNS,
        };

        let result = self.advertising.drive_state(inputs, &mut self.radio);
        self.report_advertising_change(was_advertising);
        result
    }

    fn report_advertising_change(&mut self, was_advertising: bool) {
        match (was_advertising, self.advertising.is_advertising()) {
            (false, true) => self.listener.on_advertising_change(AdvertisingActivity::Started),
            (true, false) => self.listener.on_advertising_change(AdvertisingActivity::Stopped),
            _ => {}
        }
    }

    /// Disarm the radio timer behind a released indication slot
    pub(crate) fn stop_indication_timer(&mut self, timer: &IndicationTimer) {
        if let Err(e) = radio::status(self.radio.stop_soft_timer(timer.timer)) {
            debug!("MANAGER: Stopping indication timer {:#x} failed ({:?})", timer.timer.0, e);
        }
    }
}
