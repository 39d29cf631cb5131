//! Transport Event Dispatcher
//!
//! Drains the radio event queue on the protocol task and turns each raw radio
//! event into state changes on the manager's tables plus the narrow set of
//! CHIPoBLE lifecycle events for the session layer.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::ble::events::{ConnectionErrorReason, EventTag, RadioEvent, RadioEventQueue, TransportListener};
use crate::ble::gatt;
use crate::ble::manager::BleManager;
use crate::ble::radio::{RadioService, TimerId};

impl<R: RadioService, L: TransportListener, const CONNS: usize> BleManager<R, L, CONNS> {
    /// Protocol task loop: handle queued radio events in delivery order. Never returns.
    pub async fn run<M: RawMutex, const N: usize>(&mut self, queue: &RadioEventQueue<M, N>) {
        info!("DISPATCH: Protocol task started");
        let receiver = queue.receiver();
        loop {
            let event = receiver.receive().await;
            self.handle_event(event);
        }
    }

    /// Handle every queued event without waiting, returns how many were handled
    pub fn process_pending<M: RawMutex, const N: usize>(&mut self, queue: &RadioEventQueue<M, N>) -> usize {
        let mut handled = 0;
        while let Ok(event) = queue.try_receive() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Apply one radio event
    pub fn handle_event(&mut self, event: RadioEvent) {
        trace!("DISPATCH: {:?}", EventTag::of(&event));

        match event {
            RadioEvent::Booted => self.on_booted(),
            RadioEvent::ConnectionOpened {
                conn_handle,
                bonding_handle,
            } => self.on_connection_opened(conn_handle, bonding_handle),
            RadioEvent::ConnectionClosed { conn_handle, reason } => self.on_connection_closed(conn_handle, reason),
            RadioEvent::MtuExchanged { conn_handle, mtu } => self.on_mtu_exchanged(conn_handle, mtu),
            RadioEvent::CharacteristicWritten {
                conn_handle,
                char_handle,
                data,
            } => self.on_characteristic_written(conn_handle, char_handle, &data),
            RadioEvent::CccdStatusChanged {
                conn_handle,
                char_handle,
                flags,
            } => self.on_cccd_status_changed(conn_handle, char_handle, flags),
            RadioEvent::IndicationConfirmed { conn_handle } => self.on_indication_confirmed(conn_handle),
            RadioEvent::SoftTimerFired { timer } => self.on_soft_timer_fired(timer),
        }
    }

    fn on_booted(&mut self) {
        info!("DISPATCH: Radio stack booted");
        self.stack_ready = true;
        let was_advertising = self.advertising.is_advertising();
        self.redrive(EventTag::Booted, was_advertising);
    }

    fn on_connection_opened(&mut self, conn_handle: u16, bonding_handle: u8) {
        let was_advertising = self.advertising.is_advertising();
        self.advertising.on_connection_opened();

        match self.connections.add(conn_handle, bonding_handle) {
            Ok(_) => info!(
                "DISPATCH: Connection {} opened ({} of {})",
                conn_handle,
                self.connections.count(),
                CONNS
            ),
            Err(e) => warn!("DISPATCH: Not tracking connection {} ({:?})", conn_handle, e),
        }

        self.redrive(EventTag::ConnectionOpened, was_advertising);
    }

    fn on_connection_closed(&mut self, conn_handle: u16, reason: u8) {
        let Some(conn) = self.connections.find(conn_handle).copied() else {
            debug!("DISPATCH: Close of untracked connection {}", conn_handle);
            return;
        };

        if let Some(timer) = self.indications.cancel(conn_handle) {
            self.stop_indication_timer(&timer);
        }
        self.connections.remove(conn_handle);

        let reason_kind = if conn.close_requested() || reason == gatt::HCI_LOCAL_HOST_TERMINATED {
            ConnectionErrorReason::LocalDisconnect
        } else {
            ConnectionErrorReason::RemoteDisconnect
        };
        info!(
            "DISPATCH: Connection {} closed, reason {:#x} ({:?})",
            conn_handle, reason, reason_kind
        );
        self.listener.on_connection_error(conn_handle, reason_kind);

        let was_advertising = self.advertising.is_advertising();
        self.redrive(EventTag::ConnectionClosed, was_advertising);
    }

    fn on_mtu_exchanged(&mut self, conn_handle: u16, mtu: u16) {
        match self.connections.find_mut(conn_handle) {
            Some(conn) => {
                conn.mtu = mtu;
                debug!("DISPATCH: MTU for connection {} is {}", conn_handle, mtu);
            }
            None => warn!("DISPATCH: MTU exchange on unknown connection {}", conn_handle),
        }
    }

    fn on_characteristic_written(&mut self, conn_handle: u16, char_handle: u16, data: &[u8]) {
        if self.listener.intercept_write(conn_handle, char_handle, data) {
            trace!("DISPATCH: Write to {:#x} claimed by session layer", char_handle);
            return;
        }

        if char_handle != self.rx_char_handle {
            debug!("DISPATCH: Ignoring write to characteristic {:#x}", char_handle);
            return;
        }

        if self.connections.find(conn_handle).is_none() {
            warn!("DISPATCH: Write from unknown connection {}", conn_handle);
            return;
        }

        debug!("DISPATCH: {} bytes written on connection {}", data.len(), conn_handle);
        self.listener.on_write_received(conn_handle, data);
    }

    fn on_cccd_status_changed(&mut self, conn_handle: u16, char_handle: u16, flags: u16) {
        if char_handle != self.tx_char_handle {
            debug!("DISPATCH: Ignoring CCCD change on characteristic {:#x}", char_handle);
            return;
        }

        let Some(conn) = self.connections.find_mut(conn_handle) else {
            warn!("DISPATCH: CCCD change from unknown connection {}", conn_handle);
            return;
        };

        let indicate = gatt::indications_enabled(flags);
        match (conn.subscribed, indicate) {
            (false, true) => {
                conn.subscribed = true;
                info!("DISPATCH: Connection {} subscribed", conn_handle);
                self.listener.on_subscribe(conn_handle);
            }
            (true, false) => {
                conn.subscribed = false;
                info!("DISPATCH: Connection {} unsubscribed", conn_handle);
                if let Some(timer) = self.indications.cancel(conn_handle) {
                    self.stop_indication_timer(&timer);
                }
                self.listener.on_unsubscribe(conn_handle);
            }
            _ => trace!("DISPATCH: CCCD unchanged on connection {}", conn_handle),
        }
    }

    fn on_indication_confirmed(&mut self, conn_handle: u16) {
        if let Some(timer) = self.indications.confirm(conn_handle) {
            self.stop_indication_timer(&timer);
            self.listener.on_indication_confirmed(conn_handle);
        }
    }

    fn on_soft_timer_fired(&mut self, timer: TimerId) {
        if self.advertising.on_timer_fired(timer) {
            let was_advertising = self.advertising.is_advertising();
            self.redrive(EventTag::SoftTimerFired, was_advertising);
            return;
        }

        if self.indications.owns(timer) {
            // Closing the link is left to the session layer
            if let Some(expired) = self.indications.on_timer_fired(timer) {
                self.listener
                    .on_connection_error(expired.conn_handle, ConnectionErrorReason::ProtocolAbort);
            }
            return;
        }

        debug!("DISPATCH: Unknown soft timer {:#x}", timer.0);
    }

    /// Re-drive advertising after an event; a failure has already disabled the service
    fn redrive(&mut self, cause: EventTag, was_advertising: bool) {
        if let Err(e) = self.drive_advertising_since(was_advertising) {
            warn!("DISPATCH: Advertising not restored after {:?} ({:?})", cause, e);
        }
    }
}
