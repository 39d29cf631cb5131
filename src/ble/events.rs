//! BLE Event Forwarding System
//!
//! Two event surfaces meet here:
//!
//! - Downward, the radio reports through [`RadioEventListener`]. The provided
//!   implementation, [`RadioEventSender`], only enqueues a [`RadioEvent`] so
//!   that nothing is mutated from the radio's interrupt context.
//! - Upward, the manager reports CHIPoBLE lifecycle events to the session
//!   layer through [`TransportListener`].

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Sender, TrySendError};
use heapless::Vec;

use crate::ble::gatt::MAX_WRITE_LEN;
use crate::ble::radio::TimerId;

/// Characteristic write payload carried through the queue
pub type WriteData = Vec<u8, MAX_WRITE_LEN>;

/// Raw radio event, queued from radio context and handled on the protocol task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// Radio stack finished booting
    Booted,
    ConnectionOpened { conn_handle: u16, bonding_handle: u8 },
    ConnectionClosed { conn_handle: u16, reason: u8 },
    MtuExchanged { conn_handle: u16, mtu: u16 },
    CharacteristicWritten {
        conn_handle: u16,
        char_handle: u16,
        data: WriteData,
    },
    CccdStatusChanged { conn_handle: u16, char_handle: u16, flags: u16 },
    IndicationConfirmed { conn_handle: u16 },
    SoftTimerFired { timer: TimerId },
}

/// Radio event queue shared between radio context and the protocol task
pub type RadioEventQueue<M, const N: usize> = Channel<M, RadioEvent, N>;

/// Callbacks the radio driver invokes, one per event kind
///
/// Methods take `&self` and must not block: they run in the radio's own
/// execution context.
pub trait RadioEventListener {
    fn booted(&self);
    fn connection_opened(&self, conn_handle: u16, bonding_handle: u8);
    fn connection_closed(&self, conn_handle: u16, reason: u8);
    fn mtu_exchanged(&self, conn_handle: u16, mtu: u16);
    fn characteristic_written(&self, conn_handle: u16, char_handle: u16, data: &[u8]);
    fn cccd_status_changed(&self, conn_handle: u16, char_handle: u16, flags: u16);
    fn indication_confirmed(&self, conn_handle: u16);
    fn soft_timer_fired(&self, timer: TimerId);
}

/// Radio-side producer that enqueues every callback onto the event queue
pub struct RadioEventSender<'a, M: RawMutex, const N: usize> {
    sender: Sender<'a, M, RadioEvent, N>,
}

impl<'a, M: RawMutex, const N: usize> RadioEventSender<'a, M, N> {
    pub fn new(queue: &'a RadioEventQueue<M, N>) -> Self {
        Self {
            sender: queue.sender(),
        }
    }

    fn enqueue(&self, event: RadioEvent) {
        if let Err(TrySendError::Full(event)) = self.sender.try_send(event) {
            error!("DISPATCH: Event queue full, dropping {:?}", EventTag::of(&event));
        }
    }
}

impl<'a, M: RawMutex, const N: usize> Clone for RadioEventSender<'a, M, N> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<'a, M: RawMutex, const N: usize> RadioEventListener for RadioEventSender<'a, M, N> {
    fn booted(&self) {
        self.enqueue(RadioEvent::Booted);
    }

    fn connection_opened(&self, conn_handle: u16, bonding_handle: u8) {
        self.enqueue(RadioEvent::ConnectionOpened {
            conn_handle,
            bonding_handle,
        });
    }

    fn connection_closed(&self, conn_handle: u16, reason: u8) {
        self.enqueue(RadioEvent::ConnectionClosed { conn_handle, reason });
    }

    fn mtu_exchanged(&self, conn_handle: u16, mtu: u16) {
        self.enqueue(RadioEvent::MtuExchanged { conn_handle, mtu });
    }

    fn characteristic_written(&self, conn_handle: u16, char_handle: u16, data: &[u8]) {
        let Ok(data) = WriteData::from_slice(data) else {
            error!(
                "DISPATCH: Dropping {} byte write on connection {} - exceeds {}",
                data.len(),
                conn_handle,
                MAX_WRITE_LEN
            );
            return;
        };
        self.enqueue(RadioEvent::CharacteristicWritten {
            conn_handle,
            char_handle,
            data,
        });
    }

    fn cccd_status_changed(&self, conn_handle: u16, char_handle: u16, flags: u16) {
        self.enqueue(RadioEvent::CccdStatusChanged {
            conn_handle,
            char_handle,
            flags,
        });
    }

    fn indication_confirmed(&self, conn_handle: u16) {
        self.enqueue(RadioEvent::IndicationConfirmed { conn_handle });
    }

    fn soft_timer_fired(&self, timer: TimerId) {
        self.enqueue(RadioEvent::SoftTimerFired { timer });
    }
}

/// Payload-free event kind, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventTag {
    Booted,
    ConnectionOpened,
    ConnectionClosed,
    MtuExchanged,
    CharacteristicWritten,
    CccdStatusChanged,
    IndicationConfirmed,
    SoftTimerFired,
}

impl EventTag {
    pub fn of(event: &RadioEvent) -> Self {
        match event {
            RadioEvent::Booted => EventTag::Booted,
            RadioEvent::ConnectionOpened { .. } => EventTag::ConnectionOpened,
            RadioEvent::ConnectionClosed { .. } => EventTag::ConnectionClosed,
            RadioEvent::MtuExchanged { .. } => EventTag::MtuExchanged,
            RadioEvent::CharacteristicWritten { .. } => EventTag::CharacteristicWritten,
            RadioEvent::CccdStatusChanged { .. } => EventTag::CccdStatusChanged,
            RadioEvent::IndicationConfirmed { .. } => EventTag::IndicationConfirmed,
            RadioEvent::SoftTimerFired { .. } => EventTag::SoftTimerFired,
        }
    }
}

/// Why a CHIPoBLE connection went away or became unusable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionErrorReason {
    /// The central closed the link
    RemoteDisconnect,
    /// The local side closed the link
    LocalDisconnect,
    /// An indication was never confirmed
    ProtocolAbort,
}

/// Advertising activity change reported upward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisingActivity {
    Started,
    Stopped,
}

/// Upper-layer (session/provisioning) view of the CHIPoBLE transport
///
/// Every method has a no-op default so a layer only implements what it uses.
pub trait TransportListener {
    /// Indications were enabled on the TX characteristic
    fn on_subscribe(&mut self, _conn_handle: u16) {}

    /// Indications were disabled on the TX characteristic
    fn on_unsubscribe(&mut self, _conn_handle: u16) {}

    /// Data written to the RX characteristic
    fn on_write_received(&mut self, _conn_handle: u16, _data: &[u8]) {}

    /// The central confirmed the last indication
    fn on_indication_confirmed(&mut self, _conn_handle: u16) {}

    fn on_connection_error(&mut self, _conn_handle: u16, _reason: ConnectionErrorReason) {}

    fn on_advertising_change(&mut self, _activity: AdvertisingActivity) {}

    /// Offered every characteristic write before the manager looks at it,
    /// returning `true` claims the write
    fn intercept_write(&mut self, _conn_handle: u16, _char_handle: u16, _data: &[u8]) -> bool {
        false
    }
}

impl TransportListener for () {}
