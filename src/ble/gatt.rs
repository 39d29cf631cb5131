//! CHIPoBLE GATT Constants
//!
//! UUIDs of the CHIPoBLE service and its characteristics, and CCCD flag bits.
//! The GATT table itself is compiled by the radio vendor tooling; the manager
//! only needs to recognise the value handles it is configured with.

/// CHIPoBLE service UUID (16-bit, Bluetooth SIG assigned)
pub const CHIPOBLE_SERVICE_UUID16: u16 = 0xFFF6;

/// C1: client → server writes (`18EE2EF5-263D-4559-959F-4F9C429F9D11`), little endian
pub const CHIPOBLE_RX_CHAR_UUID: [u8; 16] = [
    0x11, 0x9D, 0x9F, 0x42, 0x9C, 0x4F, 0x9F, 0x95, 0x59, 0x45, 0x3D, 0x26, 0xF5, 0x2E, 0xEE, 0x18,
];

/// C2: server → client indications (`18EE2EF5-263D-4559-959F-4F9C429F9D12`), little endian
pub const CHIPOBLE_TX_CHAR_UUID: [u8; 16] = [
    0x12, 0x9D, 0x9F, 0x42, 0x9C, 0x4F, 0x9F, 0x95, 0x59, 0x45, 0x3D, 0x26, 0xF5, 0x2E, 0xEE, 0x18,
];

/// CCCD notification enable bit
pub const CCCD_NOTIFY: u16 = 0x0001;

/// CCCD indication enable bit
pub const CCCD_INDICATE: u16 = 0x0002;

/// Default ATT MTU before an exchange has happened
pub const DEFAULT_ATT_MTU: u16 = 23;

/// ATT header bytes carried by every handle value indication
pub const ATT_INDICATION_OVERHEAD: u16 = 3;

/// Largest characteristic write the event queue carries (ATT MTU 247 - 3)
pub const MAX_WRITE_LEN: usize = 244;

/// HCI disconnect reason: connection terminated by local host
pub const HCI_LOCAL_HOST_TERMINATED: u8 = 0x16;

/// HCI disconnect reason: remote user terminated connection
pub const HCI_REMOTE_USER_TERMINATED: u8 = 0x13;

/// Whether a CCCD value has indications enabled
pub const fn indications_enabled(cccd: u16) -> bool {
    cccd & CCCD_INDICATE != 0
}

/// Payload capacity of one indication on a link with the given ATT MTU
pub const fn max_indication_len(mtu: u16) -> usize {
    let mtu = if mtu == 0 { DEFAULT_ATT_MTU } else { mtu };
    mtu.saturating_sub(ATT_INDICATION_OVERHEAD) as usize
}
