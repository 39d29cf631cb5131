//! Advertising Payload
//!
//! Builds the CHIPoBLE advertising and scan response data: flags, the
//! CHIPoBLE service data carrying the device identification block, the
//! device name and the service UUID list.

use core::fmt::Write;

use heapless::{String, Vec};

use crate::ble::gatt::CHIPOBLE_SERVICE_UUID16;
use crate::error::BleError;

/// Maximum advertising data length (BLE specification)
pub const MAX_ADV_DATA_LEN: usize = 31;

/// Maximum device name length
pub const MAX_DEVICE_NAME_LEN: usize = 20;

/// AD type: Flags
pub const AD_TYPE_FLAGS: u8 = 0x01;
/// AD type: Complete List of 16-bit Service UUIDs
pub const AD_TYPE_UUID16_COMPLETE: u8 = 0x03;
/// AD type: Complete Local Name
pub const AD_TYPE_COMPLETE_NAME: u8 = 0x09;
/// AD type: Service Data - 16-bit UUID
pub const AD_TYPE_SERVICE_DATA16: u8 = 0x16;

/// LE General Discoverable Mode | BR/EDR Not Supported
pub const ADV_FLAGS: u8 = 0x06;

/// Device identification opcode for commissionable advertising
pub const DEVICE_ID_OPCODE_COMMISSIONABLE: u8 = 0x00;

/// Advertisement version carried in the upper nibble of the discriminator field
pub const ADVERTISEMENT_VERSION: u8 = 0;

/// Size of the device identification block
pub const DEVICE_ID_INFO_LEN: usize = 8;

/// Device name, either explicit or generated
pub type DeviceName = String<MAX_DEVICE_NAME_LEN>;

/// Raw AD structures handed to the radio
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdvertisingPayload {
    /// Advertising data
    pub adv_data: Vec<u8, MAX_ADV_DATA_LEN>,
    /// Scan response data
    pub scan_response: Vec<u8, MAX_ADV_DATA_LEN>,
}

/// CHIPoBLE device identification block (service data payload)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceIdentification {
    /// 12-bit setup discriminator
    pub discriminator: u16,
    /// Vendor id, zero when redacted
    pub vendor_id: u16,
    /// Product id, zero when redacted
    pub product_id: u16,
    /// Additional data characteristic present
    pub additional_data: bool,
}

impl DeviceIdentification {
    /// Same identification with vendor and product ids hidden
    pub fn redacted(self) -> Self {
        Self {
            vendor_id: 0,
            product_id: 0,
            ..self
        }
    }

    /// Wire encoding, multi-byte fields little endian
    pub fn to_bytes(&self) -> [u8; DEVICE_ID_INFO_LEN] {
        let disc_and_version = (self.discriminator & 0x0FFF) | ((ADVERTISEMENT_VERSION as u16) << 12);
        let disc = disc_and_version.to_le_bytes();
        let vid = self.vendor_id.to_le_bytes();
        let pid = self.product_id.to_le_bytes();

        [
            DEVICE_ID_OPCODE_COMMISSIONABLE,
            disc[0],
            disc[1],
            vid[0],
            vid[1],
            pid[0],
            pid[1],
            self.additional_data as u8,
        ]
    }
}

/// Generate `prefix` + discriminator digits, e.g. `MATTER-3840`
pub fn generated_device_name(prefix: &str, discriminator: u16, suffix_len: u8) -> Result<DeviceName, BleError> {
    let mut name = DeviceName::new();
    name.push_str(prefix).map_err(|_| BleError::InvalidLength)?;

    if suffix_len > 0 {
        let modulus = 10u32.pow(suffix_len as u32);
        let suffix = discriminator as u32 % modulus;
        write!(name, "{:0width$}", suffix, width = suffix_len as usize).map_err(|_| BleError::InvalidLength)?;
    }

    Ok(name)
}

/// Copy an explicit device name, enforcing the length limit
pub fn device_name_from(name: &str) -> Result<DeviceName, BleError> {
    let mut out = DeviceName::new();
    out.push_str(name).map_err(|_| BleError::InvalidLength)?;
    Ok(out)
}

/// Build the advertising and scan response data
pub fn build_payload(id: &DeviceIdentification, device_name: &str) -> Result<AdvertisingPayload, BleError> {
    let mut payload = AdvertisingPayload::default();

    let uuid = CHIPOBLE_SERVICE_UUID16.to_le_bytes();

    push_ad(&mut payload.adv_data, AD_TYPE_FLAGS, &[ADV_FLAGS])?;

    let mut service_data: Vec<u8, { 2 + DEVICE_ID_INFO_LEN }> = Vec::new();
    service_data
        .extend_from_slice(&uuid)
        .map_err(|_| BleError::InvalidLength)?;
    service_data
        .extend_from_slice(&id.to_bytes())
        .map_err(|_| BleError::InvalidLength)?;
    push_ad(&mut payload.adv_data, AD_TYPE_SERVICE_DATA16, &service_data)?;

    push_ad(&mut payload.scan_response, AD_TYPE_COMPLETE_NAME, device_name.as_bytes())?;
    push_ad(&mut payload.scan_response, AD_TYPE_UUID16_COMPLETE, &uuid)?;

    Ok(payload)
}

/// Append one length/type/value AD structure
fn push_ad(buffer: &mut Vec<u8, MAX_ADV_DATA_LEN>, ad_type: u8, data: &[u8]) -> Result<(), BleError> {
    // Length byte covers the type byte plus data
    if data.len() + 2 > buffer.capacity() - buffer.len() {
        return Err(BleError::InvalidLength);
    }
    buffer
        .push((data.len() + 1) as u8)
        .map_err(|_| BleError::InvalidLength)?;
    buffer.push(ad_type).map_err(|_| BleError::InvalidLength)?;
    buffer.extend_from_slice(data).map_err(|_| BleError::InvalidLength)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identification() -> DeviceIdentification {
        DeviceIdentification {
            discriminator: 0x0F00,
            vendor_id: 0xFFF1,
            product_id: 0x8000,
            additional_data: false,
        }
    }

    #[test]
    fn test_device_identification_encoding() {
        assert_eq!(
            identification().to_bytes(),
            [0x00, 0x00, 0x0F, 0xF1, 0xFF, 0x00, 0x80, 0x00]
        );

        let with_flag = DeviceIdentification {
            additional_data: true,
            ..identification()
        };
        assert_eq!(with_flag.to_bytes()[7], 0x01);
    }

    #[test]
    fn test_redaction_hides_vendor_and_product() {
        let bytes = identification().redacted().to_bytes();
        assert_eq!(&bytes[3..7], &[0, 0, 0, 0]);
        assert_eq!(&bytes[1..3], &[0x00, 0x0F]);
    }

    #[test]
    fn test_payload_layout() {
        let payload = build_payload(&identification(), "MATTER-3840").unwrap();

        assert_eq!(
            payload.adv_data.as_slice(),
            &[
                0x02, 0x01, 0x06, // flags
                0x0B, 0x16, 0xF6, 0xFF, // service data header
                0x00, 0x00, 0x0F, 0xF1, 0xFF, 0x00, 0x80, 0x00,
            ]
        );

        let scan = payload.scan_response.as_slice();
        assert_eq!(scan[0], 12);
        assert_eq!(scan[1], AD_TYPE_COMPLETE_NAME);
        assert_eq!(&scan[2..13], b"MATTER-3840");
        assert_eq!(&scan[13..], &[0x03, 0x03, 0xF6, 0xFF]);
    }

    #[test]
    fn test_payload_rejects_oversized_name() {
        let name = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
        assert_eq!(build_payload(&identification(), name), Err(BleError::InvalidLength));
    }

    #[test]
    fn test_generated_device_name() {
        assert_eq!(generated_device_name("MATTER-", 3840, 4).unwrap().as_str(), "MATTER-3840");
        assert_eq!(generated_device_name("MATTER-", 42, 4).unwrap().as_str(), "MATTER-0042");
        assert_eq!(generated_device_name("CHIP-", 3840, 2).unwrap().as_str(), "CHIP-40");
        assert_eq!(generated_device_name("NODE", 3840, 0).unwrap().as_str(), "NODE");
    }

    #[test]
    fn test_explicit_device_name_limit() {
        assert!(device_name_from("Kitchen Light").is_ok());
        assert_eq!(
            device_name_from("a name that is far too long"),
            Err(BleError::InvalidLength)
        );
    }
}
