// Provisioning Configuration Module
// Fixed device identity and session security handed to the controller at
// startup; nothing in here changes after boot.

use uuid::{uuid, Uuid};

// Identity advertised while the device waits for credentials
const DEFAULT_DEVICE_NAME: &str = "ESP32-BLE-Prov";
const DEFAULT_PROOF_OF_POSSESSION: &str = "abcd1234";

// Service UUID that BLE clients use to discover the provisioning service
const PROVISIONING_SERVICE_UUID: Uuid = uuid!("12345678-90ab-cdef-fedc-ba0987654321");

/// Transport security applied to the provisioning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityLevel {
    /// Plaintext session, development use only
    NoSecurity,
    /// Encrypted session authenticated by a proof-of-possession secret
    ProofOfPossession,
}

/// Immutable provisioning identity, built once in main and passed by value
/// into the controller.
#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    pub device_name: String,
    pub proof_of_possession: String,
    pub service_uuid: Uuid,
    pub security: SecurityLevel,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            proof_of_possession: DEFAULT_PROOF_OF_POSSESSION.to_string(),
            service_uuid: PROVISIONING_SERVICE_UUID,
            security: SecurityLevel::ProofOfPossession,
        }
    }
}

impl ProvisioningConfig {
    /// Service UUID in the byte order the BLE scheme expects.
    /// ESP-IDF takes 128-bit UUIDs least-significant byte first.
    pub fn service_uuid_le(&self) -> [u8; 16] {
        let mut bytes = *self.service_uuid.as_bytes();
        bytes.reverse();
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_identity_is_complete() {
        let config = ProvisioningConfig::default();
        assert!(!config.device_name.is_empty());
        assert!(config.proof_of_possession.len() >= 8);
        assert_eq!(config.security, SecurityLevel::ProofOfPossession);
    }

    #[test]
    fn service_uuid_is_reversed_for_ble() {
        let config = ProvisioningConfig::default();
        let bytes = config.service_uuid_le();
        // LSB-first rendering of 12345678-90ab-cdef-fedc-ba0987654321
        assert_eq!(
            bytes,
            [
                0x21, 0x43, 0x65, 0x87, 0x09, 0xba, 0xdc, 0xfe, 0xef, 0xcd, 0xab, 0x90, 0x78,
                0x56, 0x34, 0x12,
            ]
        );
        assert_eq!(bytes[15], config.service_uuid.as_bytes()[0]);
    }
}
