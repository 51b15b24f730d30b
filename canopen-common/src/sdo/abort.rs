//! CiA 301 SDO abort codes.

use std::fmt;

/// A 32-bit SDO abort code as carried in bytes 4..8 of an abort frame.
///
/// The named constants are the standardized values. Codes received from a
/// peer are kept verbatim, even when they are not in the table, so an abort is
/// reconstructed identically on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AbortCode(pub u32);

impl AbortCode {
    pub const TOGGLE_NOT_ALTERNATED: Self = Self(0x0503_0000);
    pub const TIMEOUT: Self = Self(0x0504_0000);
    pub const INVALID_COMMAND: Self = Self(0x0504_0001);
    pub const INVALID_BLOCK_SIZE: Self = Self(0x0504_0002);
    pub const INVALID_SEQUENCE_NUMBER: Self = Self(0x0504_0003);
    pub const CRC_ERROR: Self = Self(0x0504_0004);
    pub const OUT_OF_MEMORY: Self = Self(0x0504_0005);
    pub const UNSUPPORTED_ACCESS: Self = Self(0x0601_0000);
    pub const READ_OF_WRITE_ONLY: Self = Self(0x0601_0001);
    pub const WRITE_OF_READ_ONLY: Self = Self(0x0601_0002);
    pub const OBJECT_DOES_NOT_EXIST: Self = Self(0x0602_0000);
    pub const CANNOT_MAP_TO_PDO: Self = Self(0x0604_0041);
    pub const PDO_TOO_LONG: Self = Self(0x0604_0042);
    pub const PARAMETER_INCOMPATIBLE: Self = Self(0x0604_0043);
    pub const INTERNAL_INCOMPATIBILITY: Self = Self(0x0604_0047);
    pub const HARDWARE_ERROR: Self = Self(0x0606_0000);
    pub const LENGTH_MISMATCH: Self = Self(0x0607_0010);
    pub const LENGTH_TOO_HIGH: Self = Self(0x0607_0012);
    pub const LENGTH_TOO_LOW: Self = Self(0x0607_0013);
    pub const SUBINDEX_DOES_NOT_EXIST: Self = Self(0x0609_0011);
    pub const INVALID_VALUE: Self = Self(0x0609_0030);
    pub const VALUE_TOO_HIGH: Self = Self(0x0609_0031);
    pub const VALUE_TOO_LOW: Self = Self(0x0609_0032);
    pub const MAX_LESS_THAN_MIN: Self = Self(0x0609_0036);
    pub const RESOURCE_NOT_AVAILABLE: Self = Self(0x060A_0023);
    pub const GENERAL_ERROR: Self = Self(0x0800_0000);
    pub const CANNOT_STORE: Self = Self(0x0800_0020);
    pub const CANNOT_STORE_LOCAL_CONTROL: Self = Self(0x0800_0021);
    pub const CANNOT_STORE_DEVICE_STATE: Self = Self(0x0800_0022);
    pub const NO_OBJECT_DICTIONARY: Self = Self(0x0800_0023);
    pub const NO_DATA_AVAILABLE: Self = Self(0x0800_0024);

    pub const fn code(self) -> u32 {
        self.0
    }

    /// Human-readable meaning of the code, `None` for codes outside the table.
    pub fn description(self) -> Option<&'static str> {
        let text = match self {
            Self::TOGGLE_NOT_ALTERNATED => "Toggle bit not alternated",
            Self::TIMEOUT => "SDO protocol timed out",
            Self::INVALID_COMMAND => "Client/server command specifier not valid or unknown",
            Self::INVALID_BLOCK_SIZE => "Invalid block size",
            Self::INVALID_SEQUENCE_NUMBER => "Invalid sequence number",
            Self::CRC_ERROR => "CRC error",
            Self::OUT_OF_MEMORY => "Out of memory",
            Self::UNSUPPORTED_ACCESS => "Unsupported access to an object",
            Self::READ_OF_WRITE_ONLY => "Attempt to read a write only object",
            Self::WRITE_OF_READ_ONLY => "Attempt to write a read only object",
            Self::OBJECT_DOES_NOT_EXIST => "Object does not exist in the object dictionary",
            Self::CANNOT_MAP_TO_PDO => "Object cannot be mapped to the PDO",
            Self::PDO_TOO_LONG => {
                "The number and length of the objects to be mapped would exceed PDO length"
            }
            Self::PARAMETER_INCOMPATIBLE => "General parameter incompatibility reason",
            Self::INTERNAL_INCOMPATIBILITY => "General internal incompatibility in the device",
            Self::HARDWARE_ERROR => "Access failed due to a hardware error",
            Self::LENGTH_MISMATCH => {
                "Data type does not match, length of service parameter does not match"
            }
            Self::LENGTH_TOO_HIGH => "Data type does not match, length of service parameter too high",
            Self::LENGTH_TOO_LOW => "Data type does not match, length of service parameter too low",
            Self::SUBINDEX_DOES_NOT_EXIST => "Sub-index does not exist",
            Self::INVALID_VALUE => "Value range of parameter exceeded (only for write access)",
            Self::VALUE_TOO_HIGH => "Value of parameter written too high",
            Self::VALUE_TOO_LOW => "Value of parameter written too low",
            Self::MAX_LESS_THAN_MIN => "Maximum value is less than minimum value",
            Self::RESOURCE_NOT_AVAILABLE => "Resource not available: SDO connection",
            Self::GENERAL_ERROR => "General error",
            Self::CANNOT_STORE => "Data cannot be transferred or stored to the application",
            Self::CANNOT_STORE_LOCAL_CONTROL => {
                "Data cannot be transferred or stored to the application because of local control"
            }
            Self::CANNOT_STORE_DEVICE_STATE => {
                "Data cannot be transferred or stored to the application because of the present device state"
            }
            Self::NO_OBJECT_DICTIONARY => {
                "Object dictionary dynamic generation fails or no object dictionary is present"
            }
            Self::NO_DATA_AVAILABLE => "No data available",
            _ => return None,
        };
        Some(text)
    }

    pub fn protocol_related(self) -> bool {
        self.0 >> 24 == 0x05
    }

    pub fn object_related(self) -> bool {
        self.0 >> 24 == 0x06
    }

    pub fn device_related(self) -> bool {
        self.0 >> 24 == 0x08
    }
}

impl From<u32> for AbortCode {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

impl From<AbortCode> for u32 {
    fn from(code: AbortCode) -> Self {
        code.0
    }
}

impl fmt::Display for AbortCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(text) => write!(f, "0x{:08X} ({})", self.0, text),
            None => write!(f, "0x{:08X} (Unknown abort code)", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_are_fixed() {
        assert_eq!(AbortCode::TOGGLE_NOT_ALTERNATED.code(), 0x0503_0000);
        assert_eq!(AbortCode::TIMEOUT.code(), 0x0504_0000);
        assert_eq!(AbortCode::OBJECT_DOES_NOT_EXIST.code(), 0x0602_0000);
        assert_eq!(AbortCode::SUBINDEX_DOES_NOT_EXIST.code(), 0x0609_0011);
        assert_eq!(AbortCode::READ_OF_WRITE_ONLY.code(), 0x0601_0001);
        assert_eq!(AbortCode::WRITE_OF_READ_ONLY.code(), 0x0601_0002);
    }

    #[test]
    fn unknown_codes_survive() {
        let code = AbortCode::from(0x1234_5678);
        assert_eq!(code.description(), None);
        assert_eq!(u32::from(code), 0x1234_5678);
        assert_eq!(code.to_string(), "0x12345678 (Unknown abort code)");
    }

    #[test]
    fn categories() {
        assert!(AbortCode::TIMEOUT.protocol_related());
        assert!(AbortCode::SUBINDEX_DOES_NOT_EXIST.object_related());
        assert!(AbortCode::NO_DATA_AVAILABLE.device_related());
    }
}
