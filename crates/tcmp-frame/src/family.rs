//! Command families and reserved response codes.
//!
//! The family is a 2-byte big-endian identifier of the reader subsystem a
//! command or response belongs to. Unknown families are valid on the wire.

use std::fmt;

/// Response code reserved in every family for application-level errors.
pub const APPLICATION_ERROR: u8 = 0x7F;

/// Identifies the reader subsystem a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandFamily(u16);

impl CommandFamily {
    /// Reader housekeeping (ping, firmware version, configuration).
    pub const SYSTEM: CommandFamily = CommandFamily(0x0000);
    /// Tag detection and NDEF read/write.
    pub const BASIC_NFC: CommandFamily = CommandFamily(0x0001);
    /// MIFARE Classic sector access.
    pub const MIFARE_CLASSIC: CommandFamily = CommandFamily(0x0002);
    /// ISO 14443-4 (Type 4) APDU exchange.
    pub const TYPE4: CommandFamily = CommandFamily(0x0004);
    /// NTAG 21x password protection.
    pub const NTAG21X: CommandFamily = CommandFamily(0x0006);

    /// Create a family from its numeric value.
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Create a family from its two wire bytes.
    pub const fn from_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }

    /// The two wire bytes, big-endian.
    pub const fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// Numeric value of the family.
    pub const fn value(self) -> u16 {
        self.0
    }
}

impl From<u16> for CommandFamily {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for CommandFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x} ({})", self.0, family_name(*self))
    }
}

/// Returns a human-readable name for a command family.
pub fn family_name(family: CommandFamily) -> &'static str {
    match family {
        CommandFamily::SYSTEM => "SYSTEM",
        CommandFamily::BASIC_NFC => "BASIC_NFC",
        CommandFamily::MIFARE_CLASSIC => "MIFARE_CLASSIC",
        CommandFamily::TYPE4 => "TYPE4",
        CommandFamily::NTAG21X => "NTAG21X",
        _ => "UNKNOWN",
    }
}

/// Returns true if `code` is the reserved application-error response code.
pub fn is_application_error(code: u8) -> bool {
    code == APPLICATION_ERROR
}
