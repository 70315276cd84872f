//! Control opcodes understood by the BT122 SPI script
//!
//! The byte values mirror the dispatch table of the `spi_script.bgs` BGScript
//! running on the module. There is no negotiation, so a mismatch between this
//! table and the script shows up as garbage responses rather than an error.

use crate::error::OtaError;
use core::fmt;

/// Control opcode sent as the first byte of every control frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlOpcode {
    /// Echo the payload back
    Echo = 0x00,
    /// Read from external flash
    Read = 0x01,
    /// Page write to external flash
    PageWrite = 0x02,
    /// Erase a flash block
    BlockErase = 0x03,
    /// Drive the status LED on
    LedOn = 0x04,
    /// Drive the status LED off
    LedOff = 0x05,
    /// Erase the whole flash chip
    ChipErase = 0x06,
    /// Read the flash status register
    ReadStatusRegister = 0x07,
    /// Set the flash write enable latch
    WriteEnable = 0x08,
    /// Reboot the module into DFU boot mode
    DfuReset = 0x09,
}

impl ControlOpcode {
    /// All opcodes in dispatch table order
    pub const ALL: [ControlOpcode; 10] = [
        Self::Echo,
        Self::Read,
        Self::PageWrite,
        Self::BlockErase,
        Self::LedOn,
        Self::LedOff,
        Self::ChipErase,
        Self::ReadStatusRegister,
        Self::WriteEnable,
        Self::DfuReset,
    ];

    /// Wire value
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Short mnemonic used by the module's script
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Echo => "ECHO",
            Self::Read => "READ",
            Self::PageWrite => "PGWR",
            Self::BlockErase => "BKER",
            Self::LedOn => "LEDON",
            Self::LedOff => "LEDOFF",
            Self::ChipErase => "CHER",
            Self::ReadStatusRegister => "RDSR",
            Self::WriteEnable => "WREN",
            Self::DfuReset => "DFUR",
        }
    }
}

impl TryFrom<u8> for ControlOpcode {
    type Error = OtaError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.byte() == value)
            .ok_or_else(|| OtaError::Protocol(format!("unknown control opcode 0x{:02X}", value)))
    }
}

impl From<ControlOpcode> for u8 {
    fn from(op: ControlOpcode) -> u8 {
        op.byte()
    }
}

impl fmt::Display for ControlOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.mnemonic(), self.byte())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_table_values() {
        assert_eq!(ControlOpcode::Echo.byte(), 0);
        assert_eq!(ControlOpcode::Read.byte(), 1);
        assert_eq!(ControlOpcode::PageWrite.byte(), 2);
        assert_eq!(ControlOpcode::ChipErase.byte(), 6);
        assert_eq!(ControlOpcode::DfuReset.byte(), 9);
    }

    #[test]
    fn test_try_from() {
        for op in ControlOpcode::ALL {
            assert_eq!(ControlOpcode::try_from(op.byte()).unwrap(), op);
        }
        assert!(matches!(
            ControlOpcode::try_from(0x0A),
            Err(OtaError::Protocol(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(ControlOpcode::WriteEnable.to_string(), "WREN (0x08)");
    }
}
