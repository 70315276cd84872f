//! 24-bit flash addresses

use crate::error::{OtaError, Result};
use core::fmt;

/// Address into the module's external flash
///
/// Always fits in three bytes and goes on the wire big-endian.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlashAddress(u32);

impl FlashAddress {
    /// Largest value representable in three bytes, plus one
    pub const LIMIT: u32 = 1 << 24;

    /// Create an address, rejecting values that need more than 24 bits
    pub fn new(addr: u32) -> Result<Self> {
        if addr >= Self::LIMIT {
            return Err(OtaError::InvalidParameter(format!(
                "address 0x{:X} does not fit in 24 bits",
                addr
            )));
        }
        Ok(Self(addr))
    }

    /// Create an address that must also lie inside a flash of `capacity` bytes
    pub fn within(addr: u32, capacity: u32) -> Result<Self> {
        let address = Self::new(addr)?;
        if addr >= capacity {
            return Err(OtaError::InvalidParameter(format!(
                "address 0x{:06X} is beyond flash capacity 0x{:06X}",
                addr, capacity
            )));
        }
        Ok(address)
    }

    /// Numeric value
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Big-endian wire encoding
    pub const fn to_bytes(self) -> [u8; 3] {
        [(self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8]
    }

    /// Address `offset` bytes further on
    pub fn offset(self, offset: u32) -> Result<Self> {
        let next = self
            .0
            .checked_add(offset)
            .ok_or_else(|| OtaError::InvalidParameter("address overflow".into()))?;
        Self::new(next)
    }
}

impl TryFrom<u32> for FlashAddress {
    type Error = OtaError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<usize> for FlashAddress {
    type Error = OtaError;

    fn try_from(value: usize) -> Result<Self> {
        let value = u32::try_from(value).map_err(|_| {
            OtaError::InvalidParameter(format!("address 0x{:X} does not fit in 24 bits", value))
        })?;
        Self::new(value)
    }
}

impl fmt::Display for FlashAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_encoding() {
        let addr = FlashAddress::new(0xABCDEF).unwrap();
        assert_eq!(addr.to_bytes(), [0xAB, 0xCD, 0xEF]);
        assert_eq!(FlashAddress::new(0x20).unwrap().to_bytes(), [0, 0, 0x20]);
    }

    #[test]
    fn test_rejects_wide_addresses() {
        assert!(FlashAddress::new(0xFF_FFFF).is_ok());
        assert!(FlashAddress::new(0x100_0000).is_err());
        assert!(FlashAddress::try_from(usize::MAX).is_err());
    }

    #[test]
    fn test_within_capacity() {
        assert!(FlashAddress::within(255_999, 256_000).is_ok());
        assert!(FlashAddress::within(256_000, 256_000).is_err());
    }

    #[test]
    fn test_offset_and_display() {
        let addr = FlashAddress::new(0x40).unwrap().offset(0x40).unwrap();
        assert_eq!(addr.to_string(), "0x000080");
        assert!(FlashAddress::new(0xFF_FFF0).unwrap().offset(0x10).is_err());
    }
}
