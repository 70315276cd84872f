//! Bluetooth device addresses

use core::fmt;
use core::str::FromStr;
use thiserror::Error;

/// Reasons a device address string is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Not six colon separated groups
    #[error("expected 6 colon-separated bytes, got {0}")]
    WrongLength(usize),

    /// A group is not a two digit hex number
    #[error("invalid byte '{0}'")]
    InvalidByte(String),
}

/// 48-bit Bluetooth device address
///
/// Stored most significant byte first, the way it is written
/// (`c4:64:e3:64:0a:5a`). The kernel wants the reverse order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr([u8; 6]);

impl BdAddr {
    /// Address from bytes in written order
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Bytes in written order
    pub const fn bytes(&self) -> [u8; 6] {
        self.0
    }

    /// Bytes in the little-endian order used by `bdaddr_t`
    pub fn to_le_bytes(&self) -> [u8; 6] {
        let mut out = self.0;
        out.reverse();
        out
    }
}

impl FromStr for BdAddr {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 6 {
            return Err(AddressError::WrongLength(parts.len()));
        }
        let mut bytes = [0u8; 6];
        for (slot, part) in bytes.iter_mut().zip(&parts) {
            if part.len() != 2 {
                return Err(AddressError::InvalidByte(part.to_string()));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| AddressError::InvalidByte(part.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}
