//! bt122-ota-rfcomm - Bluetooth RFCOMM transport
//!
//! Connects straight to an RFCOMM channel on the module using a raw
//! `AF_BLUETOOTH` socket. Only available on Linux (BlueZ); elsewhere
//! [`RfcommTransport::open`] reports a connection error.
//!
//! The module's services are normally located with an SDP query on their
//! UUID. That lookup is not performed here: the channel it would return is
//! part of [`RfcommTarget`] and the UUID is kept for logging.

pub mod address;
#[cfg(target_os = "linux")]
mod socket;

pub use address::{AddressError, BdAddr};

use bt122_ota_core::error::Result;
#[cfg(not(target_os = "linux"))]
use bt122_ota_core::error::OtaError;
use bt122_ota_core::Transport;
use std::time::Duration;

/// RFCOMM channel of the module's OTA control service
pub const OTA_CONTROL_CHANNEL: u8 = 7;
/// RFCOMM channel of the module's OTA data service
pub const OTA_DATA_CHANNEL: u8 = 8;

/// Where to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfcommTarget {
    /// Device address
    pub address: BdAddr,
    /// RFCOMM channel (1-30)
    pub channel: u8,
    /// Service UUID the channel belongs to
    pub service: Option<String>,
    /// Read and write timeout
    pub timeout: Duration,
}

impl RfcommTarget {
    /// Target on the OTA control channel with a 5 second timeout
    pub fn new(address: BdAddr) -> Self {
        Self {
            address,
            channel: OTA_CONTROL_CHANNEL,
            service: None,
            timeout: Duration::from_secs(5),
        }
    }
}

/// RFCOMM transport
pub struct RfcommTransport {
    #[cfg(target_os = "linux")]
    inner: socket::RfcommSocket,
}

impl RfcommTransport {
    /// Connect to `target`
    pub fn open(target: &RfcommTarget) -> Result<Self> {
        if let Some(service) = &target.service {
            log::debug!(
                "rfcomm: service {} expected on channel {}",
                service,
                target.channel
            );
        }

        #[cfg(target_os = "linux")]
        {
            if !(1..=30).contains(&target.channel) {
                return Err(bt122_ota_core::OtaError::InvalidParameter(format!(
                    "RFCOMM channel {} outside 1..=30",
                    target.channel
                )));
            }
            let inner = socket::RfcommSocket::connect(target.address, target.channel, target.timeout)?;
            Ok(Self { inner })
        }

        #[cfg(not(target_os = "linux"))]
        {
            Err(OtaError::Connection(format!(
                "RFCOMM sockets are only supported on Linux (target {})",
                target.address
            )))
        }
    }
}

#[cfg(target_os = "linux")]
impl Transport for RfcommTransport {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.inner.send(data)
    }

    fn recv_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.recv_some(buf)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

#[cfg(not(target_os = "linux"))]
impl Transport for RfcommTransport {
    fn send(&mut self, _data: &[u8]) -> Result<()> {
        Err(OtaError::Connection("RFCOMM not supported".into()))
    }

    fn recv_some(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(OtaError::Connection("RFCOMM not supported".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_target() {
        let target = RfcommTarget::new("c4:64:e3:64:0a:5a".parse().unwrap());
        assert_eq!(target.channel, OTA_CONTROL_CHANNEL);
        assert_eq!(target.timeout, Duration::from_secs(5));
        assert!(target.service.is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_invalid_channel_rejected_before_connect() {
        let target = RfcommTarget {
            channel: 0,
            ..RfcommTarget::new("00:00:00:00:00:00".parse().unwrap())
        };
        assert!(matches!(
            RfcommTransport::open(&target),
            Err(bt122_ota_core::OtaError::InvalidParameter(_))
        ));
    }
}
