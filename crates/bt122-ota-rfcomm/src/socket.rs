//! Linux RFCOMM socket

use crate::address::BdAddr;
use bt122_ota_core::error::{OtaError, Result};
use bt122_ota_core::Transport;
use nix::sys::socket::{setsockopt, shutdown, sockopt, Shutdown};
use nix::sys::time::{TimeVal, TimeValLike};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

/// `BTPROTO_RFCOMM` from `<bluetooth/bluetooth.h>`
const BTPROTO_RFCOMM: libc::c_int = 3;

/// `struct sockaddr_rc` from `<bluetooth/rfcomm.h>`
#[repr(C)]
struct SockaddrRc {
    rc_family: libc::sa_family_t,
    rc_bdaddr: [u8; 6],
    rc_channel: u8,
}

/// Connected RFCOMM stream
pub struct RfcommSocket {
    stream: File,
    address: BdAddr,
    channel: u8,
}

impl RfcommSocket {
    /// Connect to `channel` on `address`
    pub fn connect(address: BdAddr, channel: u8, timeout: Duration) -> Result<Self> {
        // SAFETY: plain socket(2) call, the result is checked before use
        let raw = unsafe {
            libc::socket(
                libc::AF_BLUETOOTH,
                libc::SOCK_STREAM | libc::SOCK_CLOEXEC,
                BTPROTO_RFCOMM,
            )
        };
        if raw < 0 {
            return Err(OtaError::Connection(format!(
                "failed to create RFCOMM socket: {}",
                io::Error::last_os_error()
            )));
        }
        // SAFETY: `raw` is a freshly created descriptor that nothing else owns
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let addr = SockaddrRc {
            rc_family: libc::AF_BLUETOOTH as libc::sa_family_t,
            rc_bdaddr: address.to_le_bytes(),
            rc_channel: channel,
        };
        log::debug!("rfcomm: connecting to {} channel {}", address, channel);
        // SAFETY: `addr` is a valid sockaddr_rc that outlives the call
        let ret = unsafe {
            libc::connect(
                fd.as_raw_fd(),
                &addr as *const SockaddrRc as *const libc::sockaddr,
                std::mem::size_of::<SockaddrRc>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(OtaError::Connection(format!(
                "failed to connect to {} channel {}: {}",
                address,
                channel,
                io::Error::last_os_error()
            )));
        }

        let tv = TimeVal::milliseconds(timeout.as_millis().min(i64::MAX as u128) as i64);
        setsockopt(&fd, sockopt::ReceiveTimeout, &tv)
            .map_err(|e| OtaError::Connection(format!("failed to set read timeout: {}", e)))?;
        setsockopt(&fd, sockopt::SendTimeout, &tv)
            .map_err(|e| OtaError::Connection(format!("failed to set write timeout: {}", e)))?;

        log::info!("Connected to {} on RFCOMM channel {}", address, channel);

        Ok(Self {
            stream: File::from(fd),
            address,
            channel,
        })
    }
}

impl Transport for RfcommSocket {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data)?;
        Ok(())
    }

    fn recv_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.stream.read(buf)?)
    }

    fn close(&mut self) -> Result<()> {
        match shutdown(self.stream.as_raw_fd(), Shutdown::Both) {
            Ok(()) | Err(nix::errno::Errno::ENOTCONN) => Ok(()),
            Err(e) => Err(OtaError::Transport(e.into())),
        }
    }

    fn describe(&self) -> String {
        format!("{} (RFCOMM channel {})", self.address, self.channel)
    }
}
