//! bt122-ota-serial - Serial port transport
//!
//! Talks to the module (or the STM32 host in front of it) over a UART,
//! typically through a USB adapter such as `/dev/ttyUSB0` or `COM9`.
//!
//! # Example
//!
//! ```no_run
//! use bt122_ota_serial::{SerialConfig, SerialTransport};
//! use bt122_ota_core::Transport;
//!
//! let mut port = SerialTransport::open(&SerialConfig::new("/dev/ttyUSB0"))?;
//! port.send(&[0x01, 0x02])?;
//! let reply = port.recv(2)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use bt122_ota_core::error::{OtaError, Result};
use bt122_ota_core::Transport;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;

/// Baud rate the receiver firmware is configured for
pub const DEFAULT_BAUD: u32 = 115_200;

/// Default read timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Serial port settings
///
/// Framing is always 8N1 without flow control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path or COM port name
    pub device: String,
    /// Baud rate
    pub baud: u32,
    /// Read timeout
    pub timeout: Duration,
}

impl SerialConfig {
    /// Settings for `device` with default baud and timeout
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            baud: DEFAULT_BAUD,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Serial port transport
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    device: String,
}

impl SerialTransport {
    /// Open and configure a serial port
    pub fn open(config: &SerialConfig) -> Result<Self> {
        if config.baud == 0 {
            return Err(OtaError::InvalidParameter("baud rate must be non-zero".into()));
        }

        let port = serialport::new(&config.device, config.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.timeout)
            .open()
            .map_err(|e| {
                OtaError::Connection(format!("failed to open {}: {}", config.device, e))
            })?;

        log::info!("Opened serial port {} at {} baud", config.device, config.baud);
        Self::from_port(port, &config.device)
    }

    /// Wrap an already configured port, dropping whatever it has buffered
    ///
    /// Bytes left over from an earlier session would otherwise be taken as
    /// the first response.
    pub fn from_port(port: Box<dyn SerialPort>, device: &str) -> Result<Self> {
        let mut transport = Self {
            port,
            device: device.to_string(),
        };
        transport.clear()?;
        Ok(transport)
    }

    /// Discard anything already buffered in either direction
    fn clear(&mut self) -> Result<()> {
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(|e| OtaError::Transport(e.into()))
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        Ok(())
    }

    fn recv_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.port.read(buf)?)
    }

    fn flush(&mut self) -> Result<()> {
        self.port.flush()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("serial port {}", self.device)
    }
}

/// Names of serial ports present on this machine
pub fn available_ports() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            log::warn!("Failed to enumerate serial ports: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SerialConfig::new("COM9");
        assert_eq!(config.device, "COM9");
        assert_eq!(config.baud, 115_200);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_baud_rejected() {
        let config = SerialConfig {
            baud: 0,
            ..SerialConfig::new("/dev/null")
        };
        assert!(matches!(
            SerialTransport::open(&config),
            Err(OtaError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_missing_port_is_connection_error() {
        let config = SerialConfig::new("/dev/bt122-ota-does-not-exist");
        assert!(matches!(
            SerialTransport::open(&config),
            Err(OtaError::Connection(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_input_is_discarded_on_open() {
        use serialport::TTYPort;

        let (mut master, mut slave) = TTYPort::pair().unwrap();
        slave.set_timeout(Duration::from_secs(1)).unwrap();
        master.write_all(b"stale\n").unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let mut transport = SerialTransport::from_port(Box::new(slave), "pty").unwrap();
        master.write_all(&[0x42, b'\n']).unwrap();
        assert_eq!(transport.recv(2).unwrap(), vec![0x42, b'\n']);
    }
}
