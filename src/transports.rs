//! Transport registration and connection setup

use crate::cli::TransportKind;
use crate::config::Settings;
use bt122_ota_core::error::Result;
use bt122_ota_core::{BoxedTransport, Session};
use bt122_ota_rfcomm::{RfcommTarget, RfcommTransport};
use bt122_ota_serial::{SerialConfig, SerialTransport};

/// Information about a transport
pub struct TransportInfo {
    /// Name used on the command line and in the configuration
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
}

/// All transports compiled in
pub fn available_transports() -> Vec<TransportInfo> {
    vec![
        TransportInfo {
            name: "rfcomm",
            description: "Bluetooth RFCOMM socket (--target <mac> --channel <n>), Linux only",
        },
        TransportInfo {
            name: "serial",
            description: "Serial port, 8N1 without flow control (--port <dev> --baud <rate>)",
        },
    ]
}

/// Help text listing the transports
pub fn transport_help() -> String {
    let mut help = String::from("Available transports:\n");
    for t in available_transports() {
        help.push_str(&format!("  {:8} - {}\n", t.name, t.description));
    }
    help
}

/// Open the transport selected in `settings`
pub fn connect(settings: &Settings) -> Result<BoxedTransport> {
    match settings.transport {
        TransportKind::Rfcomm => {
            let target = RfcommTarget {
                address: settings.target_address,
                channel: settings.rfcomm_channel,
                service: Some(settings.service_identifier.clone()),
                timeout: settings.timeout,
            };
            log::info!(
                "Connecting to {} (service {}, channel {})...",
                target.address,
                settings.service_identifier,
                target.channel
            );
            Ok(Box::new(RfcommTransport::open(&target)?))
        }
        TransportKind::Serial => {
            let config = SerialConfig {
                device: settings.serial_port.clone(),
                baud: settings.baud_rate,
                timeout: settings.timeout,
            };
            log::info!("Opening {} at {} baud...", config.device, config.baud);
            Ok(Box::new(SerialTransport::open(&config)?))
        }
    }
}

/// Open a session holding the configured connection
pub fn open_session(settings: &Settings) -> Result<Session> {
    let mut session = Session::new();
    session.open(|| connect(settings))?;
    Ok(session)
}
