//! CLI argument parsing

use bt122_ota_core::VerifyWindow;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
pub fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse `full` or a byte count
pub fn parse_verify_window(s: &str) -> Result<VerifyWindow, String> {
    if s.trim().eq_ignore_ascii_case("full") {
        Ok(VerifyWindow::Full)
    } else {
        parse_hex_u32(s).map(|n| VerifyWindow::Prefix(n as usize))
    }
}

/// How to reach the module
#[derive(ValueEnum, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Bluetooth RFCOMM socket
    #[default]
    Rfcomm,
    /// Serial port
    Serial,
}

/// LED state for the `led` command
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedState {
    /// Switch the LED on
    On,
    /// Switch the LED off
    Off,
}

#[derive(Parser)]
#[command(name = "bt122-ota")]
#[command(author, version, about = "OTA firmware updater for BT122 Bluetooth modules", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (TOML)
    /// Defaults to ./bt122-ota.toml when present
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Don't ask for confirmation
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Connection options, overriding the configuration file
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Transport to use
    #[arg(long, global = true, value_enum)]
    pub transport: Option<TransportKind>,

    /// Bluetooth address of the module (e.g. c4:64:e3:64:0a:5a)
    #[arg(long, global = true)]
    pub target: Option<String>,

    /// RFCOMM channel of the OTA service
    #[arg(long, global = true)]
    pub channel: Option<u8>,

    /// Service UUID (informational)
    #[arg(long, global = true)]
    pub service: Option<String>,

    /// Serial port device (e.g. /dev/ttyUSB0, COM9)
    #[arg(long, global = true)]
    pub port: Option<String>,

    /// Serial baud rate
    #[arg(long, global = true)]
    pub baud: Option<u32>,

    /// Read timeout in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Erase, program, read back, verify and reset into DFU mode
    Dfu {
        /// Firmware image (defaults to the configured firmware_path)
        firmware: Option<PathBuf>,

        /// Bytes to compare after read-back: "full" or a byte count
        #[arg(long, value_parser = parse_verify_window)]
        verify_window: Option<VerifyWindow>,

        /// Bytes of flash to read back (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32)]
        flash_capacity: Option<u32>,

        /// Skip the echo probe before erasing
        #[arg(long)]
        no_echo: bool,
    },

    /// Stream the image to a receiver that programs its own flash
    Stream {
        /// Firmware image (defaults to the configured firmware_path)
        firmware: Option<PathBuf>,

        /// Bytes per chunk; must match the receiver
        #[arg(long, value_parser = parse_hex_u32)]
        chunk_size: Option<u32>,
    },

    /// Send bytes and check they come back unchanged
    Echo {
        /// Hex bytes to send (e.g. 0b7e122a)
        data: Option<String>,
    },

    /// Read flash and print a hexdump
    Read {
        /// Start address (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32)]
        addr: u32,

        /// Number of bytes (1-255)
        #[arg(long, value_parser = parse_hex_u32)]
        len: u32,
    },

    /// Page write bytes to flash
    Write {
        /// Start address (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32)]
        addr: u32,

        /// Hex bytes to write, 1-255 of them (e.g. 11335577)
        #[arg(long)]
        data: String,
    },

    /// Read flash contents to a file
    Dump {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Bytes to read (defaults to the configured flash capacity)
        #[arg(long, value_parser = parse_hex_u32)]
        length: Option<u32>,
    },

    /// Erase the flash chip
    Erase {
        /// Block erase instead of chip erase
        #[arg(long)]
        block: bool,
    },

    /// Read the flash status register
    Status,

    /// Set the flash write enable latch
    WriteEnable,

    /// Switch the module LED
    Led {
        #[arg(value_enum)]
        state: LedState,
    },

    /// Reboot the module into DFU boot mode
    Reset,

    /// Print size and SHA-256 of a firmware image
    Hash {
        /// Firmware image (defaults to the configured firmware_path)
        firmware: Option<PathBuf>,
    },

    /// Compare two binary files
    Compare {
        /// First file
        first: PathBuf,

        /// Second file
        second: PathBuf,

        /// Only compare this many leading bytes
        #[arg(long, value_parser = parse_hex_u32)]
        window: Option<u32>,
    },

    /// List serial ports
    ListPorts,
}
