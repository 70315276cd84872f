//! Configuration file handling
//!
//! Settings come from a TOML file and are then overridden by CLI flags:
//!
//! ```toml
//! [connection]
//! transport = "rfcomm"
//! target_address = "c4:64:e3:64:0a:5a"
//! rfcomm_channel = 7
//! serial_port = "COM9"
//! baud_rate = 115200
//! timeout_ms = 5000
//!
//! [transfer]
//! firmware_path = "firmware.bin"
//! chunk_size = 0x2000
//! flash_capacity = 256000
//! verify_window = "full"
//! ```

use crate::cli::{ConnectionArgs, TransportKind};
use bt122_ota_core::dfu::DEFAULT_FLASH_CAPACITY;
use bt122_ota_core::stream::DEFAULT_CHUNK_SIZE;
use bt122_ota_core::VerifyWindow;
use bt122_ota_rfcomm::{BdAddr, OTA_CONTROL_CHANNEL};
use bt122_ota_serial::DEFAULT_BAUD;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File looked up when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "bt122-ota.toml";

/// Module address of the development board
pub const DEFAULT_TARGET: &str = "c4:64:e3:64:0a:5a";
/// UUID of the module's OTA control service
pub const DEFAULT_SERVICE: &str = "f7bf3564-fb6d-4e53-88a4-5e37e0326063";

#[cfg(windows)]
const DEFAULT_SERIAL_PORT: &str = "COM9";
#[cfg(not(windows))]
const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";

/// Errors loading or validating the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

/// Raw file contents; every key optional
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    connection: ConnectionSection,
    transfer: TransferSection,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConnectionSection {
    transport: Option<TransportKind>,
    target_address: Option<String>,
    service_identifier: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_number")]
    rfcomm_channel: Option<u64>,
    serial_port: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_number")]
    baud_rate: Option<u64>,
    #[serde(deserialize_with = "deserialize_opt_number")]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TransferSection {
    firmware_path: Option<PathBuf>,
    #[serde(deserialize_with = "deserialize_opt_number")]
    chunk_size: Option<u64>,
    #[serde(deserialize_with = "deserialize_opt_number")]
    flash_capacity: Option<u64>,
    #[serde(deserialize_with = "deserialize_opt_window")]
    verify_window: Option<VerifyWindow>,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum HexOrInt {
    Int(u64),
    Str(String),
}

/// Parse a number that can be hex (0x...) or decimal
fn parse_number(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

/// Deserialize an optional integer given as a number or a hex/decimal string
fn deserialize_opt_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(Some(n)),
        HexOrInt::Str(s) => parse_number(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Deserialize `"full"` or a byte count
fn deserialize_opt_window<'de, D>(deserializer: D) -> Result<Option<VerifyWindow>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(Some(VerifyWindow::Prefix(n as usize))),
        HexOrInt::Str(s) if s.trim().eq_ignore_ascii_case("full") => Ok(Some(VerifyWindow::Full)),
        HexOrInt::Str(s) => parse_number(&s)
            .map(|n| Some(VerifyWindow::Prefix(n as usize)))
            .map_err(serde::de::Error::custom),
    }
}

impl ConfigFile {
    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `path`, or the default file if it exists, or nothing
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let file = Self::from_file(path)?;
                log::info!("Loaded configuration from {}", path.display());
                Ok(file)
            }
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    let file = Self::from_file(default)?;
                    log::info!("Loaded configuration from {}", default.display());
                    Ok(file)
                } else {
                    log::debug!("No configuration file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Fully resolved settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub transport: TransportKind,
    pub target_address: BdAddr,
    pub service_identifier: String,
    pub rfcomm_channel: u8,
    pub serial_port: String,
    pub baud_rate: u32,
    pub timeout: Duration,
    pub firmware_path: Option<PathBuf>,
    pub chunk_size: usize,
    pub flash_capacity: usize,
    pub verify_window: VerifyWindow,
}

impl Settings {
    /// Merge file values and CLI overrides on top of the defaults
    pub fn resolve(file: ConfigFile, args: &ConnectionArgs) -> Result<Self, ConfigError> {
        let conn = file.connection;
        let transfer = file.transfer;

        let target = args
            .target
            .clone()
            .or(conn.target_address)
            .unwrap_or_else(|| DEFAULT_TARGET.to_string());
        let target_address = target
            .parse::<BdAddr>()
            .map_err(|e| invalid("target_address", format!("'{}': {}", target, e)))?;

        let rfcomm_channel = match args.channel {
            Some(channel) => channel,
            None => match conn.rfcomm_channel {
                Some(n) => u8::try_from(n)
                    .map_err(|_| invalid("rfcomm_channel", format!("{} is out of range", n)))?,
                None => OTA_CONTROL_CHANNEL,
            },
        };

        let baud_rate = match args.baud {
            Some(baud) => baud,
            None => match conn.baud_rate {
                Some(n) => u32::try_from(n)
                    .map_err(|_| invalid("baud_rate", format!("{} is out of range", n)))?,
                None => DEFAULT_BAUD,
            },
        };
        if baud_rate == 0 {
            return Err(invalid("baud_rate", "must be non-zero"));
        }

        let timeout_ms = args.timeout_ms.or(conn.timeout_ms).unwrap_or(5000);
        if timeout_ms == 0 {
            return Err(invalid("timeout_ms", "must be non-zero"));
        }

        let chunk_size = transfer
            .chunk_size
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(invalid("chunk_size", "must be non-zero"));
        }

        Ok(Self {
            transport: args.transport.or(conn.transport).unwrap_or_default(),
            target_address,
            service_identifier: args
                .service
                .clone()
                .or(conn.service_identifier)
                .unwrap_or_else(|| DEFAULT_SERVICE.to_string()),
            rfcomm_channel,
            serial_port: args
                .port
                .clone()
                .or(conn.serial_port)
                .unwrap_or_else(|| DEFAULT_SERIAL_PORT.to_string()),
            baud_rate,
            timeout: Duration::from_millis(timeout_ms),
            firmware_path: transfer.firmware_path,
            chunk_size,
            flash_capacity: transfer
                .flash_capacity
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_FLASH_CAPACITY),
            verify_window: transfer.verify_window.unwrap_or_default(),
        })
    }

    /// Firmware path from the command line or the configuration
    pub fn firmware(&self, arg: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        arg.or_else(|| self.firmware_path.clone()).ok_or_else(|| {
            invalid(
                "firmware_path",
                "no firmware given on the command line or in the configuration",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(ConfigFile::default(), &ConnectionArgs::default()).unwrap();
        assert_eq!(settings.transport, TransportKind::Rfcomm);
        assert_eq!(settings.target_address.to_string(), DEFAULT_TARGET);
        assert_eq!(settings.service_identifier, DEFAULT_SERVICE);
        assert_eq!(settings.rfcomm_channel, 7);
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert_eq!(settings.chunk_size, 8192);
        assert_eq!(settings.flash_capacity, 256_000);
        assert_eq!(settings.verify_window, VerifyWindow::Full);
        assert!(settings.firmware_path.is_none());
    }

    #[test]
    fn test_parse_full_file() {
        let file = ConfigFile::from_toml_str(
            r#"
            [connection]
            transport = "serial"
            target_address = "C4:64:E3:64:2E:D0"
            rfcomm_channel = "0x08"
            serial_port = "COM9"
            baud_rate = 57600
            timeout_ms = 250

            [transfer]
            firmware_path = "fw/app.bin"
            chunk_size = "0x1000"
            flash_capacity = 4096
            verify_window = 256
            "#,
        )
        .unwrap();
        let settings = Settings::resolve(file, &ConnectionArgs::default()).unwrap();
        assert_eq!(settings.transport, TransportKind::Serial);
        assert_eq!(settings.target_address.to_string(), "c4:64:e3:64:2e:d0");
        assert_eq!(settings.rfcomm_channel, 8);
        assert_eq!(settings.serial_port, "COM9");
        assert_eq!(settings.baud_rate, 57600);
        assert_eq!(settings.timeout, Duration::from_millis(250));
        assert_eq!(settings.firmware_path, Some(PathBuf::from("fw/app.bin")));
        assert_eq!(settings.chunk_size, 4096);
        assert_eq!(settings.flash_capacity, 4096);
        assert_eq!(settings.verify_window, VerifyWindow::Prefix(256));
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = ConfigFile::from_toml_str(
            r#"
            [connection]
            transport = "serial"
            serial_port = "COM9"
            baud_rate = 9600
            "#,
        )
        .unwrap();
        let args = ConnectionArgs {
            transport: Some(TransportKind::Rfcomm),
            baud: Some(115_200),
            port: Some("/dev/ttyACM0".into()),
            ..ConnectionArgs::default()
        };
        let settings = Settings::resolve(file, &args).unwrap();
        assert_eq!(settings.transport, TransportKind::Rfcomm);
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.serial_port, "/dev/ttyACM0");
    }

    #[test]
    fn test_verify_window_full_string() {
        let file = ConfigFile::from_toml_str("[transfer]\nverify_window = \"FULL\"\n").unwrap();
        let settings = Settings::resolve(file, &ConnectionArgs::default()).unwrap();
        assert_eq!(settings.verify_window, VerifyWindow::Full);
    }

    #[test]
    fn test_rejects_invalid_values() {
        for content in [
            "[transfer]\nchunk_size = 0\n",
            "[connection]\nbaud_rate = 0\n",
            "[connection]\ntarget_address = \"c4:64:e3\"\n",
            "[connection]\nrfcomm_channel = 300\n",
        ] {
            let file = ConfigFile::from_toml_str(content).unwrap();
            assert!(
                matches!(
                    Settings::resolve(file, &ConnectionArgs::default()),
                    Err(ConfigError::Invalid { .. })
                ),
                "accepted {:?}",
                content
            );
        }
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(matches!(
            ConfigFile::from_toml_str("[connection]\nspeed = 1\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[transfer]\nfirmware_path = \"a.bin\"").unwrap();
        let loaded = ConfigFile::load(Some(file.path())).unwrap();
        let settings = Settings::resolve(loaded, &ConnectionArgs::default()).unwrap();
        assert_eq!(settings.firmware(None).unwrap(), PathBuf::from("a.bin"));
        assert_eq!(
            settings.firmware(Some("b.bin".into())).unwrap(),
            PathBuf::from("b.bin")
        );
    }

    #[test]
    fn test_missing_firmware_is_error() {
        let settings = Settings::resolve(ConfigFile::default(), &ConnectionArgs::default()).unwrap();
        assert!(settings.firmware(None).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(matches!(
            ConfigFile::load(Some(Path::new("/nonexistent/bt122-ota.toml"))),
            Err(ConfigError::Io { .. })
        ));
    }
}
