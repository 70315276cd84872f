//! bt122-ota - Over-the-air firmware updater for BT122 Bluetooth modules
//!
//! Two update paths share one connection layer (RFCOMM or serial):
//!
//! - **dfu**: drives the module's SPI flash one control opcode at a time
//!   (erase, page writes, read-back, verify) and then reboots it into its
//!   DFU bootloader
//! - **stream**: hands the image to an STM32 host that programs its own
//!   flash, in acknowledged chunks behind a size and SHA-256 header
//!
//! The remaining subcommands expose the single control operations and a few
//! offline helpers for checking images.

mod cli;
mod commands;
mod config;
mod transports;

use bt122_ota_core::dfu::DfuConfig;
use bt122_ota_core::hexdump::parse_hex;
use bt122_ota_core::stream::StreamConfig;
use bt122_ota_core::{BoxedTransport, FirmwareImage, OtaError, SpiControl, VerifyWindow};
use clap::Parser;
use cli::{Cli, Commands, LedState};
use config::{ConfigFile, Settings};
use std::process::ExitCode;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> ExitCode {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(exit_code(e.as_ref()))
        }
    }
}

/// 2 for a failed verification, 1 for everything else
fn exit_code(err: &(dyn std::error::Error + 'static)) -> u8 {
    match err.downcast_ref::<OtaError>() {
        Some(OtaError::Verification { .. }) => 2,
        _ => 1,
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let file = ConfigFile::load(cli.config.as_deref())?;
    let settings = Settings::resolve(file, &cli.connection)?;
    log::debug!("Settings: {:?}", settings);

    match cli.command {
        Commands::Dfu {
            firmware,
            verify_window,
            flash_capacity,
            no_echo,
        } => {
            let path = settings.firmware(firmware)?;
            let image = FirmwareImage::load(&path)?;
            let config = DfuConfig {
                flash_capacity: flash_capacity
                    .map(|n| n as usize)
                    .unwrap_or(settings.flash_capacity),
                verify_window: verify_window.unwrap_or(settings.verify_window),
                echo_probe: !no_echo,
                ..DfuConfig::default()
            };
            let question = format!(
                "Erase the module flash and program {} ({} bytes)?",
                path.display(),
                image.len()
            );
            if !commands::confirm(&question, cli.yes)? {
                println!("Aborted");
                return Ok(());
            }

            let mut session = transports::open_session(&settings)?;
            let mut progress = commands::dfu::IndicatifProgress::new();
            commands::dfu::run_dfu(session.transport()?, &image, config, &mut progress)?;
            session.close()?;
        }
        Commands::Stream {
            firmware,
            chunk_size,
        } => {
            let image = FirmwareImage::load(settings.firmware(firmware)?)?;
            let config = StreamConfig {
                chunk_size: chunk_size
                    .map(|n| n as usize)
                    .unwrap_or(settings.chunk_size),
                ..StreamConfig::default()
            };

            let mut session = transports::open_session(&settings)?;
            commands::stream::run_stream(session.transport()?, &image, config, cli.yes)?;
            session.close()?;
        }
        Commands::Echo { data } => {
            let data = match data {
                Some(hex) => parse_hex(&hex)?,
                None => commands::flash::DEFAULT_ECHO.to_vec(),
            };
            with_control(&settings, |control| commands::flash::run_echo(control, &data))?;
        }
        Commands::Read { addr, len } => {
            with_control(&settings, |control| {
                commands::flash::run_read(control, addr, len as usize, settings.flash_capacity)
            })?;
        }
        Commands::Write { addr, data } => {
            let data = parse_hex(&data)?;
            with_control(&settings, |control| {
                commands::flash::run_write(control, addr, &data, settings.flash_capacity)
            })?;
        }
        Commands::Dump { output, length } => {
            let length = length.map(|n| n as usize).unwrap_or(settings.flash_capacity);
            with_control(&settings, |control| {
                commands::flash::run_dump(control, &output, length)
            })?;
        }
        Commands::Erase { block } => {
            if !commands::confirm("Erase the module flash?", cli.yes)? {
                println!("Aborted");
                return Ok(());
            }
            with_control(&settings, |control| commands::flash::run_erase(control, block))?;
        }
        Commands::Status => {
            with_control(&settings, |control| commands::flash::run_status(control))?;
        }
        Commands::WriteEnable => {
            with_control(&settings, |control| commands::flash::run_write_enable(control))?;
        }
        Commands::Led { state } => {
            with_control(&settings, |control| {
                commands::flash::run_led(control, state == LedState::On)
            })?;
        }
        Commands::Reset => {
            with_control(&settings, |control| commands::flash::run_reset(control))?;
        }
        Commands::Hash { firmware } => {
            commands::image::run_hash(&settings.firmware(firmware)?)?;
        }
        Commands::Compare {
            first,
            second,
            window,
        } => {
            let window = window
                .map(|n| VerifyWindow::Prefix(n as usize))
                .unwrap_or(VerifyWindow::Full);
            commands::image::run_compare(&first, &second, window)?;
        }
        Commands::ListPorts => {
            print!("{}", transports::transport_help());
            println!();
            let ports = bt122_ota_serial::available_ports();
            if ports.is_empty() {
                println!("No serial ports found");
            } else {
                println!("Serial ports:");
                for port in ports {
                    println!("  {}", port);
                }
            }
        }
    }

    Ok(())
}

/// Open the configured connection and run one control operation on it
fn with_control<R, F>(settings: &Settings, op: F) -> CliResult<R>
where
    F: FnOnce(&mut SpiControl<&mut BoxedTransport>) -> bt122_ota_core::Result<R>,
{
    let mut session = transports::open_session(settings)?;
    let result = op(&mut SpiControl::new(session.transport()?))?;
    session.close()?;
    Ok(result)
}
