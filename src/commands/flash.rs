//! Single control operations: echo, read, write, dump, erase, status, LED, reset

use super::{progress_bar, spinner};
use bt122_ota_core::dfu::DEFAULT_READ_BLOCK;
use bt122_ota_core::error::{OtaError, Result};
use bt122_ota_core::hexdump::{format_bytes, format_hex};
use bt122_ota_core::{FlashAddress, SpiControl, Transport};
use std::fs;
use std::path::Path;

/// Pattern sent by `echo` when no data is given
pub const DEFAULT_ECHO: [u8; 4] = [0x0B, 0x7E, 0x12, 0x2A];

/// Bytes per hexdump row
const HEXDUMP_LINE: usize = 16;

/// Send `data` and check it comes back
pub fn run_echo<T: Transport>(control: &mut SpiControl<T>, data: &[u8]) -> Result<()> {
    println!("Sending:  {}", format_bytes(data));
    let reply = control.echo(data)?;
    println!("Received: {}", format_bytes(&reply));
    Ok(())
}

/// Read up to 255 bytes inside a `capacity` byte flash and print them as a table
pub fn run_read<T: Transport>(
    control: &mut SpiControl<T>,
    addr: u32,
    len: usize,
    capacity: usize,
) -> Result<Vec<u8>> {
    let capacity = u32::try_from(capacity).unwrap_or(u32::MAX);
    let addr = FlashAddress::within(addr, capacity)?;
    let response = control.read(addr, len)?;
    println!("Read {} bytes at {} (result {})", len, addr, response.result);
    print!("{}", format_hex(&response.data, HEXDUMP_LINE));
    Ok(response.data)
}

/// Page write `data` at `addr` inside a `capacity` byte flash
pub fn run_write<T: Transport>(
    control: &mut SpiControl<T>,
    addr: u32,
    data: &[u8],
    capacity: usize,
) -> Result<()> {
    let capacity = u32::try_from(capacity).unwrap_or(u32::MAX);
    let addr = FlashAddress::within(addr, capacity)?;
    let end = addr.value() as usize + data.len();
    if end > capacity as usize {
        return Err(OtaError::InvalidParameter(format!(
            "{} bytes at {} run past the end of {} bytes of flash",
            data.len(),
            addr,
            capacity
        )));
    }
    let code = control.write(addr, data)?;
    println!("Wrote {} bytes at {} (result {})", data.len(), addr, code);
    Ok(())
}

/// Read `length` bytes from address 0 in 64-byte requests into `output`
pub fn run_dump<T: Transport>(
    control: &mut SpiControl<T>,
    output: &Path,
    length: usize,
) -> Result<()> {
    if length > FlashAddress::LIMIT as usize {
        return Err(OtaError::InvalidParameter(format!(
            "length {} exceeds the 24-bit address space",
            length
        )));
    }

    let pb = progress_bar(length as u64, "Reading");
    let mut data = Vec::with_capacity(length);
    while data.len() < length {
        let chunk = DEFAULT_READ_BLOCK.min(length - data.len());
        let addr = FlashAddress::try_from(data.len())?;
        let response = control.read(addr, chunk)?;
        data.extend_from_slice(&response.data);
        pb.set_position(data.len() as u64);
    }
    pb.finish_with_message("Read complete");

    fs::write(output, &data).map_err(|source| OtaError::Io {
        path: output.display().to_string(),
        source,
    })?;
    println!("Wrote {} bytes to {}", data.len(), output.display());
    Ok(())
}

/// Chip erase, or block erase with its four stage codes
pub fn run_erase<T: Transport>(control: &mut SpiControl<T>, block: bool) -> Result<()> {
    if block {
        let pb = spinner("Erasing block...".to_string());
        let codes = control.block_erase()?;
        pb.finish_with_message("Block erase complete");
        for (stage, code) in codes.iter().enumerate() {
            println!("Erase stage {} result code: {}", stage, code);
        }
    } else {
        let pb = spinner("Erasing flash (this may take a while)...".to_string());
        let code = control.chip_erase()?;
        pb.finish_with_message("Chip erase complete");
        println!("Chip erase result code: {}", code);
    }
    Ok(())
}

/// Print the status register
pub fn run_status<T: Transport>(control: &mut SpiControl<T>) -> Result<u8> {
    let status = control.read_status_register()?;
    println!("Status register: 0x{:02X}", status);
    println!("  BUSY: {}", status & 0x01 != 0);
    println!("  WEL:  {}", status & 0x02 != 0);
    Ok(status)
}

/// Set the write enable latch
pub fn run_write_enable<T: Transport>(control: &mut SpiControl<T>) -> Result<()> {
    control.write_enable()?;
    println!("Write enable sent");
    Ok(())
}

/// Switch the LED
pub fn run_led<T: Transport>(control: &mut SpiControl<T>, on: bool) -> Result<()> {
    control.set_led(on)?;
    println!("LED {}", if on { "on" } else { "off" });
    Ok(())
}

/// Reboot into DFU mode
pub fn run_reset<T: Transport>(control: &mut SpiControl<T>) -> Result<()> {
    control.dfu_reset()?;
    println!("Reset into DFU boot mode sent");
    Ok(())
}
