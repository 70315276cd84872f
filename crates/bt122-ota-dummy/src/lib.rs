//! bt122-ota-dummy - In-memory BT122 emulator for testing
//!
//! [`DummyBt122`] answers the SPI control protocol the way the module's
//! script does, backed by a flash array held in memory. [`DummyStreamReceiver`]
//! plays the STM32 side of the streaming transfer. Both implement
//! [`Transport`] so the real client code can run against them without
//! hardware, and both can be told to misbehave.

mod receiver;

pub use receiver::{DummyStreamReceiver, ReceiverConfig, ReceiverPhase};

use bt122_ota_core::control::{BLOCK_ERASE_STAGES, LED_ARGUMENT};
use bt122_ota_core::error::{OtaError, Result};
use bt122_ota_core::{ControlOpcode, Transport};
use std::collections::VecDeque;
use std::io;

/// Status register write enable latch
pub const STATUS_WEL: u8 = 0x02;

/// Bytes erased by a block erase
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Emulator settings
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Flash size in bytes
    pub flash_size: usize,
    /// Confirmation byte sent after every response
    pub confirmation: u8,
    /// Result code reported for writes and erases
    pub result_code: u16,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            flash_size: 256_000,
            confirmation: 0x00,
            result_code: 0x0000,
        }
    }
}

/// Ways to make the emulator misbehave
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Drop the connection when this frame (0-based) arrives
    pub close_at_frame: Option<usize>,
    /// Report this byte instead of the stored one at the given flash offset
    pub corrupt_read: Option<(usize, u8)>,
    /// Echo a read length one less than requested
    pub short_read_length: bool,
    /// Swallow the reply to this frame (0-based) so the client times out
    pub silent_frame: Option<usize>,
}

/// Emulated BT122 module running the OTA SPI script
pub struct DummyBt122 {
    config: DummyConfig,
    flash: Vec<u8>,
    status: u8,
    led: bool,
    reset_requested: bool,
    closed: bool,
    frames: Vec<Vec<u8>>,
    rx: VecDeque<u8>,
    faults: Faults,
}

impl DummyBt122 {
    /// Create an emulator with erased flash
    pub fn new(config: DummyConfig) -> Self {
        let flash = vec![0xFF; config.flash_size];
        Self {
            config,
            flash,
            status: 0,
            led: false,
            reset_requested: false,
            closed: false,
            frames: Vec::new(),
            rx: VecDeque::new(),
            faults: Faults::default(),
        }
    }

    /// Create an emulator with the default 256000 byte flash
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create an emulator whose flash starts with `initial`
    pub fn with_data(config: DummyConfig, initial: &[u8]) -> Self {
        let mut dummy = Self::new(config);
        let len = initial.len().min(dummy.flash.len());
        dummy.flash[..len].copy_from_slice(&initial[..len]);
        dummy
    }

    /// Install fault injection
    pub fn set_faults(&mut self, faults: Faults) {
        self.faults = faults;
    }

    /// Flash contents
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// Every frame received, in order
    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    /// Opcode byte of every frame received
    pub fn opcodes(&self) -> Vec<u8> {
        self.frames
            .iter()
            .filter_map(|f| f.first().copied())
            .collect()
    }

    /// Whether a DFU reset was received
    pub fn reset_requested(&self) -> bool {
        self.reset_requested
    }

    /// LED state
    pub fn led(&self) -> bool {
        self.led
    }

    /// Current status register
    pub fn status(&self) -> u8 {
        self.status
    }

    fn respond(&mut self, response: &[u8]) {
        self.rx.extend(response.iter().copied());
        self.rx.push_back(self.config.confirmation);
    }

    fn result_bytes(&self) -> [u8; 2] {
        self.config.result_code.to_be_bytes()
    }

    fn decode_addr(bytes: &[u8]) -> usize {
        ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | bytes[2] as usize
    }

    fn handle_read(&mut self, payload: &[u8]) {
        if payload.len() < 4 {
            log::warn!("dummy: truncated read frame");
            return;
        }
        let len = payload[0] as usize;
        let addr = Self::decode_addr(&payload[1..4]);

        let mut data = vec![0xFF; len];
        for (i, byte) in data.iter_mut().enumerate() {
            if let Some(&stored) = self.flash.get(addr + i) {
                *byte = stored;
            }
        }
        if let Some((offset, value)) = self.faults.corrupt_read {
            if (addr..addr + len).contains(&offset) {
                data[offset - addr] = value;
            }
        }

        let echoed = if self.faults.short_read_length {
            payload[0].wrapping_sub(1)
        } else {
            payload[0]
        };
        let mut response = Vec::with_capacity(len + 3);
        response.push(echoed);
        response.extend_from_slice(&data);
        response.extend_from_slice(&self.result_bytes());
        self.respond(&response);
    }

    fn handle_page_write(&mut self, payload: &[u8]) {
        if payload.len() < 4 {
            log::warn!("dummy: truncated write frame");
            return;
        }
        let addr = Self::decode_addr(&payload[0..3]);
        let len = payload[3] as usize;
        let data = &payload[4..];
        if data.len() != len {
            log::warn!(
                "dummy: write frame declares {} bytes but carries {}",
                len,
                data.len()
            );
        }

        // Programming can only clear bits
        for (i, &byte) in data.iter().take(len).enumerate() {
            if let Some(cell) = self.flash.get_mut(addr + i) {
                *cell &= byte;
            }
        }
        self.status &= !STATUS_WEL;
        let result = self.result_bytes();
        self.respond(&result);
    }

    fn handle_block_erase(&mut self) {
        let end = BLOCK_SIZE.min(self.flash.len());
        self.flash[..end].fill(0xFF);
        self.status &= !STATUS_WEL;

        let result = self.result_bytes();
        let mut response = Vec::with_capacity(BLOCK_ERASE_STAGES * 2);
        for _ in 0..BLOCK_ERASE_STAGES {
            response.extend_from_slice(&result);
        }
        self.respond(&response);
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        let Some((&op, payload)) = frame.split_first() else {
            return;
        };
        let opcode = match ControlOpcode::try_from(op) {
            Ok(opcode) => opcode,
            Err(_) => {
                log::warn!("dummy: ignoring unknown opcode 0x{:02X}", op);
                return;
            }
        };
        log::trace!("dummy: {} with {} payload bytes", opcode, payload.len());

        match opcode {
            ControlOpcode::Echo => self.respond(payload),
            ControlOpcode::Read => self.handle_read(payload),
            ControlOpcode::PageWrite => self.handle_page_write(payload),
            ControlOpcode::BlockErase => self.handle_block_erase(),
            ControlOpcode::LedOn | ControlOpcode::LedOff => {
                if payload != [LED_ARGUMENT] {
                    log::warn!("dummy: unexpected LED argument {:02x?}", payload);
                }
                self.led = opcode == ControlOpcode::LedOn;
                self.respond(&[]);
            }
            ControlOpcode::ChipErase => {
                self.flash.fill(0xFF);
                self.status &= !STATUS_WEL;
                let result = self.result_bytes();
                self.respond(&result);
            }
            ControlOpcode::ReadStatusRegister => {
                let status = self.status;
                self.respond(&[status]);
            }
            ControlOpcode::WriteEnable => {
                self.status |= STATUS_WEL;
                self.respond(&[]);
            }
            ControlOpcode::DfuReset => {
                // The module reboots instead of answering
                self.reset_requested = true;
            }
        }
    }
}

impl Transport for DummyBt122 {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let index = self.frames.len();
        if self.closed || self.faults.close_at_frame == Some(index) {
            self.closed = true;
            return Err(OtaError::Transport(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "dummy module dropped the connection",
            )));
        }
        self.frames.push(data.to_vec());

        let pending = self.rx.len();
        self.handle_frame(data);
        if self.faults.silent_frame == Some(index) {
            self.rx.truncate(pending);
        }
        Ok(())
    }

    fn recv_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.rx.is_empty() {
            return if self.closed {
                Ok(0)
            } else {
                Err(OtaError::Timeout)
            };
        }
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("dummy BT122 ({} bytes flash)", self.flash.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt122_ota_core::dfu::{perform_dfu, DfuConfig, DfuSession, DfuState, NoProgress};
    use bt122_ota_core::{FirmwareImage, FlashAddress, SpiControl, VerifyWindow};
    use proptest::prelude::*;

    fn small(capacity: usize) -> (DummyBt122, DfuConfig) {
        let dummy = DummyBt122::new(DummyConfig {
            flash_size: capacity,
            ..DummyConfig::default()
        });
        let config = DfuConfig {
            flash_capacity: capacity,
            ..DfuConfig::default()
        };
        (dummy, config)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn test_write_then_read() {
        let mut dummy = DummyBt122::new_default();
        let mut control = SpiControl::new(&mut dummy);
        let addr = FlashAddress::new(0x1000).unwrap();

        assert!(control.write(addr, &[0x12, 0x34, 0x56, 0x78]).unwrap().is_ok());
        let resp = control.read(addr, 4).unwrap();
        assert_eq!(resp.data, vec![0x12, 0x34, 0x56, 0x78]);
        assert!(resp.result.is_ok());
    }

    #[test]
    fn test_programming_only_clears_bits() {
        let mut dummy = DummyBt122::new_default();
        let mut control = SpiControl::new(&mut dummy);
        let addr = FlashAddress::new(0).unwrap();

        control.write(addr, &[0xF0]).unwrap();
        control.write(addr, &[0x0F]).unwrap();
        assert_eq!(control.read(addr, 1).unwrap().data, vec![0x00]);

        control.chip_erase().unwrap();
        assert_eq!(control.read(addr, 1).unwrap().data, vec![0xFF]);
    }

    #[test]
    fn test_status_register_tracks_write_enable() {
        let mut dummy = DummyBt122::new_default();
        let mut control = SpiControl::new(&mut dummy);

        assert_eq!(control.read_status_register().unwrap() & STATUS_WEL, 0);
        control.write_enable().unwrap();
        assert_eq!(control.read_status_register().unwrap() & STATUS_WEL, STATUS_WEL);
        control.write(FlashAddress::new(0).unwrap(), &[0]).unwrap();
        assert_eq!(control.read_status_register().unwrap() & STATUS_WEL, 0);
    }

    #[test]
    fn test_block_erase_and_led() {
        let mut dummy = DummyBt122::with_data(DummyConfig::default(), &[0u8; 128]);
        let mut control = SpiControl::new(&mut dummy);

        let codes = control.block_erase().unwrap();
        assert!(codes.iter().all(|c| c.is_ok()));
        control.set_led(true).unwrap();
        drop(control);

        assert!(dummy.led());
        assert_eq!(dummy.frames().last(), Some(&vec![0x04, LED_ARGUMENT]));
        assert!(dummy.flash()[..128].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_read_past_capacity_returns_erased_bytes() {
        let (mut dummy, _) = small(16);
        let resp = SpiControl::new(&mut dummy)
            .read(FlashAddress::new(8).unwrap(), 16)
            .unwrap();
        assert_eq!(resp.data, vec![0xFF; 16]);
    }

    #[test]
    fn test_dfu_every_transition_issues_its_wire_operation() {
        let (mut dummy, config) = small(1024);
        let image = pattern(100);

        let mut control = SpiControl::new(&mut dummy);
        let report = perform_dfu(
            &mut control,
            &FirmwareImage::from_bytes(image.clone()),
            config,
            &mut NoProgress,
        )
        .unwrap();
        drop(control);

        assert_eq!(report.state, DfuState::Complete);
        assert_eq!(report.writes, 4);
        assert_eq!(report.bytes_read, 1024);

        let ops = dummy.opcodes();
        let echo = ControlOpcode::Echo.byte();
        let erase = ControlOpcode::ChipErase.byte();
        let write = ControlOpcode::PageWrite.byte();
        let read = ControlOpcode::Read.byte();
        let reset = ControlOpcode::DfuReset.byte();
        assert_eq!(ops[0], echo);
        assert_eq!(ops[1], erase);
        assert_eq!(&ops[2..6], &[write; 4]);
        assert_eq!(&ops[6..22], &[read; 16]);
        assert_eq!(ops[22], reset);
        assert_eq!(ops.len(), 23);

        assert_eq!(&dummy.flash()[..100], &image[..]);
        assert!(dummy.flash()[100..].iter().all(|&b| b == 0xFF));
        assert!(dummy.reset_requested());
    }

    #[test]
    fn test_dfu_default_capacity_reads_4000_blocks() {
        let mut dummy = DummyBt122::new_default();
        let image = pattern(5000);

        let mut control = SpiControl::new(&mut dummy);
        let report = perform_dfu(
            &mut control,
            &FirmwareImage::from_bytes(image),
            DfuConfig::default(),
            &mut NoProgress,
        )
        .unwrap();
        drop(control);

        assert_eq!(report.bytes_read, 256_000);
        let reads = dummy
            .opcodes()
            .iter()
            .filter(|&&op| op == ControlOpcode::Read.byte())
            .count();
        assert_eq!(reads, 4000);
    }

    #[test]
    fn test_dfu_detects_corruption_past_first_256_bytes() {
        let (mut dummy, config) = small(1024);
        dummy.set_faults(Faults {
            corrupt_read: Some((700, 0x00)),
            ..Faults::default()
        });

        let mut control = SpiControl::new(&mut dummy);
        let mut session = DfuSession::new(&mut control, config);
        let err = session
            .run(&FirmwareImage::from_bytes(pattern(800)), &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, OtaError::Verification { offset: 700, .. }));
        assert_eq!(session.state(), DfuState::Failed);
        drop(session);
        drop(control);
        assert!(!dummy.reset_requested());
    }

    #[test]
    fn test_dfu_prefix_window_misses_tail_corruption() {
        let (mut dummy, config) = small(1024);
        dummy.set_faults(Faults {
            corrupt_read: Some((700, 0x00)),
            ..Faults::default()
        });
        let config = DfuConfig {
            verify_window: VerifyWindow::Prefix(256),
            ..config
        };

        let mut control = SpiControl::new(&mut dummy);
        let report = perform_dfu(
            &mut control,
            &FirmwareImage::from_bytes(pattern(800)),
            config,
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(report.state, DfuState::Complete);
    }

    #[test]
    fn test_dfu_connection_drop_during_read_back() {
        let (mut dummy, config) = small(1024);
        // echo, erase, 2 writes, then the third read
        dummy.set_faults(Faults {
            close_at_frame: Some(6),
            ..Faults::default()
        });

        let mut control = SpiControl::new(&mut dummy);
        let mut session = DfuSession::new(&mut control, config);
        let err = session
            .run(&FirmwareImage::from_bytes(pattern(64)), &mut NoProgress)
            .unwrap_err();
        assert!(err.is_transport());
        assert_eq!(
            session.history(),
            &[
                DfuState::Idle,
                DfuState::Erasing,
                DfuState::Programming,
                DfuState::ReadingBack,
                DfuState::Failed,
            ]
        );
    }

    #[test]
    fn test_dfu_missing_reply_times_out() {
        let (mut dummy, config) = small(256);
        dummy.set_faults(Faults {
            silent_frame: Some(1),
            ..Faults::default()
        });

        let mut control = SpiControl::new(&mut dummy);
        let err = perform_dfu(
            &mut control,
            &FirmwareImage::from_bytes(pattern(10)),
            config,
            &mut NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, OtaError::Timeout));
    }

    #[test]
    fn test_wrong_read_length_is_protocol_error() {
        let mut dummy = DummyBt122::new_default();
        dummy.set_faults(Faults {
            short_read_length: true,
            ..Faults::default()
        });
        let err = SpiControl::new(&mut dummy)
            .read(FlashAddress::new(0).unwrap(), 64)
            .unwrap_err();
        assert!(matches!(err, OtaError::Protocol(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Erase first, then ceil(L/32) page writes summing to L, then read-back and reset
        #[test]
        fn dfu_wire_operations_for_any_length(len in 0usize..2048) {
            let (mut dummy, config) = small(2048);
            let config = DfuConfig { echo_probe: false, ..config };
            let image = pattern(len);

            let mut control = SpiControl::new(&mut dummy);
            let report = perform_dfu(
                &mut control,
                &FirmwareImage::from_bytes(image.clone()),
                config,
                &mut NoProgress,
            )
            .unwrap();
            drop(control);

            let write = ControlOpcode::PageWrite.byte();
            let writes: Vec<&Vec<u8>> = dummy.frames().iter().filter(|f| f[0] == write).collect();
            prop_assert_eq!(writes.len(), len.div_ceil(32));
            prop_assert_eq!(report.writes, writes.len());
            // opcode, 3 address bytes, length byte
            let written: usize = writes.iter().map(|f| f.len() - 5).sum();
            prop_assert_eq!(written, len);
            prop_assert!(writes.iter().all(|f| f[4] as usize == f.len() - 5));

            let ops = dummy.opcodes();
            prop_assert_eq!(ops[0], ControlOpcode::ChipErase.byte());
            prop_assert_eq!(ops.iter().filter(|&&op| op == ControlOpcode::ChipErase.byte()).count(), 1);
            prop_assert_eq!(ops.last().copied(), Some(ControlOpcode::DfuReset.byte()));
            prop_assert_eq!(report.bytes_read, 2048);
            prop_assert_eq!(&dummy.flash()[..len], &image[..]);
        }
    }
}
