//! Firmware programming state machine for the SPI control protocol
//!
//! The sequence is fixed:
//!
//! ```text
//! Idle -> Erasing -> Programming -> ReadingBack -> Verifying -> Resetting -> Complete
//!                                                      |
//!                                                      +-> Failed
//! ```
//!
//! Any error moves the machine to `Failed`. There is no per-block retry; a
//! failed run has to start again from `Idle`.

use crate::address::FlashAddress;
use crate::control::{SpiControl, MAX_TRANSFER_LEN};
use crate::error::{OtaError, Result};
use crate::image::FirmwareImage;
use crate::transport::Transport;
use crate::verify::{verify, VerificationResult, VerifyWindow};
use core::fmt;

/// Bytes per page write
pub const DEFAULT_WRITE_BLOCK: usize = 32;
/// Bytes per read-back request
pub const DEFAULT_READ_BLOCK: usize = 64;
/// Read-back region: 4000 reads of 64 bytes
pub const DEFAULT_FLASH_CAPACITY: usize = 4000 * DEFAULT_READ_BLOCK;
/// Pattern sent with the echo probe
const ECHO_PROBE: [u8; 4] = [0x0B, 0x7E, 0x12, 0x2A];

/// Where the state machine is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DfuState {
    /// Nothing started
    Idle,
    /// Chip erase in progress
    Erasing,
    /// Page writes in progress
    Programming,
    /// Reading the flash capacity back
    ReadingBack,
    /// Comparing read-back data with the image
    Verifying,
    /// Reset into DFU mode being sent
    Resetting,
    /// Update written, verified and handed over to the bootloader
    Complete,
    /// Sequence aborted
    Failed,
}

impl DfuState {
    /// Whether no further transitions can happen
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for DfuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Erasing => "erasing",
            Self::Programming => "programming",
            Self::ReadingBack => "reading back",
            Self::Verifying => "verifying",
            Self::Resetting => "resetting",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tunables for a DFU run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfuConfig {
    /// Bytes per page write (the final write may be shorter)
    pub write_block: usize,
    /// Bytes per read request during read-back
    pub read_block: usize,
    /// Bytes of flash read back, independent of the image size
    pub flash_capacity: usize,
    /// Part of the image compared after read-back
    pub verify_window: VerifyWindow,
    /// Send an echo probe before erasing
    pub echo_probe: bool,
}

impl Default for DfuConfig {
    fn default() -> Self {
        Self {
            write_block: DEFAULT_WRITE_BLOCK,
            read_block: DEFAULT_READ_BLOCK,
            flash_capacity: DEFAULT_FLASH_CAPACITY,
            verify_window: VerifyWindow::Full,
            echo_probe: true,
        }
    }
}

impl DfuConfig {
    /// Check block sizes and capacity
    pub fn validate(&self) -> Result<()> {
        for (name, size) in [("write", self.write_block), ("read", self.read_block)] {
            if size == 0 || size > MAX_TRANSFER_LEN {
                return Err(OtaError::InvalidParameter(format!(
                    "{} block size {} outside 1..={}",
                    name, size, MAX_TRANSFER_LEN
                )));
            }
        }
        if self.flash_capacity > FlashAddress::LIMIT as usize {
            return Err(OtaError::InvalidParameter(format!(
                "flash capacity {} exceeds 24-bit address space",
                self.flash_capacity
            )));
        }
        Ok(())
    }
}

/// Progress callbacks for a DFU run
pub trait DfuProgress {
    /// State machine moved to `state`
    fn state_changed(&mut self, state: DfuState);

    /// Starting page writes for `total_bytes`
    fn writing(&mut self, total_bytes: usize);

    /// `bytes_written` of the image written so far
    fn write_progress(&mut self, bytes_written: usize);

    /// Starting read-back of `total_bytes`
    fn reading(&mut self, total_bytes: usize);

    /// `bytes_read` of the capacity read so far
    fn read_progress(&mut self, bytes_read: usize);

    /// Verification finished
    fn verified(&mut self, result: &VerificationResult);
}

/// Progress reporter that ignores everything
pub struct NoProgress;

impl DfuProgress for NoProgress {
    fn state_changed(&mut self, _state: DfuState) {}
    fn writing(&mut self, _total_bytes: usize) {}
    fn write_progress(&mut self, _bytes_written: usize) {}
    fn reading(&mut self, _total_bytes: usize) {}
    fn read_progress(&mut self, _bytes_read: usize) {}
    fn verified(&mut self, _result: &VerificationResult) {}
}

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct DfuReport {
    /// Terminal state
    pub state: DfuState,
    /// Every state visited, in order
    pub history: Vec<DfuState>,
    /// Number of page writes issued
    pub writes: usize,
    /// Image bytes written
    pub bytes_written: usize,
    /// Flash bytes read back
    pub bytes_read: usize,
    /// Outcome of the comparison
    pub verification: Option<VerificationResult>,
}

/// Number of page writes needed for `len` bytes in `block` sized windows
pub fn write_count(len: usize, block: usize) -> usize {
    len.div_ceil(block)
}

/// Drives one DFU sequence over a control channel
pub struct DfuSession<'a, T: Transport> {
    control: &'a mut SpiControl<T>,
    config: DfuConfig,
    state: DfuState,
    history: Vec<DfuState>,
    writes: usize,
    bytes_written: usize,
    bytes_read: usize,
    verification: Option<VerificationResult>,
}

impl<'a, T: Transport> DfuSession<'a, T> {
    /// Create a session in the `Idle` state
    pub fn new(control: &'a mut SpiControl<T>, config: DfuConfig) -> Self {
        Self {
            control,
            config,
            state: DfuState::Idle,
            history: vec![DfuState::Idle],
            writes: 0,
            bytes_written: 0,
            bytes_read: 0,
            verification: None,
        }
    }

    /// Current state
    pub fn state(&self) -> DfuState {
        self.state
    }

    /// States visited so far
    pub fn history(&self) -> &[DfuState] {
        &self.history
    }

    fn enter<P: DfuProgress + ?Sized>(&mut self, state: DfuState, progress: &mut P) {
        log::debug!("dfu: {} -> {}", self.state, state);
        self.state = state;
        self.history.push(state);
        progress.state_changed(state);
    }

    /// Run the complete sequence for `image`
    ///
    /// Returns the report when the update completed. Transport, protocol and
    /// verification failures leave the session in `Failed` and are returned
    /// as errors; [`DfuSession::report`] still shows how far it got and, after
    /// a failed comparison, where the first mismatch is.
    pub fn run<P: DfuProgress + ?Sized>(
        &mut self,
        image: &FirmwareImage,
        progress: &mut P,
    ) -> Result<DfuReport> {
        if self.state != DfuState::Idle {
            return Err(OtaError::InvalidParameter(format!(
                "DFU session already {}",
                self.state
            )));
        }

        match self.run_inner(image, progress) {
            Ok(()) => Ok(self.report()),
            Err(e) => {
                log::error!("dfu: aborted while {}: {}", self.state, e);
                self.enter(DfuState::Failed, progress);
                Err(e)
            }
        }
    }

    /// Snapshot of the run so far
    pub fn report(&self) -> DfuReport {
        DfuReport {
            state: self.state,
            history: self.history.clone(),
            writes: self.writes,
            bytes_written: self.bytes_written,
            bytes_read: self.bytes_read,
            verification: self.verification.clone(),
        }
    }

    fn run_inner<P: DfuProgress + ?Sized>(
        &mut self,
        image: &FirmwareImage,
        progress: &mut P,
    ) -> Result<()> {
        self.config.validate()?;
        if image.len() > self.config.flash_capacity {
            return Err(OtaError::InvalidParameter(format!(
                "image of {} bytes does not fit in {} bytes of flash",
                image.len(),
                self.config.flash_capacity
            )));
        }
        if self.config.verify_window.is_partial(image.len()) {
            log::warn!(
                "dfu: verifying only the {} of a {} byte image; corruption past it will go unnoticed",
                self.config.verify_window,
                image.len()
            );
        }

        if self.config.echo_probe {
            self.control.echo(&ECHO_PROBE)?;
        }

        self.enter(DfuState::Erasing, progress);
        log::info!("Erasing flash...");
        let code = self.control.chip_erase()?;
        log::info!("Flash erased (result {})", code);

        self.enter(DfuState::Programming, progress);
        self.program(image, progress)?;

        self.enter(DfuState::ReadingBack, progress);
        let readback = self.read_back(progress)?;

        self.enter(DfuState::Verifying, progress);
        let result = verify(&readback, image.bytes(), self.config.verify_window);
        progress.verified(&result);
        self.verification = Some(result.clone());
        let result = result.into_result()?;
        log::info!("Verified {} bytes", result.compared);

        self.enter(DfuState::Resetting, progress);
        self.control.dfu_reset()?;

        self.enter(DfuState::Complete, progress);
        Ok(())
    }

    /// Write the image in `write_block` windows, the last one possibly short
    fn program<P: DfuProgress + ?Sized>(
        &mut self,
        image: &FirmwareImage,
        progress: &mut P,
    ) -> Result<()> {
        let block = self.config.write_block;
        log::info!(
            "Writing {} bytes in {} page writes",
            image.len(),
            write_count(image.len(), block)
        );
        progress.writing(image.len());

        for (index, chunk) in image.bytes().chunks(block).enumerate() {
            let addr = FlashAddress::try_from(index * block)?;
            let code = self.control.write(addr, chunk)?;
            if !code.is_ok() {
                log::debug!("dfu: write at {} returned {}", addr, code);
            }
            self.writes += 1;
            self.bytes_written += chunk.len();
            progress.write_progress(self.bytes_written);
        }

        log::info!("Finished writing {} bytes", self.bytes_written);
        Ok(())
    }

    /// Read back the configured capacity, not just the image length
    fn read_back<P: DfuProgress + ?Sized>(&mut self, progress: &mut P) -> Result<Vec<u8>> {
        let capacity = self.config.flash_capacity;
        let block = self.config.read_block;
        let mut data = Vec::with_capacity(capacity);
        progress.reading(capacity);

        let mut offset = 0;
        while offset < capacity {
            let len = block.min(capacity - offset);
            let addr = FlashAddress::try_from(offset)?;
            let response = self.control.read(addr, len)?;
            data.extend_from_slice(&response.data);
            offset += len;
            self.bytes_read = offset;
            progress.read_progress(offset);
        }

        log::info!("Finished reading {} bytes of flash", data.len());
        Ok(data)
    }
}

/// Run a full DFU sequence with default bookkeeping
pub fn perform_dfu<T: Transport, P: DfuProgress + ?Sized>(
    control: &mut SpiControl<T>,
    image: &FirmwareImage,
    config: DfuConfig,
    progress: &mut P,
) -> Result<DfuReport> {
    DfuSession::new(control, config).run(image, progress)
}
