//! DFU command: erase, program, read back, verify, reset

use super::{progress_bar, spinner};
use bt122_ota_core::dfu::{DfuConfig, DfuProgress, DfuReport, DfuSession, DfuState};
use bt122_ota_core::error::Result;
use bt122_ota_core::{FirmwareImage, SpiControl, Transport, VerificationResult};
use indicatif::{MultiProgress, ProgressBar};

/// Progress reporter using indicatif progress bars
pub struct IndicatifProgress {
    multi: MultiProgress,
    current_bar: Option<ProgressBar>,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current_bar: None,
        }
    }

    fn create_bar(&mut self, total: u64, phase: &'static str) {
        let pb = self.multi.add(progress_bar(total, phase));
        self.current_bar = Some(pb);
    }

    fn create_spinner(&mut self, message: String) {
        let pb = self.multi.add(spinner(message));
        self.current_bar = Some(pb);
    }

    fn finish(&mut self, message: &str) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_with_message(message.to_string());
        }
    }

    fn set_position(&self, pos: usize) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(pos as u64);
        }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl DfuProgress for IndicatifProgress {
    fn state_changed(&mut self, state: DfuState) {
        match state {
            DfuState::Erasing => self.create_spinner("Erasing flash...".to_string()),
            DfuState::Resetting => self.create_spinner("Resetting into DFU mode...".to_string()),
            DfuState::Complete => self.finish("Reset sent"),
            DfuState::Failed => {
                if let Some(pb) = self.current_bar.take() {
                    pb.abandon_with_message("Failed");
                }
            }
            _ => {}
        }
    }

    fn writing(&mut self, total_bytes: usize) {
        self.finish("Erase complete");
        self.create_bar(total_bytes as u64, "Writing");
    }

    fn write_progress(&mut self, bytes_written: usize) {
        self.set_position(bytes_written);
    }

    fn reading(&mut self, total_bytes: usize) {
        self.finish("Write complete");
        self.create_bar(total_bytes as u64, "Reading back");
    }

    fn read_progress(&mut self, bytes_read: usize) {
        self.set_position(bytes_read);
    }

    fn verified(&mut self, result: &VerificationResult) {
        self.finish("Read-back complete");
        if result.is_match() {
            println!("Verified {} bytes", result.compared);
        } else {
            println!(
                "Verification FAILED: {} mismatching bytes in {} compared",
                result.mismatch_count, result.compared
            );
        }
    }
}

/// Run the DFU sequence and print a summary
pub fn run_dfu<T: Transport, P: DfuProgress + ?Sized>(
    transport: T,
    image: &FirmwareImage,
    config: DfuConfig,
    progress: &mut P,
) -> Result<DfuReport> {
    println!(
        "Updating firmware: {} bytes, sha256 {}",
        image.len(),
        image.sha256_hex()
    );

    let mut control = SpiControl::new(transport);
    let mut session = DfuSession::new(&mut control, config);
    let report = match session.run(image, progress) {
        Ok(report) => report,
        Err(e) => {
            print_failure(&session.report());
            return Err(e);
        }
    };

    println!(
        "Firmware update complete: {} writes ({} bytes), {} bytes read back",
        report.writes, report.bytes_written, report.bytes_read
    );
    println!("Module is rebooting into DFU boot mode");
    Ok(report)
}

fn print_failure(report: &DfuReport) {
    println!(
        "Firmware update failed after {} writes ({} bytes), {} bytes read back",
        report.writes, report.bytes_written, report.bytes_read
    );
    if let Some(m) = report
        .verification
        .as_ref()
        .and_then(|v| v.first_mismatch)
    {
        println!("First mismatch at offset 0x{:06X}", m.offset);
    }
}
