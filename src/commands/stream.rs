//! Streaming transfer command

use super::{confirm, progress_bar};
use bt122_ota_core::error::{OtaError, Result};
use bt122_ota_core::stream::{StreamClient, StreamConfig, StreamProgress, StreamReport};
use bt122_ota_core::{FirmwareImage, Transport};
use indicatif::ProgressBar;

/// Progress bar over the payload bytes
#[derive(Default)]
pub struct StreamBar {
    bar: Option<ProgressBar>,
}

impl StreamProgress for StreamBar {
    fn sending(&mut self, total_bytes: usize, chunks: usize) {
        println!("Sending {} bytes in {} chunks", total_bytes, chunks);
        self.bar = Some(progress_bar(total_bytes as u64, "Sending"));
    }

    fn chunk_acked(&mut self, _index: usize, bytes_sent: usize) {
        if let Some(pb) = &self.bar {
            pb.set_position(bytes_sent as u64);
        }
    }
}

impl StreamBar {
    fn finish(&mut self, ok: bool) {
        if let Some(pb) = self.bar.take() {
            if ok {
                pb.finish_with_message("Upload complete");
            } else {
                pb.abandon_with_message("Upload aborted");
            }
        }
    }
}

/// Stream `image`, asking before the payload goes out unless `assume_yes`
pub fn run_stream<T: Transport>(
    transport: T,
    image: &FirmwareImage,
    config: StreamConfig,
    assume_yes: bool,
) -> Result<StreamReport> {
    let mut bar = StreamBar::default();
    let mut client = StreamClient::new(transport, config);

    let result = client.transfer(image, &mut bar, |session| {
        println!(
            "Header sent: {} bytes, sha256 {}",
            session.size(),
            image.sha256_hex()
        );
        let proceed = confirm("Send firmware payload?", assume_yes).map_err(OtaError::from)?;
        if proceed {
            Ok(())
        } else {
            Err(OtaError::InvalidParameter("transfer cancelled".into()))
        }
    });

    bar.finish(result.is_ok());
    let report = result?;
    println!(
        "Firmware upload complete. Sent {} bytes in {} chunks",
        report.bytes_sent, report.chunks
    );
    Ok(report)
}
