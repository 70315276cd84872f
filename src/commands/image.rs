//! Offline image commands: hash and compare

use bt122_ota_core::error::Result;
use bt122_ota_core::{verify, FirmwareImage, VerificationResult, VerifyWindow};
use std::path::Path;

/// Print size and SHA-256 of an image
pub fn run_hash(path: &Path) -> Result<String> {
    let image = FirmwareImage::load(path)?;
    let digest = image.sha256_hex();
    println!("File:   {}", path.display());
    println!("Size:   {} bytes", image.len());
    println!("SHA256: {}", digest);
    Ok(digest)
}

/// Compare `second` against `first` over `window`
///
/// A shorter `second` counts as a mismatch at the offset where it ends.
pub fn compare_files(first: &Path, second: &Path, window: VerifyWindow) -> Result<VerificationResult> {
    let expected = FirmwareImage::load(first)?;
    let actual = FirmwareImage::load(second)?;
    if expected.len() != actual.len() {
        log::warn!(
            "{} is {} bytes, {} is {} bytes",
            first.display(),
            expected.len(),
            second.display(),
            actual.len()
        );
    }
    Ok(verify(actual.bytes(), expected.bytes(), window))
}

/// Run the compare command, failing on the first mismatch
pub fn run_compare(first: &Path, second: &Path, window: VerifyWindow) -> Result<()> {
    let result = compare_files(first, second, window)?;
    match result.first_mismatch {
        None => println!("Files match ({} bytes compared)", result.compared),
        Some(m) => {
            let found = m
                .found
                .map(|b| format!("0x{:02X}", b))
                .unwrap_or_else(|| "end of file".to_string());
            println!(
                "Files differ: {} of {} bytes, first at offset 0x{:06X} (0x{:02X} vs {})",
                result.mismatch_count, result.compared, m.offset, m.expected, found
            );
        }
    }
    result.into_result().map(|_| ())
}
