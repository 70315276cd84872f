//! Firmware images

use crate::error::{OtaError, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Length of a SHA-256 digest
pub const DIGEST_LEN: usize = 32;

/// Raw firmware binary, loaded wholesale and never modified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    data: Vec<u8>,
    source: Option<PathBuf>,
}

impl FirmwareImage {
    /// Wrap bytes that did not come from a file
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            source: None,
        }
    }

    /// Load a raw binary image from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| OtaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        log::info!("Loaded {} bytes of firmware from {}", data.len(), path.display());
        Ok(Self {
            data,
            source: Some(path.to_path_buf()),
        })
    }

    /// Image contents
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image has no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// File the image was loaded from
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// SHA-256 of the whole image
    pub fn sha256(&self) -> [u8; DIGEST_LEN] {
        sha256(&self.data)
    }

    /// SHA-256 as lowercase hex
    pub fn sha256_hex(&self) -> String {
        hex::encode(&self.sha256())
    }
}

/// SHA-256 of `data`
pub fn sha256(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sha256_known_vector() {
        // 16 bytes 0x00..0x0f
        let data: Vec<u8> = (0u8..16).collect();
        assert_eq!(
            hex::encode(&sha256(&data)),
            "be45cb2605bf36bebde684841a28f0fd43c69850a3dce5fedba69928ee3a8991"
        );
    }

    #[test]
    fn test_sha256_empty() {
        assert_eq!(
            FirmwareImage::from_bytes(Vec::new()).sha256_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        let image = FirmwareImage::load(file.path()).unwrap();
        assert_eq!(image.len(), 4);
        assert_eq!(image.bytes(), &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(image.source(), Some(file.path()));
    }

    #[test]
    fn test_load_missing_file() {
        let err = FirmwareImage::load("/nonexistent/firmware.bin").unwrap_err();
        assert!(matches!(err, OtaError::Io { .. }));
    }
}
