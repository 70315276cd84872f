//! Read-back verification

use crate::error::OtaError;
use core::fmt;

/// How much of the image to compare against read-back flash contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VerifyWindow {
    /// Compare the entire image
    #[default]
    Full,
    /// Compare only the first `n` bytes
    Prefix(usize),
}

impl VerifyWindow {
    /// Number of bytes compared for an image of `image_len` bytes
    pub fn resolve(self, image_len: usize) -> usize {
        match self {
            Self::Full => image_len,
            Self::Prefix(n) => n.min(image_len),
        }
    }

    /// Whether this window leaves part of an `image_len` byte image unchecked
    pub fn is_partial(self, image_len: usize) -> bool {
        self.resolve(image_len) < image_len
    }
}

impl fmt::Display for VerifyWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Prefix(n) => write!(f, "first {} bytes", n),
        }
    }
}

/// First differing byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    /// Offset from the start of the image
    pub offset: usize,
    /// Byte in the source image
    pub expected: u8,
    /// Byte read back (`None` when the read-back data ended early)
    pub found: Option<u8>,
}

/// Outcome of comparing flash contents with the source image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    /// Number of bytes covered by the comparison
    pub compared: usize,
    /// First mismatch, if any
    pub first_mismatch: Option<Mismatch>,
    /// Total number of differing bytes inside the window
    pub mismatch_count: usize,
}

impl VerificationResult {
    /// Whether the window matched byte for byte
    pub fn is_match(&self) -> bool {
        self.first_mismatch.is_none()
    }

    /// Offset of the first mismatch
    pub fn mismatch_offset(&self) -> Option<usize> {
        self.first_mismatch.map(|m| m.offset)
    }

    /// Turn a failed comparison into an error
    pub fn into_result(self) -> Result<Self, OtaError> {
        match self.first_mismatch {
            None => Ok(self),
            Some(m) => Err(OtaError::Verification {
                offset: m.offset,
                expected: m.expected,
                found: m.found.unwrap_or(0xFF),
            }),
        }
    }
}

/// Compare `readback` with `image` over `window`
pub fn verify(readback: &[u8], image: &[u8], window: VerifyWindow) -> VerificationResult {
    let compared = window.resolve(image.len());
    let mut first_mismatch = None;
    let mut mismatch_count = 0;

    for (offset, &expected) in image[..compared].iter().enumerate() {
        let found = readback.get(offset).copied();
        if found != Some(expected) {
            mismatch_count += 1;
            if first_mismatch.is_none() {
                first_mismatch = Some(Mismatch {
                    offset,
                    expected,
                    found,
                });
            }
        }
    }

    VerificationResult {
        compared,
        first_mismatch,
        mismatch_count,
    }
}
