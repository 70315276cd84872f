//! Streaming chunked transfer
//!
//! Used when the host MCU behind the module programs its own flash. The
//! client only has to deliver the image reliably:
//!
//! 1. 2-byte handshake, answered with 2 bytes
//! 2. image size as `u32` little-endian
//! 3. SHA-256 of the image
//! 4. the image in fixed-size chunks, each acknowledged with one byte
//!
//! The receiver knows the transfer is over once it has counted `size` bytes.

use crate::error::{OtaError, Result};
use crate::hexdump::format_bytes;
use crate::image::{FirmwareImage, DIGEST_LEN};
use crate::transport::Transport;

/// Chunk size the STM32 receiver is built with
pub const DEFAULT_CHUNK_SIZE: usize = 8192;
/// Handshake value sent before anything else
pub const DEFAULT_HANDSHAKE: [u8; 2] = [0x01, 0x02];
/// Acknowledgment byte sent by the receiver after each chunk
pub const DEFAULT_CHUNK_ACK: u8 = 0xFF;

/// Tunables for a streaming transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Bytes per chunk; must match the receiver
    pub chunk_size: usize,
    /// Handshake bytes
    pub handshake: [u8; 2],
    /// Expected per-chunk acknowledgment
    pub chunk_ack: u8,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            handshake: DEFAULT_HANDSHAKE,
            chunk_ack: DEFAULT_CHUNK_ACK,
        }
    }
}

/// Header and chunking plan for one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSession<'a> {
    payload: &'a [u8],
    size: u32,
    digest: [u8; DIGEST_LEN],
    chunk_size: usize,
}

impl<'a> TransferSession<'a> {
    /// Plan the transfer of `image` in `chunk_size` pieces
    pub fn new(image: &'a FirmwareImage, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(OtaError::InvalidParameter("chunk size must be non-zero".into()));
        }
        let size = u32::try_from(image.len()).map_err(|_| {
            OtaError::InvalidParameter(format!(
                "image of {} bytes does not fit the 4-byte size header",
                image.len()
            ))
        })?;
        Ok(Self {
            payload: image.bytes(),
            size,
            digest: image.sha256(),
            chunk_size,
        })
    }

    /// Declared payload size
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Size header as sent on the wire
    pub fn size_header(&self) -> [u8; 4] {
        self.size.to_le_bytes()
    }

    /// SHA-256 of the payload
    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    /// Bytes per full chunk
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of full chunks plus one for any remainder
    pub fn chunk_count(&self) -> usize {
        self.payload.len().div_ceil(self.chunk_size)
    }

    /// Chunks in transmission order; only the last may be short
    pub fn chunks(&self) -> core::slice::Chunks<'a, u8> {
        self.payload.chunks(self.chunk_size)
    }
}

/// Progress callbacks for a streaming transfer
pub trait StreamProgress {
    /// Header sent, about to stream `total_bytes`
    fn sending(&mut self, total_bytes: usize, chunks: usize);

    /// `bytes_sent` acknowledged so far
    fn chunk_acked(&mut self, index: usize, bytes_sent: usize);
}

/// Progress reporter that ignores everything
pub struct NoStreamProgress;

impl StreamProgress for NoStreamProgress {
    fn sending(&mut self, _total_bytes: usize, _chunks: usize) {}
    fn chunk_acked(&mut self, _index: usize, _bytes_sent: usize) {}
}

/// Summary of a completed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReport {
    /// Bytes delivered
    pub bytes_sent: usize,
    /// Chunks delivered
    pub chunks: usize,
    /// Handshake answer from the receiver
    pub handshake_reply: [u8; 2],
}

/// Client for the streaming protocol
pub struct StreamClient<T: Transport> {
    transport: T,
    config: StreamConfig,
}

impl<T: Transport> StreamClient<T> {
    /// Wrap a connected transport
    pub fn new(transport: T, config: StreamConfig) -> Self {
        Self { transport, config }
    }

    /// Give the transport back
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Liveness check: send the handshake and wait for two bytes
    pub fn handshake(&mut self) -> Result<[u8; 2]> {
        self.transport.send(&self.config.handshake)?;
        log::debug!("stream: sent handshake {}", format_bytes(&self.config.handshake));
        let mut reply = [0u8; 2];
        self.transport.recv_exact(&mut reply)?;
        log::info!("Receiver answered handshake with {}", format_bytes(&reply));
        Ok(reply)
    }

    /// Send size header and digest
    pub fn send_header(&mut self, session: &TransferSession<'_>) -> Result<()> {
        self.transport.send(&session.size_header())?;
        self.transport.send(session.digest())?;
        log::info!(
            "stream: announced {} bytes, sha256 {}",
            session.size(),
            hex::encode(session.digest())
        );
        Ok(())
    }

    /// Stream every chunk, waiting for the acknowledgment after each
    pub fn send_chunks<P: StreamProgress + ?Sized>(
        &mut self,
        session: &TransferSession<'_>,
        progress: &mut P,
    ) -> Result<usize> {
        let total = session.size() as usize;
        progress.sending(total, session.chunk_count());

        let mut sent = 0;
        for (index, chunk) in session.chunks().enumerate() {
            self.transport.send(chunk)?;
            sent += chunk.len();

            let mut ack = [0u8];
            self.transport.recv_exact(&mut ack)?;
            if ack[0] != self.config.chunk_ack {
                return Err(OtaError::Protocol(format!(
                    "chunk {} acknowledged with 0x{:02X}, expected 0x{:02X}",
                    index, ack[0], self.config.chunk_ack
                )));
            }
            log::debug!("stream: chunk {} ({} bytes) acknowledged", index, chunk.len());
            progress.chunk_acked(index, sent);
        }

        Ok(sent)
    }

    /// Run the whole protocol
    ///
    /// `before_payload` runs after the header went out and before the first
    /// chunk; returning an error aborts the transfer.
    pub fn transfer<P, F>(
        &mut self,
        image: &FirmwareImage,
        progress: &mut P,
        before_payload: F,
    ) -> Result<StreamReport>
    where
        P: StreamProgress + ?Sized,
        F: FnOnce(&TransferSession<'_>) -> Result<()>,
    {
        let session = TransferSession::new(image, self.config.chunk_size)?;
        let handshake_reply = self.handshake()?;
        self.send_header(&session)?;
        before_payload(&session)?;

        let bytes_sent = self.send_chunks(&session, progress)?;
        self.transport.flush()?;
        log::info!(
            "Firmware upload complete. Sent {} bytes in {} chunks",
            bytes_sent,
            session.chunk_count()
        );

        Ok(StreamReport {
            bytes_sent,
            chunks: session.chunk_count(),
            handshake_reply,
        })
    }
}
