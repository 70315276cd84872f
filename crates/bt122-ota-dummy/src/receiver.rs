//! Emulated streaming receiver

use bt122_ota_core::error::{OtaError, Result};
use bt122_ota_core::image::{sha256, DIGEST_LEN};
use bt122_ota_core::stream::{DEFAULT_CHUNK_ACK, DEFAULT_CHUNK_SIZE, DEFAULT_HANDSHAKE};
use bt122_ota_core::Transport;
use std::collections::VecDeque;
use std::io;

/// Receiver settings
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Bytes per chunk the receiver counts before acknowledging
    pub chunk_size: usize,
    /// Answer to the handshake
    pub handshake_reply: [u8; 2],
    /// Acknowledgment byte
    pub ack: u8,
    /// Drop the connection once this chunk (0-based) has arrived, without acknowledging it
    pub close_at_chunk: Option<usize>,
    /// Acknowledge this chunk (0-based) with the wrong byte
    pub bad_ack_at: Option<usize>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            handshake_reply: DEFAULT_HANDSHAKE,
            ack: DEFAULT_CHUNK_ACK,
            close_at_chunk: None,
            bad_ack_at: None,
        }
    }
}

/// What the receiver is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverPhase {
    /// Two handshake bytes
    Handshake,
    /// Four byte little-endian size
    Size,
    /// SHA-256 of the payload
    Digest,
    /// Payload chunks
    Payload,
    /// Declared size fully received
    Done,
}

/// STM32 side of the streaming transfer
pub struct DummyStreamReceiver {
    config: ReceiverConfig,
    phase: ReceiverPhase,
    pending: Vec<u8>,
    size: usize,
    digest: [u8; DIGEST_LEN],
    payload: Vec<u8>,
    chunks: usize,
    closed: bool,
    rx: VecDeque<u8>,
}

impl DummyStreamReceiver {
    /// Receiver waiting for the handshake
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            phase: ReceiverPhase::Handshake,
            pending: Vec::new(),
            size: 0,
            digest: [0; DIGEST_LEN],
            payload: Vec::new(),
            chunks: 0,
            closed: false,
            rx: VecDeque::new(),
        }
    }

    /// Current phase
    pub fn phase(&self) -> ReceiverPhase {
        self.phase
    }

    /// Size announced in the header
    pub fn declared_size(&self) -> usize {
        self.size
    }

    /// Payload bytes accepted so far
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Chunks acknowledged so far
    pub fn chunks_acked(&self) -> usize {
        self.chunks
    }

    /// Whether the received payload hashes to the announced digest
    pub fn digest_matches(&self) -> bool {
        self.phase == ReceiverPhase::Done && sha256(&self.payload) == self.digest
    }

    fn take(&mut self, n: usize) -> Option<Vec<u8>> {
        if self.pending.len() < n {
            return None;
        }
        Some(self.pending.drain(..n).collect())
    }

    fn process(&mut self) {
        loop {
            match self.phase {
                ReceiverPhase::Handshake => {
                    let Some(hs) = self.take(2) else { return };
                    log::trace!("receiver: handshake {:02x?}", hs);
                    self.rx.extend(self.config.handshake_reply);
                    self.phase = ReceiverPhase::Size;
                }
                ReceiverPhase::Size => {
                    let Some(raw) = self.take(4) else { return };
                    self.size = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
                    self.phase = ReceiverPhase::Digest;
                }
                ReceiverPhase::Digest => {
                    let Some(raw) = self.take(DIGEST_LEN) else { return };
                    self.digest.copy_from_slice(&raw);
                    self.phase = if self.size == 0 {
                        ReceiverPhase::Done
                    } else {
                        ReceiverPhase::Payload
                    };
                }
                ReceiverPhase::Payload => {
                    let want = self.config.chunk_size.min(self.size - self.payload.len());
                    let Some(chunk) = self.take(want) else { return };
                    let index = self.chunks;
                    if self.config.close_at_chunk == Some(index) {
                        log::debug!("receiver: dropping connection at chunk {}", index);
                        self.closed = true;
                        return;
                    }
                    self.payload.extend_from_slice(&chunk);
                    self.chunks += 1;
                    let ack = if self.config.bad_ack_at == Some(index) {
                        !self.config.ack
                    } else {
                        self.config.ack
                    };
                    self.rx.push_back(ack);
                    if self.payload.len() == self.size {
                        self.phase = ReceiverPhase::Done;
                    }
                }
                ReceiverPhase::Done => {
                    if !self.pending.is_empty() {
                        log::warn!("receiver: {} bytes past the declared size", self.pending.len());
                        self.pending.clear();
                    }
                    return;
                }
            }
        }
    }
}

impl Transport for DummyStreamReceiver {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(OtaError::Transport(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "receiver closed the connection",
            )));
        }
        self.pending.extend_from_slice(data);
        self.process();
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

    fn describe(&self) -> String {
        String::from("dummy stream receiver")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt122_ota_core::stream::NoStreamProgress;
    use bt122_ota_core::{FirmwareImage, StreamClient, StreamConfig};
    use proptest::prelude::*;

    fn image(len: usize) -> FirmwareImage {
        FirmwareImage::from_bytes((0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>())
    }

    fn receiver(chunk_size: usize) -> DummyStreamReceiver {
        DummyStreamReceiver::new(ReceiverConfig {
            chunk_size,
            ..ReceiverConfig::default()
        })
    }

    fn client_config(chunk_size: usize) -> StreamConfig {
        StreamConfig {
            chunk_size,
            ..StreamConfig::default()
        }
    }

    #[test]
    fn test_full_transfer_delivers_image() {
        let img = image(20_000);
        let mut rx = DummyStreamReceiver::new(ReceiverConfig::default());

        let report = StreamClient::new(&mut rx, StreamConfig::default())
            .transfer(&img, &mut NoStreamProgress, |_| Ok(()))
            .unwrap();

        assert_eq!(report.chunks, 3);
        assert_eq!(report.bytes_sent, 20_000);
        assert_eq!(report.handshake_reply, DEFAULT_HANDSHAKE);
        assert_eq!(rx.phase(), ReceiverPhase::Done);
        assert_eq!(rx.declared_size(), 20_000);
        assert_eq!(rx.payload(), img.bytes());
        assert!(rx.digest_matches());
    }

    #[test]
    fn test_failure_at_chunk_three_of_ten() {
        let img = image(100);
        let mut rx = DummyStreamReceiver::new(ReceiverConfig {
            chunk_size: 10,
            close_at_chunk: Some(2),
            ..ReceiverConfig::default()
        });

        let err = StreamClient::new(&mut rx, client_config(10))
            .transfer(&img, &mut NoStreamProgress, |_| Ok(()))
            .unwrap_err();

        assert!(err.is_transport());
        assert_eq!(rx.chunks_acked(), 2);
        assert_eq!(rx.payload(), &img.bytes()[..20]);
        assert!(!rx.digest_matches());
    }

    #[test]
    fn test_bad_ack_aborts() {
        let img = image(64);
        let mut rx = DummyStreamReceiver::new(ReceiverConfig {
            chunk_size: 16,
            bad_ack_at: Some(1),
            ..ReceiverConfig::default()
        });

        let err = StreamClient::new(&mut rx, client_config(16))
            .transfer(&img, &mut NoStreamProgress, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, OtaError::Protocol(_)));
        assert_eq!(rx.chunks_acked(), 2);
        assert_eq!(rx.phase(), ReceiverPhase::Payload);
    }

    #[test]
    fn test_receiver_handles_split_writes() {
        let img = image(50);
        let mut rx = receiver(16);
        let mut wire = vec![0x01, 0x02];
        wire.extend_from_slice(&50u32.to_le_bytes());
        wire.extend_from_slice(&img.sha256());
        wire.extend_from_slice(img.bytes());

        for byte in &wire {
            rx.send(std::slice::from_ref(byte)).unwrap();
        }

        assert!(rx.digest_matches());
        // handshake reply plus one ack per chunk (16 + 16 + 16 + 2)
        assert_eq!(rx.recv(6).unwrap(), vec![0x01, 0x02, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_empty_image() {
        let img = image(0);
        let mut rx = receiver(16);
        StreamClient::new(&mut rx, client_config(16))
            .transfer(&img, &mut NoStreamProgress, |_| Ok(()))
            .unwrap();
        assert_eq!(rx.phase(), ReceiverPhase::Done);
        assert!(rx.digest_matches());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn every_chunk_is_acked_and_delivered(size in 0usize..8192, chunk_size in 1usize..1024) {
            let img = image(size);
            let mut rx = receiver(chunk_size);

            let report = StreamClient::new(&mut rx, client_config(chunk_size))
                .transfer(&img, &mut NoStreamProgress, |_| Ok(()))
                .unwrap();

            let expected = size / chunk_size + usize::from(size % chunk_size > 0);
            prop_assert_eq!(report.chunks, expected);
            prop_assert_eq!(rx.chunks_acked(), expected);
            prop_assert_eq!(report.bytes_sent, size);
            prop_assert_eq!(rx.payload(), img.bytes());
            prop_assert!(rx.digest_matches());
        }
    }
}
