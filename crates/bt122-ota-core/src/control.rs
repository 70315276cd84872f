//! Control channel client for the BT122 SPI script
//!
//! Every exchange follows the same shape: one opcode byte plus an optional
//! payload go out in a single write, the module answers with a response whose
//! length depends on the opcode, and then always sends one trailing
//! confirmation byte. [`DfuReset`](ControlOpcode::DfuReset) is the only
//! exception since the module reboots instead of answering.

use crate::address::FlashAddress;
use crate::error::{OtaError, Result};
use crate::opcode::ControlOpcode;
use crate::transport::Transport;
use core::fmt;

/// Largest read or write the one-byte length field can describe
pub const MAX_TRANSFER_LEN: usize = u8::MAX as usize;

/// Number of stage codes reported by a block erase
pub const BLOCK_ERASE_STAGES: usize = 4;

/// Argument byte sent with the LED opcodes, selecting the first LED
pub const LED_ARGUMENT: u8 = 0x01;

/// Two-byte status code returned for flash operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultCode(pub u16);

impl ResultCode {
    /// Build from the two wire bytes
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }

    /// Whether the module reported success
    pub fn is_ok(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Outbound control frame: opcode followed by raw payload bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    /// Operation to perform
    pub opcode: ControlOpcode,
    /// Payload that follows the opcode byte
    pub payload: Vec<u8>,
}

impl ControlFrame {
    /// Frame with no payload
    pub fn bare(opcode: ControlOpcode) -> Self {
        Self {
            opcode,
            payload: Vec::new(),
        }
    }

    /// Frame with a payload
    pub fn with_payload(opcode: ControlOpcode, payload: Vec<u8>) -> Self {
        Self { opcode, payload }
    }

    /// Read request: length byte then address
    pub fn read(addr: FlashAddress, len: u8) -> Self {
        let mut payload = Vec::with_capacity(4);
        payload.push(len);
        payload.extend_from_slice(&addr.to_bytes());
        Self::with_payload(ControlOpcode::Read, payload)
    }

    /// Page write request: address, length byte, data
    ///
    /// `data` must hold 1..=255 bytes so its length fits the length byte.
    pub fn write(addr: FlashAddress, data: &[u8]) -> Result<Self> {
        let len = transfer_len(data.len())?;
        let mut payload = Vec::with_capacity(4 + data.len());
        payload.extend_from_slice(&addr.to_bytes());
        payload.push(len);
        payload.extend_from_slice(data);
        Ok(Self::with_payload(ControlOpcode::PageWrite, payload))
    }

    /// Bytes as they go on the wire
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.payload.len());
        out.push(self.opcode.byte());
        out.extend_from_slice(&self.payload);
        out
    }
}

impl fmt::Display for ControlFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{}", self.opcode.byte(), hex::encode(&self.payload))
    }
}

/// Decoded answer to a flash read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    /// Flash contents
    pub data: Vec<u8>,
    /// Status reported by the module
    pub result: ResultCode,
}

impl ReadResponse {
    /// Decode `[len][data...][result code]`, checking the echoed length
    pub fn decode(requested: u8, raw: &[u8]) -> Result<Self> {
        let len = requested as usize;
        if raw.len() != len + 3 {
            return Err(OtaError::Protocol(format!(
                "read response is {} bytes, expected {}",
                raw.len(),
                len + 3
            )));
        }
        if raw[0] != requested {
            return Err(OtaError::Protocol(format!(
                "module echoed read length {} but {} was requested",
                raw[0], requested
            )));
        }
        Ok(Self {
            data: raw[1..len + 1].to_vec(),
            result: ResultCode::from_bytes([raw[len + 1], raw[len + 2]]),
        })
    }
}

/// Client side of the control channel
pub struct SpiControl<T: Transport> {
    transport: T,
    frames_sent: usize,
}

impl<T: Transport> SpiControl<T> {
    /// Wrap a connected transport
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            frames_sent: 0,
        }
    }

    /// Number of frames written so far
    pub fn frames_sent(&self) -> usize {
        self.frames_sent
    }

    /// Access the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give the transport back
    pub fn into_inner(self) -> T {
        self.transport
    }

    fn send_frame(&mut self, frame: &ControlFrame) -> Result<()> {
        log::trace!("control: -> {} [{}]", frame.opcode.mnemonic(), frame);
        self.transport.send(&frame.encode())?;
        self.frames_sent += 1;
        Ok(())
    }

    /// Generic request/response exchange
    ///
    /// Sends the frame, reads `response_len` bytes if non-zero and then the
    /// trailing confirmation byte. Returns only the response bytes.
    pub fn exchange(&mut self, frame: &ControlFrame, response_len: usize) -> Result<Vec<u8>> {
        self.send_frame(frame)?;

        let response = self.transport.recv(response_len)?;
        if !response.is_empty() {
            log::trace!("control: <- {}", hex::encode(&response));
        }

        let mut confirmation = [0u8];
        self.transport.recv_exact(&mut confirmation)?;
        log::trace!("control: <- confirmation {:02x}", confirmation[0]);

        Ok(response)
    }

    /// Round-trip `data` through the module
    pub fn echo(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let frame = ControlFrame::with_payload(ControlOpcode::Echo, data.to_vec());
        let reply = self.exchange(&frame, data.len())?;
        if reply != data {
            return Err(OtaError::Protocol(format!(
                "echo returned {} instead of {}",
                hex::encode(&reply),
                hex::encode(data)
            )));
        }
        log::debug!("control: echo of {} bytes ok", data.len());
        Ok(reply)
    }

    /// Read `len` bytes of flash starting at `addr`
    pub fn read(&mut self, addr: FlashAddress, len: usize) -> Result<ReadResponse> {
        let requested = transfer_len(len)?;
        let raw = self.exchange(&ControlFrame::read(addr, requested), len + 3)?;
        let response = ReadResponse::decode(requested, &raw)?;
        log::debug!(
            "control: read {} bytes at {} (result {})",
            len,
            addr,
            response.result
        );
        Ok(response)
    }

    /// Page write `data` at `addr`
    pub fn write(&mut self, addr: FlashAddress, data: &[u8]) -> Result<ResultCode> {
        let frame = ControlFrame::write(addr, data)?;
        let raw = self.exchange(&frame, 2)?;
        let result = ResultCode::from_bytes([raw[0], raw[1]]);
        log::debug!(
            "control: wrote {} bytes at {} (result {})",
            data.len(),
            addr,
            result
        );
        Ok(result)
    }

    /// Erase the whole flash chip
    pub fn chip_erase(&mut self) -> Result<ResultCode> {
        let raw = self.exchange(&ControlFrame::bare(ControlOpcode::ChipErase), 2)?;
        let result = ResultCode::from_bytes([raw[0], raw[1]]);
        log::debug!("control: chip erase result {}", result);
        Ok(result)
    }

    /// Erase a block, collecting the four stage codes
    pub fn block_erase(&mut self) -> Result<[ResultCode; BLOCK_ERASE_STAGES]> {
        self.send_frame(&ControlFrame::bare(ControlOpcode::BlockErase))?;

        let mut codes = [ResultCode::default(); BLOCK_ERASE_STAGES];
        for (stage, code) in codes.iter_mut().enumerate() {
            let mut raw = [0u8; 2];
            self.transport.recv_exact(&mut raw)?;
            *code = ResultCode::from_bytes(raw);
            log::debug!("control: block erase stage {} result {}", stage, code);
        }

        let mut confirmation = [0u8];
        self.transport.recv_exact(&mut confirmation)?;
        Ok(codes)
    }

    /// Read the flash status register
    pub fn read_status_register(&mut self) -> Result<u8> {
        let raw = self.exchange(&ControlFrame::bare(ControlOpcode::ReadStatusRegister), 1)?;
        log::debug!("control: status register 0x{:02X}", raw[0]);
        Ok(raw[0])
    }

    /// Set the write enable latch
    pub fn write_enable(&mut self) -> Result<()> {
        self.exchange(&ControlFrame::bare(ControlOpcode::WriteEnable), 0)?;
        Ok(())
    }

    /// Switch the status LED on or off
    pub fn set_led(&mut self, on: bool) -> Result<()> {
        let opcode = if on {
            ControlOpcode::LedOn
        } else {
            ControlOpcode::LedOff
        };
        self.exchange(&ControlFrame::with_payload(opcode, vec![LED_ARGUMENT]), 0)?;
        Ok(())
    }

    /// Reboot the module into DFU mode
    ///
    /// Nothing is read back: the module resets instead of answering.
    pub fn dfu_reset(&mut self) -> Result<()> {
        self.send_frame(&ControlFrame::bare(ControlOpcode::DfuReset))?;
        self.transport.flush()?;
        log::info!("control: reset into DFU boot mode requested");
        Ok(())
    }
}

fn transfer_len(len: usize) -> Result<u8> {
    if len == 0 || len > MAX_TRANSFER_LEN {
        return Err(OtaError::InvalidParameter(format!(
            "transfer length {} outside 1..={}",
            len, MAX_TRANSFER_LEN
        )));
    }
    Ok(len as u8)
}
