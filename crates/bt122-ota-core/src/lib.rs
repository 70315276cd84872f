//! bt122-ota-core - OTA firmware update protocol for BT122 modules
//!
//! This crate contains everything that does not touch real hardware:
//!
//! - the [`Transport`] trait shared by the serial and RFCOMM bindings
//! - the SPI control channel ([`SpiControl`]) that drives the module's
//!   external flash one opcode at a time
//! - the DFU state machine ([`dfu`]) running erase, program, read-back,
//!   verify and reset
//! - the streaming chunked transfer ([`stream`]) for receivers that program
//!   their own flash
//!
//! # Example
//!
//! ```ignore
//! use bt122_ota_core::{dfu, FirmwareImage, SpiControl};
//!
//! let image = FirmwareImage::load("firmware.bin")?;
//! let mut control = SpiControl::new(transport);
//! let report = dfu::perform_dfu(&mut control, &image, Default::default(), &mut dfu::NoProgress)?;
//! println!("{} writes, final state {}", report.writes, report.state);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod address;
pub mod control;
pub mod dfu;
pub mod error;
pub mod hexdump;
pub mod image;
pub mod opcode;
pub mod session;
pub mod stream;
pub mod transport;
pub mod verify;

pub use address::FlashAddress;
pub use control::{ControlFrame, ReadResponse, ResultCode, SpiControl};
pub use dfu::{DfuConfig, DfuProgress, DfuReport, DfuSession, DfuState};
pub use error::{OtaError, Result};
pub use image::FirmwareImage;
pub use opcode::ControlOpcode;
pub use session::Session;
pub use stream::{StreamClient, StreamConfig, StreamProgress, StreamReport, TransferSession};
pub use transport::{BoxedTransport, Transport};
pub use verify::{verify, VerificationResult, VerifyWindow};
