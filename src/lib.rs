// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A [Modbus](https://en.wikipedia.org/wiki/Modbus) and SBus fieldbus
//! engine based on [tokio](https://tokio.rs).
//!
//! The crate provides both roles of the protocol:
//!
//! - the *master* (client) that executes requests with retry, timeout
//!   and response validation, see [`client`],
//! - the *slave* (server) that answers requests from a shared
//!   [`image::ProcessImage`], see [`server`].
//!
//! Both roles run on top of a [`transport::Transport`] which frames
//! protocol data units for TCP, UDP, RTU or ASCII links.
//!
//! ```rust,no_run
//! # #[cfg(feature = "tcp")]
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use tokio_fieldbus::prelude::*;
//!
//! let socket_addr = "192.168.0.222:502".parse()?;
//! let mut ctx = tcp::connect(socket_addr).await?;
//! let data = ctx.read_holding_registers(0x1000, 7).await??;
//! println!("Response is '{data:?}'");
//! # Ok(())
//! # }
//! ```

#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod prelude;

pub mod client;

pub mod transport;

#[cfg(feature = "server")]
pub mod image;

#[cfg(feature = "server")]
pub mod server;

mod codec;

mod error;
pub use self::error::{AttemptFailure, Error, ProtocolError, TransactionError};

mod frame;
#[cfg(feature = "server")]
pub use self::frame::SlaveRequest;
pub use self::frame::{
    Address, Adu, Coil, ExceptionCode, ExceptionResponse, FileRecord, FileRecordRequest, Framing,
    FunctionCode, Header, Quantity, Register, Request, Response, TransactionId, UnitId, Word,
};

mod slave;
pub use self::slave::{Slave, SlaveContext, SlaveId};

/// Specialized [`std::result::Result`] type for
/// _Modbus_ client API results.
///
/// The outer error signals that no usable response has been received.
/// The inner error carries the exception code a device answered with.
pub type Result<T> = std::result::Result<std::result::Result<T, ExceptionCode>, Error>;
