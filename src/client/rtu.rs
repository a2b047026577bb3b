// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTU client connections

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::transport::serial::{RtuTransport, SerialConfig};

use super::*;

/// Attach a client context for `slave` to a serial line.
pub fn attach_slave<T>(transport: T, serial: SerialConfig, slave: Slave) -> Context
where
    T: AsyncRead + AsyncWrite + fmt::Debug + Send + Unpin + 'static,
{
    attach_with_config(transport, serial, slave, ClientConfig::default())
}

pub fn attach_with_config<T>(
    transport: T,
    serial: SerialConfig,
    slave: Slave,
    config: ClientConfig,
) -> Context
where
    T: AsyncRead + AsyncWrite + fmt::Debug + Send + Unpin + 'static,
{
    let transport = RtuTransport::new(transport, serial);
    let client: Box<dyn Client> = Box::new(Executor::new(transport, slave, config));
    Context::from(client)
}

/// Open a serial port and connect to a Modbus slave device.
///
/// The port is reopened on demand if
/// [`ClientConfig::reconnect_on_retry`] is set.
#[cfg(feature = "serial")]
pub fn connect_slave(
    path: &str,
    serial: SerialConfig,
    slave: Slave,
    config: ClientConfig,
) -> std::io::Result<Context> {
    let transport = RtuTransport::open(path, serial)?;
    let client: Box<dyn Client> = Box::new(Executor::new(transport, slave, config));
    Ok(Context::from(client))
}
