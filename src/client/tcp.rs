// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TCP client connections

use std::{fmt, io, net::SocketAddr};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::transport::{tcp::TcpTransport, Transport};

use super::*;

/// Establish a direct connection to a Modbus TCP coupler.
pub async fn connect(socket_addr: SocketAddr) -> io::Result<Context> {
    connect_slave(socket_addr, Slave::tcp_device()).await
}

/// Connect to a physical, broadcast, or custom Modbus device,
/// probably through a Modbus TCP gateway that is forwarding
/// messages to/from the corresponding slave device.
pub async fn connect_slave(socket_addr: SocketAddr, slave: Slave) -> io::Result<Context> {
    connect_with_config(socket_addr, slave, ClientConfig::default()).await
}

/// Connect with custom timeout and retry settings.
///
/// The connection is reestablished on demand if
/// [`ClientConfig::reconnect_on_retry`] is set.
pub async fn connect_with_config(
    socket_addr: SocketAddr,
    slave: Slave,
    config: ClientConfig,
) -> io::Result<Context> {
    let transport = TcpTransport::connect(socket_addr).await?;
    Ok(context(Executor::new(transport, slave, config)))
}

/// Attach a new client context to a direct transport connection.
pub fn attach<T>(transport: T) -> Context
where
    T: AsyncRead + AsyncWrite + fmt::Debug + Send + Unpin + 'static,
{
    attach_slave(transport, Slave::tcp_device())
}

/// Attach a new client context to a transport connection.
pub fn attach_slave<T>(transport: T, slave: Slave) -> Context
where
    T: AsyncRead + AsyncWrite + fmt::Debug + Send + Unpin + 'static,
{
    context(Executor::new(
        TcpTransport::new(transport),
        slave,
        ClientConfig::default(),
    ))
}

fn context(executor: Executor<impl Transport + 'static>) -> Context {
    let client: Box<dyn Client> = Box::new(executor);
    Context::from(client)
}
