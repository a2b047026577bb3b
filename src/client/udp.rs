// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! UDP client connections

use std::{io, net::SocketAddr};

use crate::transport::udp::UdpTransport;

use super::*;

/// Send requests to a Modbus UDP device.
pub async fn connect(socket_addr: SocketAddr) -> io::Result<Context> {
    connect_slave(socket_addr, Slave::tcp_device()).await
}

/// Send requests to a device behind a Modbus UDP gateway.
pub async fn connect_slave(socket_addr: SocketAddr, slave: Slave) -> io::Result<Context> {
    connect_with_config(socket_addr, slave, ClientConfig::default()).await
}

pub async fn connect_with_config(
    socket_addr: SocketAddr,
    slave: Slave,
    config: ClientConfig,
) -> io::Result<Context> {
    let transport = UdpTransport::connect(socket_addr).await?;
    let client: Box<dyn Client> = Box::new(Executor::new(transport, slave, config));
    Ok(Context::from(client))
}
