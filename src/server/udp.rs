// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus UDP server

use std::{io, net::SocketAddr};

use crate::{
    frame::{ExceptionCode, Response, SlaveRequest},
    transport::udp::UdpTransport,
};

use super::{process, Service};

/// Bind to `socket_addr` and answer datagrams until the socket fails.
///
/// Each response is sent to the peer of the corresponding request.
pub async fn serve<S>(socket_addr: SocketAddr, service: S) -> io::Result<()>
where
    S: Service<
        Request = SlaveRequest<'static>,
        Response = Option<Response>,
        Exception = ExceptionCode,
    >,
{
    let transport = UdpTransport::bind(socket_addr).await?;
    log::debug!("Serving UDP requests on {}", transport.local_addr()?);
    process(transport, service).await;
    Ok(())
}
