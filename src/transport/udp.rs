// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MBAP framing over datagrams

use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
};

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::net::UdpSocket;
use tokio_util::codec::Encoder as _;

use crate::{
    codec::{
        tcp::{decode_datagram, AduCodec},
        DecodedFrame,
    },
    frame::{Adu, Framing},
};

use super::Transport;

/// Large enough for any MBAP frame.
const MAX_DATAGRAM_SIZE: usize = 260;

/// A datagram transport, one ADU per datagram.
///
/// A connected transport talks to a single peer. A bound transport
/// answers whichever peer sent the last datagram.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
    connected: bool,
}

impl UdpTransport {
    /// Create a client side transport for `peer`.
    pub async fn connect(peer: SocketAddr) -> io::Result<Self> {
        let local_addr: SocketAddr = if peer.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local_addr).await?;
        socket.connect(peer).await?;
        Ok(Self {
            socket,
            peer: Some(peer),
            connected: true,
        })
    }

    /// Create a server side transport listening on `local_addr`.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(local_addr).await?;
        Ok(Self::from_socket(socket))
    }

    /// Wrap an already bound, unconnected socket.
    #[must_use]
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket,
            peer: None,
            connected: false,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn framing(&self) -> Framing {
        Framing::Udp
    }

    async fn write_adu(&mut self, adu: Adu) -> io::Result<()> {
        let mut buf = BytesMut::new();
        AduCodec.encode(adu, &mut buf)?;
        if self.connected {
            self.socket.send(&buf).await?;
            return Ok(());
        }
        let Some(peer) = self.peer else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no peer to answer",
            ));
        };
        self.socket.send_to(&buf, peer).await?;
        Ok(())
    }

    async fn read_adu(&mut self) -> io::Result<Option<Adu>> {
        let mut buf = [0; MAX_DATAGRAM_SIZE];
        let (len, peer) = self.socket.recv_from(&mut buf).await?;
        if !self.connected {
            self.peer = Some(peer);
        }
        match decode_datagram(&buf[..len]) {
            DecodedFrame::Frame(adu) => Ok(Some(adu)),
            DecodedFrame::Discarded(reason) => {
                log::debug!("Discarded datagram from {peer}: {reason}");
                Ok(None)
            }
        }
    }

    async fn reconnect(&mut self) -> io::Result<()> {
        // Datagram sockets carry no connection state.
        Ok(())
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        Ok(())
    }
}
