// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MBAP framing over byte streams

use std::{fmt, io, net::SocketAddr};

use async_trait::async_trait;
use futures_util::{SinkExt as _, StreamExt as _};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt as _},
    net::TcpStream,
};
use tokio_util::codec::Framed;

use crate::{
    codec::{tcp::AduCodec, DecodedFrame},
    frame::{Adu, Framing},
};

use super::{ignore_closed, Connector, Transport};

/// A stream transport with MBAP framing.
///
/// Usually wraps a [`TcpStream`], but any byte stream works.
pub struct TcpTransport<T> {
    framed: Framed<T, AduCodec>,
    connector: Option<Connector<T>>,
}

impl<T> fmt::Debug for TcpTransport<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("stream", self.framed.get_ref())
            .field("reconnectable", &self.connector.is_some())
            .finish()
    }
}

impl<T> TcpTransport<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: T) -> Self {
        Self {
            framed: Framed::new(stream, AduCodec),
            connector: None,
        }
    }

    /// Enable [`Transport::reconnect`].
    #[must_use]
    pub fn with_connector(mut self, connector: Connector<T>) -> Self {
        self.connector = Some(connector);
        self
    }
}

impl TcpTransport<TcpStream> {
    /// Connect to `socket_addr`, reconnecting to the same address on demand.
    pub async fn connect(socket_addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(socket_addr).await?;
        stream.set_nodelay(true)?;
        let connector: Connector<TcpStream> = Box::new(move || {
            Box::pin(async move {
                let stream = TcpStream::connect(socket_addr).await?;
                stream.set_nodelay(true)?;
                Ok(stream)
            })
        });
        Ok(Self::new(stream).with_connector(connector))
    }
}

#[async_trait]
impl<T> Transport for TcpTransport<T>
where
    T: AsyncRead + AsyncWrite + fmt::Debug + Send + Unpin,
{
    fn framing(&self) -> Framing {
        Framing::Tcp
    }

    async fn write_adu(&mut self, adu: Adu) -> io::Result<()> {
        self.framed.send(adu).await
    }

    async fn read_adu(&mut self) -> io::Result<Option<Adu>> {
        match self.framed.next().await {
            Some(Ok(DecodedFrame::Frame(adu))) => Ok(Some(adu)),
            Some(Ok(DecodedFrame::Discarded(reason))) => {
                log::debug!("Discarded TCP frame: {reason}");
                Ok(None)
            }
            Some(Err(err)) => Err(err),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed",
            )),
        }
    }

    async fn reconnect(&mut self) -> io::Result<()> {
        let Some(connector) = self.connector.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "no connector configured",
            ));
        };
        let stream = connector().await?;
        log::debug!("Reconnected TCP transport");
        self.framed = Framed::new(stream, AduCodec);
        Ok(())
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        ignore_closed(self.framed.get_mut().shutdown().await)
    }
}
