// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP server

use std::{fmt, future::Future, io, net::SocketAddr};

use socket2::{Domain, Socket, Type};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
};

use crate::{
    frame::{ExceptionCode, Response, SlaveRequest},
    transport::tcp::TcpTransport,
};

use super::{process, Service};

/// Accept a connection and create a service instance for it.
///
/// `new_service` may decline the connection by returning `Ok(None)`.
pub fn accept_tcp_connection<S, NewService>(
    stream: TcpStream,
    socket_addr: SocketAddr,
    new_service: NewService,
) -> io::Result<Option<(S, TcpStream)>>
where
    S: Service + Send + Sync + 'static,
    NewService: Fn(SocketAddr) -> io::Result<Option<S>>,
{
    let service = new_service(socket_addr)?;
    Ok(service.map(|service| (service, stream)))
}

/// Open a listening socket that may be rebound while old connections linger.
pub fn listener(socket_addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(socket_addr), Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(1024)?;
    TcpListener::from_std(socket.into())
}

#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
}

/// Why [`Server::serve_until`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminated {
    Finished,
    Aborted,
}

impl Server {
    /// Attach the Modbus server to a TCP socket server.
    #[must_use]
    pub fn new(listener: TcpListener) -> Self {
        Self { listener }
    }

    /// Listen on `socket_addr`.
    pub fn bind(socket_addr: SocketAddr) -> io::Result<Self> {
        listener(socket_addr).map(Self::new)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Listens for incoming connections and starts a Modbus TCP server task for
    /// each connection.
    ///
    /// `OnConnected` is responsible for creating both the service and the
    /// transport layer for the underlying TCP stream. If `OnConnected` returns
    /// with `Err` then listening stops and [`Self::serve()`] returns with an error.
    /// If `OnConnected` returns `Ok(None)` then the connection is rejected
    /// but [`Self::serve()`] continues listening for new connections.
    pub async fn serve<S, T, F, OnConnected>(&self, on_connected: &OnConnected) -> io::Result<()>
    where
        S: Service<
                Request = SlaveRequest<'static>,
                Response = Option<Response>,
                Exception = ExceptionCode,
            > + Send
            + Sync
            + 'static,
        T: AsyncRead + AsyncWrite + fmt::Debug + Send + Unpin + 'static,
        OnConnected: Fn(TcpStream, SocketAddr) -> F,
        F: Future<Output = io::Result<Option<(S, T)>>>,
    {
        loop {
            let (stream, socket_addr) = self.listener.accept().await?;
            log::debug!("Accepted connection from {socket_addr}");

            let Some((service, transport)) = on_connected(stream, socket_addr).await? else {
                log::debug!("No service for connection from {socket_addr}");
                continue;
            };

            tokio::spawn(async move {
                process(TcpTransport::new(transport), service).await;
                log::debug!("Connection from {socket_addr} closed");
            });
        }
    }

    /// Start an abortable Modbus TCP server task.
    ///
    /// Warning: Request processing is not scoped and could be aborted at any internal await point!
    /// See also: <https://rust-lang.github.io/wg-async/vision/roadmap/scopes.html#cancellation>
    pub async fn serve_until<S, T, F, X, OnConnected>(
        self,
        on_connected: &OnConnected,
        abort_signal: X,
    ) -> io::Result<Terminated>
    where
        S: Service<
                Request = SlaveRequest<'static>,
                Response = Option<Response>,
                Exception = ExceptionCode,
            > + Send
            + Sync
            + 'static,
        T: AsyncRead + AsyncWrite + fmt::Debug + Send + Unpin + 'static,
        X: Future<Output = ()> + Sync + Send + Unpin + 'static,
        OnConnected: Fn(TcpStream, SocketAddr) -> F,
        F: Future<Output = io::Result<Option<(S, T)>>>,
    {
        tokio::select! {
            res = self.serve(on_connected) => {
                res.map(|()| Terminated::Finished)
            },
            () = abort_signal => {
                Ok(Terminated::Aborted)
            }
        }
    }
}
