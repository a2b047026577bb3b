// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Framed links between master and slave.
//!
//! A [`Transport`] moves complete [`Adu`]s over one link and hides the
//! envelope of the underlying framing. Both the client executor and the
//! server loop are written against this trait only.

#[cfg(feature = "rtu")]
pub mod serial;

#[cfg(feature = "tcp")]
pub mod tcp;

#[cfg(feature = "tcp")]
pub mod udp;

use std::{fmt::Debug, future::Future, io, pin::Pin};

use async_trait::async_trait;

use crate::frame::{Adu, Framing};

/// Opens a fresh I/O stream, e.g. to reconnect a broken TCP connection
/// or to reopen a serial port.
pub type Connector<T> =
    Box<dyn FnMut() -> Pin<Box<dyn Future<Output = io::Result<T>> + Send>> + Send>;

/// Transport independent frame I/O.
#[async_trait]
pub trait Transport: Send + Debug {
    /// The envelope used on the link.
    fn framing(&self) -> Framing;

    /// Frame and send a single ADU.
    async fn write_adu(&mut self, adu: Adu) -> io::Result<()>;

    /// Receive the next frame.
    ///
    /// Returns `Ok(None)` if a malformed frame (checksum, envelope) has
    /// been received and discarded.
    async fn read_adu(&mut self) -> io::Result<Option<Adu>>;

    /// Replace the underlying stream with a fresh one.
    async fn reconnect(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "transport cannot reconnect",
        ))
    }

    /// Shut down the underlying stream.
    async fn disconnect(&mut self) -> io::Result<()>;
}

#[async_trait]
impl<T> Transport for Box<T>
where
    T: Transport + ?Sized,
{
    fn framing(&self) -> Framing {
        (**self).framing()
    }

    async fn write_adu(&mut self, adu: Adu) -> io::Result<()> {
        (**self).write_adu(adu).await
    }

    async fn read_adu(&mut self) -> io::Result<Option<Adu>> {
        (**self).read_adu().await
    }

    async fn reconnect(&mut self) -> io::Result<()> {
        (**self).reconnect().await
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        (**self).disconnect().await
    }
}

/// Errors after which the link is unusable until it has been reconnected.
#[must_use]
pub fn is_fatal(err: &io::Error) -> bool {
    use io::ErrorKind::*;
    matches!(
        err.kind(),
        UnexpectedEof | BrokenPipe | ConnectionReset | ConnectionAborted | NotConnected
    )
}

/// Accept a failed shutdown of an already closed stream.
pub(crate) fn ignore_closed(res: io::Result<()>) -> io::Result<()> {
    res.or_else(|err| match err.kind() {
        io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe => Ok(()),
        _ => Err(err),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_fatal_errors() {
        assert!(is_fatal(&io::Error::from(io::ErrorKind::UnexpectedEof)));
        assert!(is_fatal(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!is_fatal(&io::Error::from(io::ErrorKind::InvalidData)));
        assert!(!is_fatal(&io::Error::from(io::ErrorKind::TimedOut)));
    }

    #[test]
    fn shutdown_of_closed_stream() {
        assert!(ignore_closed(Err(io::ErrorKind::NotConnected.into())).is_ok());
        assert!(ignore_closed(Err(io::ErrorKind::PermissionDenied.into())).is_err());
    }
}
