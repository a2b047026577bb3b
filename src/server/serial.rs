// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU and ASCII slaves

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    frame::{ExceptionCode, Response, SlaveRequest},
    transport::serial::{AsciiTransport, RtuTransport, SerialConfig},
};

use super::{process, Service};

/// Answer RTU requests on a serial line until it is closed.
///
/// Use [`super::ImageService::with_slave`] to ignore requests for other
/// devices on the same line.
pub async fn serve_rtu<T, S>(stream: T, config: SerialConfig, service: S)
where
    T: AsyncRead + AsyncWrite + fmt::Debug + Send + Unpin,
    S: Service<
        Request = SlaveRequest<'static>,
        Response = Option<Response>,
        Exception = ExceptionCode,
    >,
{
    process(RtuTransport::new(stream, config), service).await;
}

/// Answer ASCII requests on a serial line until it is closed.
pub async fn serve_ascii<T, S>(stream: T, config: SerialConfig, service: S)
where
    T: AsyncRead + AsyncWrite + fmt::Debug + Send + Unpin,
    S: Service<
        Request = SlaveRequest<'static>,
        Response = Option<Response>,
        Exception = ExceptionCode,
    >,
{
    process(AsciiTransport::new(stream, config), service).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::{duplex, AsyncReadExt as _, AsyncWriteExt as _};

    use crate::{image::ProcessImage, server::ImageService, slave::Slave};

    use super::*;

    #[tokio::test]
    async fn ascii_slave_ignores_other_units() {
        let image = Arc::new(ProcessImage::new());
        {
            let mut registers = image.holding_registers_mut();
            registers.add(0x6B, 0xAE41, true).unwrap();
            registers.add(0x6C, 0x5652, true).unwrap();
            registers.add(0x6D, 0x4340, true).unwrap();
        }
        let service = ImageService::new(image).with_slave(Slave(0x11));

        let (local, mut line) = duplex(256);
        let server = tokio::spawn(serve_ascii(local, SerialConfig::default(), service));

        // Request for another device, then for this one
        line.write_all(b":1203006B00037D\r\n").await.unwrap();
        line.write_all(b":1103006B00037E\r\n").await.unwrap();

        let expected = b":110306AE4156524340CC\r\n";
        let mut rsp = [0; 23];
        line.read_exact(&mut rsp).await.unwrap();
        assert_eq!(&rsp, expected);

        drop(line);
        server.await.unwrap();
    }
}
