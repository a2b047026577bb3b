// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus server skeleton
//!
//! A server reads requests from a [`Transport`], asks a [`Service`] for
//! the answer and sends it back on the same link. [`ImageService`]
//! answers from a shared [`crate::image::ProcessImage`].

pub mod image;
pub use self::image::ImageService;

mod service;
pub use self::service::Service;

#[cfg(feature = "rtu")]
pub mod serial;

#[cfg(feature = "tcp")]
pub mod tcp;

#[cfg(feature = "tcp")]
pub mod udp;

use bytes::Bytes;

use crate::{
    codec::response_result_to_bytes,
    frame::{Adu, ExceptionCode, ExceptionResponse, FunctionCode, Request, Response, SlaveRequest},
    slave::Slave,
    transport::{is_fatal, Transport},
};

/// The request/response loop of a single link.
///
/// Malformed or undecodable requests are skipped. Returns when the link
/// has been closed or broken.
///
/// Broadcast requests on serial links are executed but never answered.
pub async fn process<T, S>(mut transport: T, service: S)
where
    T: Transport,
    S: Service<
        Request = SlaveRequest<'static>,
        Response = Option<Response>,
        Exception = ExceptionCode,
    >,
{
    loop {
        let adu = match transport.read_adu().await {
            Ok(Some(adu)) => adu,
            Ok(None) => continue,
            Err(err) if is_fatal(&err) => {
                log::debug!("{} link closed: {err}", transport.framing());
                return;
            }
            Err(err) => {
                log::warn!("Failed to receive request: {err}");
                continue;
            }
        };
        let Some(function) = adu.function_code() else {
            log::debug!("Skipping empty request");
            continue;
        };
        let hdr = adu.hdr;
        let request = match Request::try_from(adu.pdu) {
            Ok(request) => request,
            Err(err) => {
                log::debug!("Skipping undecodable request: {err}");
                continue;
            }
        };
        let broadcast = transport.framing().is_headless() && Slave(hdr.unit_id).is_broadcast();
        let result = match service
            .call(SlaveRequest {
                slave: hdr.unit_id,
                request,
            })
            .await
        {
            Ok(Some(response)) => Ok(response),
            Ok(None) => continue,
            Err(exception) => Err(ExceptionResponse {
                function: FunctionCode::new(function),
                exception,
            }),
        };
        if broadcast {
            log::trace!("Not answering broadcast request: {result:?}");
            continue;
        }
        let Some(pdu) = encode_reply(function, &result) else {
            continue;
        };
        match transport.write_adu(Adu { hdr, pdu }).await {
            Ok(()) => (),
            Err(err) if is_fatal(&err) => {
                log::debug!("{} link closed: {err}", transport.framing());
                return;
            }
            Err(err) => log::warn!("Failed to send response: {err}"),
        }
    }
}

/// Encode a reply, falling back to a server device failure if the
/// response cannot be encoded.
fn encode_reply(function: u8, result: &Result<Response, ExceptionResponse>) -> Option<Bytes> {
    let err = match response_result_to_bytes(result) {
        Ok(pdu) => return Some(pdu),
        Err(err) => err,
    };
    log::warn!("Failed to encode response: {err}");
    let failure = Err(ExceptionResponse {
        function: FunctionCode::new(function),
        exception: ExceptionCode::ServerDeviceFailure,
    });
    match response_result_to_bytes(&failure) {
        Ok(pdu) => Some(pdu),
        Err(err) => {
            log::warn!("Failed to encode exception response: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future;

    use tokio::io::{duplex, AsyncReadExt as _, AsyncWriteExt as _};

    use super::*;

    /// Answers register reads with the requested address, rejects
    /// everything else.
    #[derive(Debug)]
    struct EchoAddressService;

    impl Service for EchoAddressService {
        type Request = SlaveRequest<'static>;
        type Response = Option<Response>;
        type Exception = ExceptionCode;
        type Future = future::Ready<Result<Self::Response, Self::Exception>>;

        fn call(&self, req: Self::Request) -> Self::Future {
            future::ready(match req.request {
                Request::ReadHoldingRegisters(addr, 1) => {
                    Ok(Some(Response::ReadHoldingRegisters(vec![addr])))
                }
                Request::WriteSingleRegister(addr, word) => {
                    Ok(Some(Response::WriteSingleRegister(addr, word)))
                }
                Request::ReadInputRegisters(_, cnt) => {
                    Ok(Some(Response::ReadInputRegisters(vec![0; cnt.into()])))
                }
                _ => Err(ExceptionCode::IllegalFunction),
            })
        }
    }

    #[cfg(feature = "tcp")]
    #[tokio::test]
    async fn answer_requests_until_closed() {
        use crate::transport::tcp::TcpTransport;

        let (local, mut remote) = duplex(256);
        let server = tokio::spawn(process(TcpTransport::new(local), EchoAddressService));

        // Garbage with protocol id 1 is skipped
        remote
            .write_all(&[0x00, 0x07, 0x00, 0x01, 0x00, 0x02, 0x01, 0x03])
            .await
            .unwrap();
        remote
            .write_all(&[
                0x00, 0x08, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x2A, 0x00, 0x01,
            ])
            .await
            .unwrap();
        let mut rsp = [0; 11];
        remote.read_exact(&mut rsp).await.unwrap();
        assert_eq!(
            rsp,
            [0x00, 0x08, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x2A]
        );

        remote
            .write_all(&[0x00, 0x09, 0x00, 0x00, 0x00, 0x02, 0x01, 0x07])
            .await
            .unwrap();
        let mut rsp = [0; 9];
        remote.read_exact(&mut rsp).await.unwrap();
        assert_eq!(rsp, [0x00, 0x09, 0x00, 0x00, 0x00, 0x03, 0x01, 0x87, 0x01]);

        drop(remote);
        server.await.unwrap();
    }

    #[cfg(feature = "tcp")]
    #[tokio::test]
    async fn unencodable_response_is_a_device_failure() {
        use crate::transport::tcp::TcpTransport;

        let (local, mut remote) = duplex(256);
        let server = tokio::spawn(process(TcpTransport::new(local), EchoAddressService));

        // 200 registers do not fit into a PDU
        remote
            .write_all(&[
                0x00, 0x03, 0x00, 0x00, 0x00, 0x06, 0x01, 0x04, 0x00, 0x00, 0x00, 0xC8,
            ])
            .await
            .unwrap();
        let mut rsp = [0; 9];
        remote.read_exact(&mut rsp).await.unwrap();
        assert_eq!(rsp, [0x00, 0x03, 0x00, 0x00, 0x00, 0x03, 0x01, 0x84, 0x04]);

        drop(remote);
        server.await.unwrap();
    }

    #[cfg(feature = "tcp")]
    #[tokio::test]
    async fn unit_zero_is_answered_on_tcp() {
        use std::sync::Arc;

        use crate::{
            client::{ClientConfig, Executor},
            image::ProcessImage,
            transport::tcp::TcpTransport,
        };

        let image = Arc::new(ProcessImage::new());
        image.holding_registers_mut().add(0, 251, true).unwrap();
        let (local, remote) = duplex(256);
        let server = tokio::spawn(process(TcpTransport::new(local), ImageService::new(image)));
        let mut master = Executor::new(
            TcpTransport::new(remote),
            Slave::broadcast(),
            ClientConfig::default(),
        );

        let response = master
            .execute(Request::ReadHoldingRegisters(0, 1))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(response, Response::ReadHoldingRegisters(vec![251]));
        drop(master);
        server.await.unwrap();
    }

    #[cfg(feature = "rtu")]
    #[tokio::test]
    async fn broadcast_is_not_answered() {
        use crate::{
            frame::Header,
            transport::serial::{RtuTransport, SerialConfig},
        };

        let config = SerialConfig::new(115_200);
        let (local, remote) = duplex(256);
        let server = tokio::spawn(process(RtuTransport::new(local, config), EchoAddressService));
        let mut master = RtuTransport::new(remote, config);

        master
            .write_adu(Adu {
                hdr: Header {
                    transaction_id: 0,
                    unit_id: 0,
                },
                pdu: Bytes::from_static(&[0x06, 0x00, 0x01, 0x00, 0x02]),
            })
            .await
            .unwrap();
        let request = Adu {
            hdr: Header {
                transaction_id: 0,
                unit_id: 1,
            },
            pdu: Bytes::from_static(&[0x03, 0x00, 0x05, 0x00, 0x01]),
        };
        master.write_adu(request).await.unwrap();

        // Only the second request is answered
        let response = master.read_adu().await.unwrap().unwrap();
        assert_eq!(response.hdr.unit_id, 1);
        assert_eq!(&response.pdu[..], &[0x03, 0x02, 0x00, 0x05]);

        drop(master);
        server.await.unwrap();
    }
}
