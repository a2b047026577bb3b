// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MBAP framing shared by TCP streams and UDP datagrams.

use std::io::{self, Error, ErrorKind};

use byteorder::{BigEndian, ByteOrder as _};
use bytes::{BufMut as _, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{Adu, Header};

use super::{u16_len, DecodedFrame, MAX_PDU_SIZE};

const HEADER_LEN: usize = 7;

const PROTOCOL_ID: u16 = 0x0000; // TCP

/// Symmetric MBAP codec.
///
/// The same codec is used on the client and on the server side, the
/// PDU is passed through undecoded.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct AduCodec;

impl Decoder for AduCodec {
    type Item = DecodedFrame<Adu>;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        // len = bytes of PDU + one byte (unit ID)
        let len = usize::from(BigEndian::read_u16(&buf[4..6]));
        if len < 2 || len - 1 > MAX_PDU_SIZE {
            // No frame boundary left to resynchronize on.
            log::debug!("Invalid MBAP length {len}, dropping {} buffered bytes", buf.len());
            buf.clear();
            return Ok(Some(DecodedFrame::Discarded("invalid MBAP length")));
        }
        let pdu_len = len - 1;
        if buf.len() < HEADER_LEN + pdu_len {
            return Ok(None);
        }

        let header_data = buf.split_to(HEADER_LEN);
        let pdu = buf.split_to(pdu_len).freeze();

        let transaction_id = BigEndian::read_u16(&header_data[0..2]);
        let protocol_id = BigEndian::read_u16(&header_data[2..4]);
        let unit_id = header_data[6];

        if protocol_id != PROTOCOL_ID {
            log::debug!(
                "Invalid protocol identifier 0x{protocol_id:04X} in frame {transaction_id}"
            );
            return Ok(Some(DecodedFrame::Discarded("invalid protocol identifier")));
        }

        let hdr = Header {
            transaction_id,
            unit_id,
        };
        Ok(Some(DecodedFrame::Frame(Adu { hdr, pdu })))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(Error::new(
                ErrorKind::UnexpectedEof,
                "stream closed before the declared frame length",
            )),
        }
    }
}

impl Encoder<Adu> for AduCodec {
    type Error = Error;

    fn encode(&mut self, adu: Adu, buf: &mut BytesMut) -> io::Result<()> {
        let Adu { hdr, pdu } = adu;
        if pdu.len() > MAX_PDU_SIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "PDU size exceeded"));
        }
        buf.reserve(HEADER_LEN + pdu.len());
        buf.put_u16(hdr.transaction_id);
        buf.put_u16(PROTOCOL_ID);
        buf.put_u16(u16_len(pdu.len() + 1));
        buf.put_u8(hdr.unit_id);
        buf.put_slice(&pdu);
        Ok(())
    }
}

/// Decode a single UDP datagram that must contain exactly one ADU.
pub(crate) fn decode_datagram(datagram: &[u8]) -> DecodedFrame<Adu> {
    let mut buf = BytesMut::from(datagram);
    match AduCodec.decode(&mut buf) {
        Ok(Some(frame)) if buf.is_empty() => frame,
        Ok(Some(_)) => DecodedFrame::Discarded("trailing bytes in datagram"),
        Ok(None) => DecodedFrame::Discarded("truncated datagram"),
        Err(_) => DecodedFrame::Discarded("malformed datagram"),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn decode_header_fragment() {
        let mut codec = AduCodec;
        let mut buf = BytesMut::from(&[0x00, 0x11, 0x00, 0x00, 0x00, 0x00][..]);
        let res = codec.decode(&mut buf).unwrap();
        assert!(res.is_none());
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn decode_partly_received_message() {
        let mut codec = AduCodec;
        let mut buf = BytesMut::from(
            &[
                0x00, // transaction id HI
                0x11, // transaction id LO
                0x00, // protocol id HI
                0x00, // protocol id LO
                0x00, // length HI
                0x03, // length LO
                0x66, // unit id
                0x02, // function code
            ][..],
        );
        let res = codec.decode(&mut buf).unwrap();
        assert!(res.is_none());
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn decode_exception_message() {
        let mut codec = AduCodec;
        let mut buf = BytesMut::from(
            &[
                0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x66, 0x82, // exception = 0x80 + 0x02
                0x03, //
                0x00, // next frame
            ][..],
        );
        let DecodedFrame::Frame(adu) = codec.decode(&mut buf).unwrap().unwrap() else {
            panic!("unexpected discarded frame");
        };
        assert_eq!(buf.len(), 1);
        assert_eq!(
            adu.hdr,
            Header {
                transaction_id: 0,
                unit_id: 0x66,
            }
        );
        assert_eq!(&adu.pdu[..], &[0x82, 0x03]);
    }

    #[test]
    fn discard_frame_with_invalid_protocol_id() {
        let mut codec = AduCodec;
        let mut buf = BytesMut::from(
            &[
                0x00, 0x01, 0x33, 0x12, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01,
            ][..],
        );
        let res = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(res, DecodedFrame::Discarded(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn discard_frame_with_invalid_length() {
        let mut codec = AduCodec;
        let mut buf = BytesMut::from(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x01, 0x03][..]);
        let res = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(res, DecodedFrame::Discarded(_)));
        assert!(buf.is_empty());

        let mut buf = BytesMut::from(&[0x00, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x03][..]);
        let res = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(res, DecodedFrame::Discarded(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn truncated_stream_is_a_transport_error() {
        let mut codec = AduCodec;
        let mut buf = BytesMut::from(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03][..]);
        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);

        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn encode_read_request() {
        let mut codec = AduCodec;
        let mut buf = BytesMut::new();
        let adu = Adu {
            hdr: Header {
                transaction_id: 0x1501,
                unit_id: 0x12,
            },
            pdu: Bytes::from_static(&[0x03, 0x00, 0x12, 0x00, 0x04]),
        };
        codec.encode(adu, &mut buf).unwrap();
        assert_eq!(
            &buf[..],
            &[0x15, 0x01, 0x00, 0x00, 0x00, 0x06, 0x12, 0x03, 0x00, 0x12, 0x00, 0x04]
        );
    }

    #[test]
    fn decode_single_datagram() {
        let frame = decode_datagram(&[0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x01, 0x86, 0x02]);
        let DecodedFrame::Frame(adu) = frame else {
            panic!("unexpected discarded frame");
        };
        assert_eq!(adu.hdr.transaction_id, 7);
        assert_eq!(&adu.pdu[..], &[0x86, 0x02]);

        assert!(matches!(
            decode_datagram(&[0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x01, 0x86]),
            DecodedFrame::Discarded(_)
        ));
        assert!(matches!(
            decode_datagram(&[0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x01, 0x86, 0x02, 0xFF]),
            DecodedFrame::Discarded(_)
        ));
    }
}
