// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Binary serial framing.
//!
//! Frame boundaries are not part of the byte stream, they are detected
//! from line silence by [`crate::transport::serial::FrameAssembler`].

use bytes::{BufMut as _, Bytes, BytesMut};

use crate::frame::{Adu, Header};

use super::{DecodedFrame, MAX_PDU_SIZE};

/// Unit id, function code and CRC.
pub(crate) const MIN_FRAME_LEN: usize = 4;

/// Unit id, PDU and CRC.
pub(crate) const MAX_FRAME_LEN: usize = 1 + MAX_PDU_SIZE + 2;

/// CRC-16/MODBUS: reflected polynomial 0xA001, seed 0xFFFF.
pub(crate) fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF;
    for x in data {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            let crc_odd = (crc & 0x0001) != 0;
            crc >>= 1;
            if crc_odd {
                crc ^= 0xA001;
            }
        }
    }
    crc
}

pub(crate) fn encode_frame(adu: &Adu, buf: &mut BytesMut) {
    let start = buf.len();
    buf.reserve(adu.pdu.len() + 3);
    buf.put_u8(adu.hdr.unit_id);
    buf.put_slice(&adu.pdu);
    let crc = crc16(&buf[start..]);
    // The CRC is the only little-endian field of the protocol.
    buf.put_u16_le(crc);
}

/// Check and strip the CRC of a complete frame.
pub(crate) fn decode_frame(frame: &[u8]) -> DecodedFrame<Adu> {
    if frame.len() < MIN_FRAME_LEN {
        return DecodedFrame::Discarded("frame too short");
    }
    if frame.len() > MAX_FRAME_LEN {
        return DecodedFrame::Discarded("frame too long");
    }
    let (data, crc) = frame.split_at(frame.len() - 2);
    let expected_crc = u16::from_le_bytes([crc[0], crc[1]]);
    let actual_crc = crc16(data);
    if expected_crc != actual_crc {
        log::debug!(
            "Invalid CRC: expected = 0x{expected_crc:04X}, actual = 0x{actual_crc:04X}"
        );
        return DecodedFrame::Discarded("CRC mismatch");
    }
    let hdr = Header {
        transaction_id: 0,
        unit_id: data[0],
    };
    DecodedFrame::Frame(Adu {
        hdr,
        pdu: Bytes::copy_from_slice(&data[1..]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16() {
        let msg = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(crc16(&msg), 0x0A84);

        let msg = [0x01, 0x03, 0x08, 0x2B, 0x00, 0x02];
        assert_eq!(crc16(&msg), 0x63B6);

        let msg = [0x01, 0x03, 0x04, 0x00, 0x20, 0x00, 0x00];
        assert_eq!(crc16(&msg), 0xF9FB);
    }

    #[test]
    fn encode_read_request() {
        let adu = Adu {
            hdr: Header {
                transaction_id: 0,
                unit_id: 0x01,
            },
            pdu: Bytes::from_static(&[0x03, 0x00, 0x00, 0x00, 0x01]),
        };
        let mut buf = BytesMut::new();
        encode_frame(&adu, &mut buf);
        assert_eq!(
            &buf[..],
            &[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]
        );
    }

    #[test]
    fn decode_response() {
        let frame = [0x01, 0x03, 0x02, 0x00, 0xFB, 0xF9, 0xC7];
        let DecodedFrame::Frame(adu) = decode_frame(&frame) else {
            panic!("unexpected discarded frame");
        };
        assert_eq!(adu.hdr.unit_id, 0x01);
        assert_eq!(&adu.pdu[..], &[0x03, 0x02, 0x00, 0xFB]);
    }

    #[test]
    fn decode_exception_response() {
        let frame = [0x66, 0x82, 0x03, 0xB1, 0x7E];
        let DecodedFrame::Frame(adu) = decode_frame(&frame) else {
            panic!("unexpected discarded frame");
        };
        assert_eq!(adu.hdr.unit_id, 0x66);
        assert_eq!(&adu.pdu[..], &[0x82, 0x03]);
    }

    #[test]
    fn discard_frame_with_invalid_crc() {
        let frame = [0x01, 0x03, 0x02, 0x00, 0xFB, 0xF9, 0xC8];
        assert_eq!(decode_frame(&frame), DecodedFrame::Discarded("CRC mismatch"));
    }

    #[test]
    fn discard_short_frame() {
        assert!(matches!(
            decode_frame(&[0x01, 0x03, 0x84]),
            DecodedFrame::Discarded(_)
        ));
    }
}
