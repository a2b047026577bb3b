// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hex encoded serial framing: `':' hex(unit pdu lrc) CR LF`.

use std::io::{self, Error};

use bytes::{Buf as _, BufMut as _, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{Adu, Header};

use super::{DecodedFrame, MAX_PDU_SIZE};

const START: u8 = b':';

const END: &[u8; 2] = b"\r\n";

/// Start character, hex encoded unit id, PDU and LRC, CR LF.
const MAX_FRAME_LEN: usize = frame_len(MAX_PDU_SIZE);

/// Number of characters on the wire for a PDU of `pdu_len` bytes.
pub(crate) const fn frame_len(pdu_len: usize) -> usize {
    1 + 2 * (1 + pdu_len + 1) + 2
}

/// Longitudinal redundancy check: two's complement of the byte sum.
pub(crate) fn lrc(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |acc, byte| acc.wrapping_add(*byte))
        .wrapping_neg()
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct AsciiCodec;

impl Decoder for AsciiCodec {
    type Item = DecodedFrame<Adu>;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        // Everything before the start character is line noise.
        match buf.iter().position(|b| *b == START) {
            Some(start) => buf.advance(start),
            None => {
                buf.clear();
                return Ok(None);
            }
        }
        let Some(end) = buf.windows(END.len()).position(|w| w == END) else {
            if buf.len() > MAX_FRAME_LEN {
                buf.clear();
                return Ok(Some(DecodedFrame::Discarded("frame too long")));
            }
            return Ok(None);
        };
        let frame = buf.split_to(end + END.len());
        // A start character inside a frame restarts the frame.
        let start = frame[..end].iter().rposition(|b| *b == START).unwrap_or(0);
        if start > 0 {
            log::debug!("Dropping {start} byte(s) of an interrupted frame");
        }
        Ok(Some(decode_frame(&frame[start + 1..end])))
    }
}

impl Encoder<Adu> for AsciiCodec {
    type Error = Error;

    fn encode(&mut self, adu: Adu, buf: &mut BytesMut) -> io::Result<()> {
        if adu.pdu.len() > MAX_PDU_SIZE {
            return Err(Error::new(io::ErrorKind::InvalidInput, "PDU size exceeded"));
        }
        let mut data = Vec::with_capacity(adu.pdu.len() + 2);
        data.push(adu.hdr.unit_id);
        data.extend_from_slice(&adu.pdu);
        data.push(lrc(&data));
        buf.reserve(1 + data.len() * 2 + END.len());
        buf.put_u8(START);
        buf.put_slice(hex::encode_upper(&data).as_bytes());
        buf.put_slice(END);
        Ok(())
    }
}

/// Decode the hex characters between start character and CR LF.
fn decode_frame(text: &[u8]) -> DecodedFrame<Adu> {
    if text.len() % 2 != 0 {
        return DecodedFrame::Discarded("odd number of hex characters");
    }
    let Ok(data) = hex::decode(text) else {
        return DecodedFrame::Discarded("invalid hex character");
    };
    // unit id, function code and LRC
    if data.len() < 3 {
        return DecodedFrame::Discarded("frame too short");
    }
    let (data, checksum) = data.split_at(data.len() - 1);
    let actual = lrc(data);
    if checksum[0] != actual {
        log::debug!(
            "Invalid LRC: expected = 0x{:02X}, actual = 0x{actual:02X}",
            checksum[0]
        );
        return DecodedFrame::Discarded("LRC mismatch");
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
