// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::{self, BufRead as _, Cursor, Error, ErrorKind};

use byteorder::{BigEndian, ReadBytesExt as _};
use bytes::{Buf as _, BufMut as _, Bytes, BytesMut};

use crate::{
    frame::{Coil, FileRecord, FileRecordRequest, RequestPdu, ResponsePdu, Word},
    ExceptionCode, ExceptionResponse, FunctionCode, Request, Response,
};

#[cfg(feature = "rtu")]
pub(crate) mod ascii;

#[cfg(feature = "rtu")]
pub(crate) mod rtu;

#[cfg(feature = "tcp")]
pub(crate) mod tcp;

/// Maximum request/response PDU size.
///
/// Identical for all framings.
pub(crate) const MAX_PDU_SIZE: usize = 253;

/// Reference type of every file record sub-request.
const FILE_RECORD_REFERENCE_TYPE: u8 = 0x06;

/// Size of a read file record sub-request on the wire.
const FILE_RECORD_REQUEST_SIZE: usize = 7;

/// Maximum number of entries of a FIFO queue.
pub(crate) const MAX_FIFO_COUNT: usize = 31;

/// Outcome of a frame decoder for a complete frame.
///
/// Malformed frames are consumed and reported instead of failing the
/// stream, so the link can resynchronize on the next frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DecodedFrame<T> {
    Frame(T),
    Discarded(&'static str),
}

#[allow(clippy::cast_possible_truncation)]
fn u16_len(len: usize) -> u16 {
    // This type conversion should always be safe, because either
    // the caller is responsible to pass a valid usize or the
    // possible values are limited by the protocol.
    debug_assert!(len <= u16::MAX.into());
    len as u16
}

#[allow(clippy::cast_possible_truncation)]
fn u8_len(len: usize) -> u8 {
    // This type conversion should always be safe, because either
    // the caller is responsible to pass a valid usize or the
    // possible values are limited by the protocol.
    debug_assert!(len <= u8::MAX.into());
    len as u8
}

fn invalid_data(message: &'static str) -> Error {
    Error::new(ErrorKind::InvalidData, message)
}

pub(crate) fn encode_request_pdu(buf: &mut BytesMut, request: &Request<'_>) {
    use crate::frame::Request::*;
    buf.put_u8(request.function_code().value());
    match request {
        ReadCoils(address, quantity)
        | ReadDiscreteInputs(address, quantity)
        | ReadInputRegisters(address, quantity)
        | ReadHoldingRegisters(address, quantity) => {
            buf.put_u16(*address);
            buf.put_u16(*quantity);
        }
        WriteSingleCoil(address, state) => {
            buf.put_u16(*address);
            buf.put_u16(bool_to_coil(*state));
        }
        WriteMultipleCoils(address, coils) => {
            buf.put_u16(*address);
            buf.put_u16(u16_len(coils.len()));
            buf.put_u8(u8_len(packed_coils_size(coils)));
            encode_packed_coils(buf, coils);
        }
        WriteSingleRegister(address, word) => {
            buf.put_u16(*address);
            buf.put_u16(*word);
        }
        WriteMultipleRegisters(address, words) => {
            buf.put_u16(*address);
            let len = words.len();
            buf.put_u16(u16_len(len));
            buf.put_u8(u8_len(len * 2));
            encode_words(buf, words);
        }
        MaskWriteRegister(address, and_mask, or_mask) => {
            buf.put_u16(*address);
            buf.put_u16(*and_mask);
            buf.put_u16(*or_mask);
        }
        ReadWriteMultipleRegisters(read_address, quantity, write_address, words) => {
            buf.put_u16(*read_address);
            buf.put_u16(*quantity);
            buf.put_u16(*write_address);
            let len = words.len();
            buf.put_u16(u16_len(len));
            buf.put_u8(u8_len(len * 2));
            encode_words(buf, words);
        }
        ReadFileRecord(requests) => {
            buf.put_u8(u8_len(requests.len() * FILE_RECORD_REQUEST_SIZE));
            for req in requests.as_ref() {
                buf.put_u8(FILE_RECORD_REFERENCE_TYPE);
                buf.put_u16(req.file_number);
                buf.put_u16(req.record_number);
                buf.put_u16(req.record_length);
            }
        }
        WriteFileRecord(records) => encode_file_records(buf, records),
        ReadFifoQueue(address) => {
            buf.put_u16(*address);
        }
        Custom(_, custom_data) => {
            buf.put_slice(custom_data.as_ref());
        }
    }
}

pub(crate) fn encode_response_pdu(buf: &mut BytesMut, response: &Response) {
    use crate::frame::Response::*;
    buf.put_u8(response.function_code().value());
    match response {
        ReadCoils(coils) | ReadDiscreteInputs(coils) => {
            buf.put_u8(u8_len(packed_coils_size(coils)));
            encode_packed_coils(buf, coils);
        }
        ReadInputRegisters(registers)
        | ReadHoldingRegisters(registers)
        | ReadWriteMultipleRegisters(registers) => {
            buf.put_u8(u8_len(registers.len() * 2));
            encode_words(buf, registers);
        }
        WriteSingleCoil(address, state) => {
            buf.put_u16(*address);
            buf.put_u16(bool_to_coil(*state));
        }
        WriteMultipleCoils(address, quantity) | WriteMultipleRegisters(address, quantity) => {
            buf.put_u16(*address);
            buf.put_u16(*quantity);
        }
        WriteSingleRegister(address, word) => {
            buf.put_u16(*address);
            buf.put_u16(*word);
        }
        MaskWriteRegister(address, and_mask, or_mask) => {
            buf.put_u16(*address);
            buf.put_u16(*and_mask);
            buf.put_u16(*or_mask);
        }
        ReadFileRecord(blocks) => {
            let data_len: usize = blocks.iter().map(|block| 2 + block.len() * 2).sum();
            buf.put_u8(u8_len(data_len));
            for block in blocks {
                buf.put_u8(u8_len(1 + block.len() * 2));
                buf.put_u8(FILE_RECORD_REFERENCE_TYPE);
                encode_words(buf, block);
            }
        }
        WriteFileRecord(records) => encode_file_records(buf, records),
        ReadFifoQueue(values) => {
            buf.put_u16(u16_len(2 + values.len() * 2));
            buf.put_u16(u16_len(values.len()));
            encode_words(buf, values);
        }
        Custom(_, custom_data) => {
            buf.put_slice(custom_data);
        }
    }
}

pub(crate) fn encode_exception_response_pdu(buf: &mut BytesMut, response: ExceptionResponse) {
    debug_assert!(response.function.value() < 0x80);
    buf.put_u8(response.function.value() + 0x80);
    buf.put_u8(response.exception.into());
}

fn encode_words(buf: &mut BytesMut, words: &[Word]) {
    for word in words {
        buf.put_u16(*word);
    }
}

fn encode_file_records(buf: &mut BytesMut, records: &[FileRecord]) {
    buf.put_u8(u8_len(file_records_size(records)));
    for record in records {
        buf.put_u8(FILE_RECORD_REFERENCE_TYPE);
        buf.put_u16(record.file_number);
        buf.put_u16(record.record_number);
        buf.put_u16(u16_len(record.data.len()));
        encode_words(buf, &record.data);
    }
}

fn file_records_size(records: &[FileRecord]) -> usize {
    records
        .iter()
        .map(|record| FILE_RECORD_REQUEST_SIZE + record.data.len() * 2)
        .sum()
}

/// Encode a request PDU after checking its size.
pub(crate) fn request_to_bytes(request: &Request<'_>) -> io::Result<Bytes> {
    let mut buf = BytesMut::with_capacity(request_pdu_size(request)?);
    encode_request_pdu(&mut buf, request);
    Ok(buf.freeze())
}

/// Encode a response or exception PDU after checking its size.
#[cfg(feature = "server")]
pub(crate) fn response_result_to_bytes(
    result: &Result<Response, ExceptionResponse>,
) -> io::Result<Bytes> {
    let mut buf = BytesMut::with_capacity(response_result_pdu_size(result)?);
    match result {
        Ok(response) => encode_response_pdu(&mut buf, response),
        Err(exception) => encode_exception_response_pdu(&mut buf, *exception),
    }
    Ok(buf.freeze())
}

fn read_u16_be(reader: &mut impl io::Read) -> io::Result<u16> {
    reader.read_u16::<BigEndian>()
}

fn read_words(rdr: &mut Cursor<&Bytes>, quantity: usize) -> io::Result<Vec<Word>> {
    ensure_remaining(rdr, quantity * 2)?;
    let mut data = Vec::with_capacity(quantity);
    for _ in 0..quantity {
        data.push(read_u16_be(rdr)?);
    }
    Ok(data)
}

fn ensure_remaining(rdr: &Cursor<&Bytes>, len: usize) -> io::Result<()> {
    let consumed = usize::try_from(rdr.position()).unwrap_or(usize::MAX);
    if rdr.get_ref().len().saturating_sub(consumed) < len {
        return Err(invalid_data("too short"));
    }
    Ok(())
}

fn read_file_reference_type(rdr: &mut Cursor<&Bytes>) -> io::Result<()> {
    if rdr.read_u8()? != FILE_RECORD_REFERENCE_TYPE {
        return Err(invalid_data("invalid file record reference type"));
    }
    Ok(())
}

fn decode_file_records(rdr: &mut Cursor<&Bytes>) -> io::Result<Vec<FileRecord>> {
    let byte_count = usize::from(rdr.read_u8()?);
    ensure_remaining(rdr, byte_count)?;
    let end = rdr.position() + byte_count as u64;
    let mut records = Vec::new();
    while rdr.position() < end {
        read_file_reference_type(rdr)?;
        let file_number = read_u16_be(rdr)?;
        let record_number = read_u16_be(rdr)?;
        let record_length = read_u16_be(rdr)?;
        let data = read_words(rdr, record_length.into())?;
        records.push(FileRecord {
            file_number,
            record_number,
            data,
        });
    }
    if rdr.position() != end || records.is_empty() {
        return Err(invalid_data("invalid file record byte count"));
    }
    Ok(records)
}

impl TryFrom<Bytes> for Request<'static> {
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        use crate::frame::Request::*;
        if bytes.len() > MAX_PDU_SIZE {
            return Err(invalid_data("request PDU size exceeded"));
        }
        let rdr = &mut Cursor::new(&bytes);
        let fn_code = rdr.read_u8()?;
        let req = match fn_code {
            0x01 => ReadCoils(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x02 => ReadDiscreteInputs(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x05 => WriteSingleCoil(read_u16_be(rdr)?, coil_to_bool(read_u16_be(rdr)?)?),
            0x0F => {
                let address = read_u16_be(rdr)?;
                let quantity = read_u16_be(rdr)?;
                let byte_count = usize::from(rdr.read_u8()?);
                if byte_count != (usize::from(quantity) + 7) / 8 {
                    return Err(invalid_data("invalid quantity"));
                }
                if bytes.len() < 6 + byte_count {
                    return Err(invalid_data("too short"));
                }
                rdr.consume(byte_count);
                let packed_coils = &bytes[6..6 + byte_count];
                WriteMultipleCoils(address, decode_packed_coils(packed_coils, quantity).into())
            }
            0x04 => ReadInputRegisters(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x03 => ReadHoldingRegisters(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x06 => WriteSingleRegister(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x10 => {
                let address = read_u16_be(rdr)?;
                let quantity = usize::from(read_u16_be(rdr)?);
                let byte_count = usize::from(rdr.read_u8()?);
                if byte_count != quantity * 2 {
                    return Err(invalid_data("invalid quantity"));
                }
                WriteMultipleRegisters(address, read_words(rdr, quantity)?.into())
            }
            0x14 => {
                let byte_count = usize::from(rdr.read_u8()?);
                if byte_count == 0 || byte_count % FILE_RECORD_REQUEST_SIZE != 0 {
                    return Err(invalid_data("invalid file record byte count"));
                }
                ensure_remaining(rdr, byte_count)?;
                let mut requests = Vec::with_capacity(byte_count / FILE_RECORD_REQUEST_SIZE);
                for _ in 0..byte_count / FILE_RECORD_REQUEST_SIZE {
                    read_file_reference_type(rdr)?;
                    requests.push(FileRecordRequest {
                        file_number: read_u16_be(rdr)?,
                        record_number: read_u16_be(rdr)?,
                        record_length: read_u16_be(rdr)?,
                    });
                }
                ReadFileRecord(requests.into())
            }
            0x15 => WriteFileRecord(decode_file_records(rdr)?.into()),
            0x16 => {
                let address = read_u16_be(rdr)?;
                let and_mask = read_u16_be(rdr)?;
                let or_mask = read_u16_be(rdr)?;
                MaskWriteRegister(address, and_mask, or_mask)
            }
            0x17 => {
                let read_address = read_u16_be(rdr)?;
                let read_quantity = read_u16_be(rdr)?;
                let write_address = read_u16_be(rdr)?;
                let write_quantity = usize::from(read_u16_be(rdr)?);
                let write_count = usize::from(rdr.read_u8()?);
                if write_count != write_quantity * 2 {
                    return Err(invalid_data("invalid write quantity"));
                }
                let data = read_words(rdr, write_quantity)?;
                ReadWriteMultipleRegisters(read_address, read_quantity, write_address, data.into())
            }
            0x18 => ReadFifoQueue(read_u16_be(rdr)?),
            fn_code if fn_code < 0x80 => {
                // Consume all remaining bytes as custom data.
                return Ok(Custom(fn_code, bytes[1..].to_vec().into()));
            }
            fn_code => {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("invalid function code: 0x{fn_code:02X}"),
                ));
            }
        };
        // Verify that all data has been consumed and decoded.
        if rdr.has_remaining() {
            return Err(invalid_data("undecoded request data"));
        }
        Ok(req)
    }
}

impl TryFrom<Bytes> for RequestPdu<'static> {
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        let pdu = Request::try_from(bytes)?.into();
        Ok(pdu)
    }
}

impl TryFrom<Bytes> for Response {
    type Error = Error;

    #[allow(clippy::too_many_lines)]
    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        use crate::frame::Response::*;
        if bytes.len() > MAX_PDU_SIZE {
            return Err(invalid_data("response PDU size exceeded"));
        }
        let rdr = &mut Cursor::new(&bytes);
        let fn_code = rdr.read_u8()?;
        let rsp = match fn_code {
            0x01 | 0x02 => {
                let byte_count = rdr.read_u8()?;
                if bytes.len() < 2 + usize::from(byte_count) {
                    return Err(invalid_data("too short"));
                }
                let packed_coils = &bytes[2..2 + usize::from(byte_count)];
                rdr.consume(byte_count.into());
                // Here we have no information about the exact requested quantity so we just
                // unpack the whole byte.
                let quantity = u16::from(byte_count) * 8;
                let coils = decode_packed_coils(packed_coils, quantity);
                if fn_code == 0x01 {
                    ReadCoils(coils)
                } else {
                    ReadDiscreteInputs(coils)
                }
            }
            0x05 => WriteSingleCoil(read_u16_be(rdr)?, coil_to_bool(read_u16_be(rdr)?)?),
            0x0F => WriteMultipleCoils(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x03 | 0x04 | 0x17 => {
                let byte_count = usize::from(rdr.read_u8()?);
                if byte_count % 2 != 0 {
                    return Err(invalid_data("invalid quantity"));
                }
                let data = read_words(rdr, byte_count / 2)?;
                match fn_code {
                    0x03 => ReadHoldingRegisters(data),
                    0x04 => ReadInputRegisters(data),
                    _ => ReadWriteMultipleRegisters(data),
                }
            }
            0x06 => WriteSingleRegister(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x10 => WriteMultipleRegisters(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x14 => {
                let data_len = usize::from(rdr.read_u8()?);
                ensure_remaining(rdr, data_len)?;
                let end = rdr.position() + data_len as u64;
                let mut blocks = Vec::new();
                while rdr.position() < end {
                    let block_len = usize::from(rdr.read_u8()?);
                    if block_len == 0 || block_len % 2 == 0 {
                        return Err(invalid_data("invalid file record length"));
                    }
                    read_file_reference_type(rdr)?;
                    blocks.push(read_words(rdr, (block_len - 1) / 2)?);
                }
                if rdr.position() != end {
                    return Err(invalid_data("invalid file record byte count"));
                }
                ReadFileRecord(blocks)
            }
            0x15 => WriteFileRecord(decode_file_records(rdr)?),
            0x16 => {
                let address = read_u16_be(rdr)?;
                let and_mask = read_u16_be(rdr)?;
                let or_mask = read_u16_be(rdr)?;
                MaskWriteRegister(address, and_mask, or_mask)
            }
            0x18 => {
                let byte_count = usize::from(read_u16_be(rdr)?);
                let fifo_count = usize::from(read_u16_be(rdr)?);
                if byte_count != 2 + fifo_count * 2 || fifo_count > MAX_FIFO_COUNT {
                    return Err(invalid_data("invalid FIFO count"));
                }
                ReadFifoQueue(read_words(rdr, fifo_count)?)
            }
            _ => {
                // Consume all remaining bytes as custom data.
                let mut bytes = bytes;
                return Ok(Custom(fn_code, bytes.split_off(1)));
            }
        };
        // Verify that all data has been consumed and decoded.
        if rdr.has_remaining() {
            return Err(invalid_data("undecoded response data"));
        }
        Ok(rsp)
    }
}

impl TryFrom<Bytes> for ExceptionResponse {
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        let mut rdr = Cursor::new(&bytes);
        let fn_err_code = rdr.read_u8()?;
        if fn_err_code < 0x80 {
            return Err(invalid_data("invalid exception function code"));
        }
        let function = fn_err_code - 0x80;
        let exception = ExceptionCode::new(rdr.read_u8()?);
        if rdr.has_remaining() {
            return Err(invalid_data("undecoded exception data"));
        }
        Ok(ExceptionResponse {
            function: FunctionCode::new(function),
            exception,
        })
    }
}

impl TryFrom<Bytes> for ResponsePdu {
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        let fn_code = Cursor::new(&bytes).read_u8()?;
        let pdu = if fn_code < 0x80 {
            Response::try_from(bytes)?.into()
        } else {
            ExceptionResponse::try_from(bytes)?.into()
        };
        Ok(pdu)
    }
}

fn bool_to_coil(state: bool) -> u16 {
    if state {
        0xFF00
    } else {
        0x0000
    }
}

fn coil_to_bool(coil: u16) -> io::Result<bool> {
    match coil {
        0xFF00 => Ok(true),
        0x0000 => Ok(false),
        _ => Err(Error::new(
            ErrorKind::InvalidData,
            format!("invalid coil value: 0x{coil:04X}"),
        )),
    }
}

fn packed_coils_size(coils: &[Coil]) -> usize {
    (coils.len() + 7) / 8
}

fn encode_packed_coils(buf: &mut BytesMut, coils: &[Coil]) -> usize {
    let packed_coils_size = packed_coils_size(coils);
    let offset = buf.len();
    buf.resize(offset + packed_coils_size, 0);
    let buf = &mut buf[offset..];
    for (i, b) in coils.iter().enumerate() {
        let v = u8::from(*b); // 0 or 1
        buf[i / 8] |= v << (i % 8);
    }
    packed_coils_size
}

fn decode_packed_coils(bytes: &[u8], count: u16) -> Vec<Coil> {
    let mut res = Vec::with_capacity(count.into());
    for i in 0usize..count.into() {
        res.push((bytes[i / 8] >> (i % 8)) & 0b1 > 0);
    }
    res
}

pub(crate) fn request_pdu_size(request: &Request<'_>) -> io::Result<usize> {
    use crate::frame::Request::*;
    let size = match request {
        ReadCoils(_, _)
        | ReadDiscreteInputs(_, _)
        | ReadInputRegisters(_, _)
        | ReadHoldingRegisters(_, _)
        | WriteSingleRegister(_, _)
        | WriteSingleCoil(_, _) => 5,
        WriteMultipleCoils(_, coils) => 6 + packed_coils_size(coils),
        WriteMultipleRegisters(_, data) => 6 + data.len() * 2,
        MaskWriteRegister(_, _, _) => 7,
        ReadWriteMultipleRegisters(_, _, _, data) => 10 + data.len() * 2,
        ReadFileRecord(requests) => 2 + requests.len() * FILE_RECORD_REQUEST_SIZE,
        WriteFileRecord(records) => 2 + file_records_size(records),
        ReadFifoQueue(_) => 3,
        Custom(_, data) => 1 + data.len(),
    };
    if size > MAX_PDU_SIZE {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "request PDU size exceeded",
        ));
    }
    Ok(size)
}

pub(crate) fn response_pdu_size(response: &Response) -> io::Result<usize> {
    use crate::frame::Response::*;
    let size = match response {
        ReadCoils(coils) | ReadDiscreteInputs(coils) => 2 + packed_coils_size(coils),
        WriteSingleCoil(_, _)
        | WriteMultipleCoils(_, _)
        | WriteMultipleRegisters(_, _)
        | WriteSingleRegister(_, _) => 5,
        ReadInputRegisters(data)
        | ReadHoldingRegisters(data)
        | ReadWriteMultipleRegisters(data) => 2 + data.len() * 2,
        MaskWriteRegister(_, _, _) => 7,
        ReadFileRecord(blocks) => 2 + blocks.iter().map(|b| 2 + b.len() * 2).sum::<usize>(),
        WriteFileRecord(records) => 2 + file_records_size(records),
        ReadFifoQueue(values) => 5 + values.len() * 2,
        Custom(_, data) => 1 + data.len(),
    };
    if size > MAX_PDU_SIZE {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "response PDU size exceeded",
        ));
    }
    Ok(size)
}

#[cfg(feature = "server")]
fn response_result_pdu_size(res: &Result<Response, ExceptionResponse>) -> io::Result<usize> {
    match res {
        Ok(rsp) => response_pdu_size(rsp),
        Err(_) => Ok(2),
    }
}
