// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

mod register;
pub use self::register::Register;

use std::{
    borrow::Cow,
    error,
    fmt::{self, Display},
};

use bytes::Bytes;

/// A Modbus function code.
///
/// Every code the engine encodes and decodes natively has its own
/// variant, all others are carried through as [`FunctionCode::Custom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    /// 01 (0x01) Read Coils.
    ReadCoils,

    /// 02 (0x02) Read Discrete Inputs
    ReadDiscreteInputs,

    /// 03 (0x03) Read Holding Registers
    ReadHoldingRegisters,

    /// 04 (0x04) Read Input Registers
    ReadInputRegisters,

    /// 05 (0x05) Write Single Coil
    WriteSingleCoil,

    /// 06 (0x06) Write Single Register
    WriteSingleRegister,

    /// 15 (0x0F) Write Multiple Coils
    WriteMultipleCoils,

    /// 16 (0x10) Write Multiple Registers
    WriteMultipleRegisters,

    /// 20 (0x14) Read File Record
    ReadFileRecord,

    /// 21 (0x15) Write File Record
    WriteFileRecord,

    /// 22 (0x16) Mask Write Register
    MaskWriteRegister,

    /// 23 (0x17) Read/Write Multiple Registers
    ReadWriteMultipleRegisters,

    /// 24 (0x18) Read FIFO Queue
    ReadFifoQueue,

    /// Custom function code.
    Custom(u8),
}

impl FunctionCode {
    /// Create a new [`FunctionCode`] with `value`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        match value {
            0x01 => Self::ReadCoils,
            0x02 => Self::ReadDiscreteInputs,
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            0x05 => Self::WriteSingleCoil,
            0x06 => Self::WriteSingleRegister,
            0x0F => Self::WriteMultipleCoils,
            0x10 => Self::WriteMultipleRegisters,
            0x14 => Self::ReadFileRecord,
            0x15 => Self::WriteFileRecord,
            0x16 => Self::MaskWriteRegister,
            0x17 => Self::ReadWriteMultipleRegisters,
            0x18 => Self::ReadFifoQueue,
            code => Self::Custom(code),
        }
    }

    /// Gets the [`u8`] value of the current [`FunctionCode`].
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteSingleCoil => 0x05,
            Self::WriteSingleRegister => 0x06,
            Self::WriteMultipleCoils => 0x0F,
            Self::WriteMultipleRegisters => 0x10,
            Self::ReadFileRecord => 0x14,
            Self::WriteFileRecord => 0x15,
            Self::MaskWriteRegister => 0x16,
            Self::ReadWriteMultipleRegisters => 0x17,
            Self::ReadFifoQueue => 0x18,
            Self::Custom(code) => code,
        }
    }
}

impl Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value().fmt(f)
    }
}

/// Zero based protocol address of an entity.
///
/// Device manuals often count from 1, subtract one before use.
pub type Address = u16;

/// Value of a coil or discrete input, `0xFF00` (on) or `0x0000` (off) on
/// the wire.
pub type Coil = bool;

/// Value of a 16 bit register, big-endian on the wire.
pub type Word = u16;

/// Number of consecutive entities.
pub type Quantity = u16;

/// Transaction identifier of the stream envelope.
pub type TransactionId = u16;

/// Unit identifier (slave address).
pub type UnitId = u8;

/// One sub-request of a [`Request::ReadFileRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRecordRequest {
    pub file_number: u16,
    pub record_number: u16,
    /// Number of registers to read.
    pub record_length: u16,
}

/// A block of registers inside a file, addressed by file and record number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub file_number: u16,
    pub record_number: u16,
    pub data: Vec<Word>,
}

/// Everything a master can ask a slave for.
///
/// Ranges are given as `(first address, quantity)`, writes as
/// `(first address, values)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    ReadCoils(Address, Quantity),

    ReadDiscreteInputs(Address, Quantity),

    WriteSingleCoil(Address, Coil),

    WriteMultipleCoils(Address, Cow<'a, [Coil]>),

    ReadInputRegisters(Address, Quantity),

    ReadHoldingRegisters(Address, Quantity),

    WriteSingleRegister(Address, Word),

    WriteMultipleRegisters(Address, Cow<'a, [Word]>),

    /// `(address, and_mask, or_mask)`.
    ///
    /// The slave stores `(current & and_mask) | (or_mask & !and_mask)`.
    MaskWriteRegister(Address, Word, Word),

    /// `(read address, read quantity, write address, values)`.
    ///
    /// The write is executed before the read.
    ReadWriteMultipleRegisters(Address, Quantity, Address, Cow<'a, [Word]>),

    /// Record blocks of one or more files.
    ReadFileRecord(Cow<'a, [FileRecordRequest]>),

    WriteFileRecord(Cow<'a, [FileRecord]>),

    /// The queue behind the given pointer address.
    ReadFifoQueue(Address),

    /// Any other function code with its undecoded payload.
    Custom(u8, Cow<'a, [u8]>),
}

impl Request<'_> {
    /// Converts the request into an owned instance with `'static'` lifetime.
    #[must_use]
    pub fn into_owned(self) -> Request<'static> {
        use Request::*;

        match self {
            ReadCoils(addr, qty) => ReadCoils(addr, qty),
            ReadDiscreteInputs(addr, qty) => ReadDiscreteInputs(addr, qty),
            WriteSingleCoil(addr, coil) => WriteSingleCoil(addr, coil),
            WriteMultipleCoils(addr, coils) => {
                WriteMultipleCoils(addr, Cow::Owned(coils.into_owned()))
            }
            ReadInputRegisters(addr, qty) => ReadInputRegisters(addr, qty),
            ReadHoldingRegisters(addr, qty) => ReadHoldingRegisters(addr, qty),
            WriteSingleRegister(addr, word) => WriteSingleRegister(addr, word),
            WriteMultipleRegisters(addr, words) => {
                WriteMultipleRegisters(addr, Cow::Owned(words.into_owned()))
            }
            MaskWriteRegister(addr, and_mask, or_mask) => {
                MaskWriteRegister(addr, and_mask, or_mask)
            }
            ReadWriteMultipleRegisters(addr, qty, write_addr, words) => {
                ReadWriteMultipleRegisters(addr, qty, write_addr, Cow::Owned(words.into_owned()))
            }
            ReadFileRecord(requests) => ReadFileRecord(Cow::Owned(requests.into_owned())),
            WriteFileRecord(records) => WriteFileRecord(Cow::Owned(records.into_owned())),
            ReadFifoQueue(addr) => ReadFifoQueue(addr),
            Custom(func, bytes) => Custom(func, Cow::Owned(bytes.into_owned())),
        }
    }

    #[must_use]
    pub const fn function_code(&self) -> FunctionCode {
        use Request::*;

        match self {
            ReadCoils(_, _) => FunctionCode::ReadCoils,
            ReadDiscreteInputs(_, _) => FunctionCode::ReadDiscreteInputs,
            WriteSingleCoil(_, _) => FunctionCode::WriteSingleCoil,
            WriteMultipleCoils(_, _) => FunctionCode::WriteMultipleCoils,
            ReadInputRegisters(_, _) => FunctionCode::ReadInputRegisters,
            ReadHoldingRegisters(_, _) => FunctionCode::ReadHoldingRegisters,
            WriteSingleRegister(_, _) => FunctionCode::WriteSingleRegister,
            WriteMultipleRegisters(_, _) => FunctionCode::WriteMultipleRegisters,
            MaskWriteRegister(_, _, _) => FunctionCode::MaskWriteRegister,
            ReadWriteMultipleRegisters(_, _, _, _) => FunctionCode::ReadWriteMultipleRegisters,
            ReadFileRecord(_) => FunctionCode::ReadFileRecord,
            WriteFileRecord(_) => FunctionCode::WriteFileRecord,
            ReadFifoQueue(_) => FunctionCode::ReadFifoQueue,
            Custom(code, _) => FunctionCode::Custom(*code),
        }
    }
}

/// A decoded request and the unit id it was sent to.
#[cfg(feature = "server")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveRequest<'a> {
    pub slave: crate::SlaveId,
    pub request: Request<'a>,
}

#[cfg(feature = "server")]
impl SlaveRequest<'_> {
    #[must_use]
    pub fn into_owned(self) -> SlaveRequest<'static> {
        let Self { slave, request } = self;
        SlaveRequest {
            slave,
            request: request.into_owned(),
        }
    }
}

/// The successful answer to a [`Request`].
///
/// Decoded bit reads are padded to whole bytes, so their length is a
/// multiple of 8. [`crate::client::Reader`] cuts them to the requested
/// quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    ReadCoils(Vec<Coil>),

    ReadDiscreteInputs(Vec<Coil>),

    /// Echo of the written coil.
    WriteSingleCoil(Address, Coil),

    /// First address and number of written coils.
    WriteMultipleCoils(Address, Quantity),

    ReadInputRegisters(Vec<Word>),

    ReadHoldingRegisters(Vec<Word>),

    /// Echo of the written register.
    WriteSingleRegister(Address, Word),

    /// First address and number of written registers.
    WriteMultipleRegisters(Address, Quantity),

    /// Echo of the address and both masks.
    MaskWriteRegister(Address, Word, Word),

    /// Values of the read part.
    ReadWriteMultipleRegisters(Vec<Word>),

    /// One register block per sub-request, in request order.
    ReadFileRecord(Vec<Vec<Word>>),

    /// Echo of the written records.
    WriteFileRecord(Vec<FileRecord>),

    /// Queued values, oldest first.
    ReadFifoQueue(Vec<Word>),

    /// Function code and undecoded payload of a custom function.
    Custom(u8, Bytes),
}

impl Response {
    /// Get the [`FunctionCode`] of the [`Response`].
    #[must_use]
    pub const fn function_code(&self) -> FunctionCode {
        use Response::*;

        match self {
            ReadCoils(_) => FunctionCode::ReadCoils,
            ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,

            WriteSingleCoil(_, _) => FunctionCode::WriteSingleCoil,
            WriteMultipleCoils(_, _) => FunctionCode::WriteMultipleCoils,

            ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,

            WriteSingleRegister(_, _) => FunctionCode::WriteSingleRegister,
            WriteMultipleRegisters(_, _) => FunctionCode::WriteMultipleRegisters,

            MaskWriteRegister(_, _, _) => FunctionCode::MaskWriteRegister,

            ReadWriteMultipleRegisters(_) => FunctionCode::ReadWriteMultipleRegisters,

            ReadFileRecord(_) => FunctionCode::ReadFileRecord,
            WriteFileRecord(_) => FunctionCode::WriteFileRecord,
            ReadFifoQueue(_) => FunctionCode::ReadFifoQueue,

            Custom(code, _) => FunctionCode::Custom(*code),
        }
    }
}

/// A server (slave) exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    /// 0x01
    IllegalFunction,
    /// 0x02
    IllegalDataAddress,
    /// 0x03
    IllegalDataValue,
    /// 0x04
    ServerDeviceFailure,
    /// 0x05
    Acknowledge,
    /// 0x06
    ServerDeviceBusy,
    /// 0x07
    NegativeAcknowledge,
    /// 0x08
    MemoryParityError,
    /// 0x0A
    GatewayPathUnavailable,
    /// 0x0B
    GatewayTargetDevice,
    /// None of the above.
    ///
    /// Prefer [`Self::new()`] over constructing this variant with one of
    /// the predefined values.
    Custom(u8),
}

impl From<ExceptionCode> for u8 {
    fn from(from: ExceptionCode) -> Self {
        use crate::frame::ExceptionCode::*;
        match from {
            IllegalFunction => 0x01,
            IllegalDataAddress => 0x02,
            IllegalDataValue => 0x03,
            ServerDeviceFailure => 0x04,
            Acknowledge => 0x05,
            ServerDeviceBusy => 0x06,
            NegativeAcknowledge => 0x07,
            MemoryParityError => 0x08,
            GatewayPathUnavailable => 0x0A,
            GatewayTargetDevice => 0x0B,
            Custom(code) => code,
        }
    }
}

impl ExceptionCode {
    /// Create a new [`ExceptionCode`] with `value`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        use crate::frame::ExceptionCode::*;

        match value {
            0x01 => IllegalFunction,
            0x02 => IllegalDataAddress,
            0x03 => IllegalDataValue,
            0x04 => ServerDeviceFailure,
            0x05 => Acknowledge,
            0x06 => ServerDeviceBusy,
            0x07 => NegativeAcknowledge,
            0x08 => MemoryParityError,
            0x0A => GatewayPathUnavailable,
            0x0B => GatewayTargetDevice,
            other => Custom(other),
        }
    }

    pub(crate) fn description(&self) -> &str {
        use crate::frame::ExceptionCode::*;

        match *self {
            IllegalFunction => "Illegal function",
            IllegalDataAddress => "Illegal data address",
            IllegalDataValue => "Illegal data value",
            ServerDeviceFailure => "Server device failure",
            Acknowledge => "Acknowledge",
            ServerDeviceBusy => "Server device busy",
            NegativeAcknowledge => "Negative acknowledge",
            MemoryParityError => "Memory parity error",
            GatewayPathUnavailable => "Gateway path unavailable",
            GatewayTargetDevice => "Gateway target device failed to respond",
            Custom(_) => "Custom",
        }
    }
}

/// A server (slave) exception response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionResponse {
    pub function: FunctionCode,
    pub exception: ExceptionCode,
}

/// Represents a message from the client (master) to the server (slave).
#[derive(Debug, Clone)]
pub(crate) struct RequestPdu<'a>(pub(crate) Request<'a>);

impl<'a> From<Request<'a>> for RequestPdu<'a> {
    fn from(from: Request<'a>) -> Self {
        RequestPdu(from)
    }
}

impl<'a> From<RequestPdu<'a>> for Request<'a> {
    fn from(from: RequestPdu<'a>) -> Self {
        from.0
    }
}

/// Represents a message from the server (slave) to the client (master).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResponsePdu(pub(crate) Result<Response, ExceptionResponse>);

impl From<Response> for ResponsePdu {
    fn from(from: Response) -> Self {
        ResponsePdu(Ok(from))
    }
}

impl From<ExceptionResponse> for ResponsePdu {
    fn from(from: ExceptionResponse) -> Self {
        ResponsePdu(Err(from))
    }
}

impl From<ResponsePdu> for Result<Response, ExceptionResponse> {
    fn from(from: ResponsePdu) -> Self {
        from.0
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl error::Error for ExceptionCode {}

impl fmt::Display for ExceptionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modbus function {}: {}", self.function, self.exception)
    }
}

impl error::Error for ExceptionResponse {}

/// The envelope a PDU travels in.
///
/// Headered framings carry a transaction id on the wire, headless
/// framings only carry the unit id and rely on strict request/response
/// alternation on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// MBAP header over a TCP stream.
    Tcp,
    /// MBAP header, one ADU per datagram.
    Udp,
    /// Binary serial framing with CRC16.
    Rtu,
    /// Hex encoded serial framing with LRC.
    Ascii,
}

impl Framing {
    /// Whether the framing omits the transaction id.
    #[must_use]
    pub const fn is_headless(self) -> bool {
        matches!(self, Self::Rtu | Self::Ascii)
    }
}

impl Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Rtu => "RTU",
            Self::Ascii => "ASCII",
        };
        f.write_str(name)
    }
}

/// Addressing information of an [`Adu`].
///
/// The transaction id is always `0` for headless framings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub transaction_id: TransactionId,
    pub unit_id: UnitId,
}

/// An application data unit: a header plus a still encoded PDU
/// (function code followed by the payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adu {
    pub hdr: Header,
    pub pdu: Bytes,
}

impl Adu {
    /// Function code byte of the PDU, if any.
    #[must_use]
    pub fn function_code(&self) -> Option<u8> {
        self.pdu.first().copied()
    }
}

/// Check that `req_hdr` is matched by `rsp_hdr` under the given framing.
///
/// Headless framings have no transaction id on the wire, only the unit
/// ids are compared for them.
///
/// # Errors
///
/// If the headers do not match, an error message with the details will be returned.
pub(crate) fn verify_response_header(
    framing: Framing,
    req_hdr: &Header,
    rsp_hdr: &Header,
) -> Result<(), String> {
    let matching = if framing.is_headless() {
        req_hdr.unit_id == rsp_hdr.unit_id
    } else {
        req_hdr == rsp_hdr
    };
    if !matching {
        return Err(format!(
            "expected/request = {req_hdr:?}, actual/response = {rsp_hdr:?}"
        ));
    }
    Ok(())
}
