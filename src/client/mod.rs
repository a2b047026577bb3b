// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus clients

use std::{borrow::Cow, fmt::Debug, io};

use async_trait::async_trait;

use crate::{error::ProtocolError, frame::*, slave::*, Error, Result};

pub mod executor;

pub use self::executor::{ClientConfig, Executor, TransactionState, DEFAULT_PORT};

#[cfg(feature = "rtu")]
pub mod ascii;

#[cfg(feature = "rtu")]
pub mod rtu;

#[cfg(feature = "tcp")]
pub mod tcp;

#[cfg(feature = "tcp")]
pub mod udp;

/// Transport independent asynchronous client trait
#[async_trait]
pub trait Client: SlaveContext + Send + Debug {
    /// Invokes a _Modbus_ function.
    async fn call(&mut self, request: Request<'_>) -> Result<Response>;

    /// Disconnects the client.
    ///
    /// Permanently disconnects the client by shutting down the
    /// underlying stream in a graceful manner.
    async fn disconnect(&mut self) -> io::Result<()>;
}

/// Asynchronous _Modbus_ reader
#[async_trait]
pub trait Reader: Client {
    /// Read multiple coils (0x01)
    async fn read_coils(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>>;

    /// Read multiple discrete inputs (0x02)
    async fn read_discrete_inputs(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>>;

    /// Read multiple holding registers (0x03)
    async fn read_holding_registers(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Word>>;

    /// Read multiple input registers (0x04)
    async fn read_input_registers(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Word>>;

    /// Read and write multiple holding registers (0x17)
    ///
    /// The write operation is performed before the read unlike
    /// the name of the operation might suggest!
    async fn read_write_multiple_registers(
        &mut self,
        read_addr: Address,
        read_count: Quantity,
        write_addr: Address,
        write_data: &[Word],
    ) -> Result<Vec<Word>>;

    /// Read records from files (0x14)
    ///
    /// Returns the register data of each sub-request in order.
    async fn read_file_record(
        &mut self,
        requests: &[FileRecordRequest],
    ) -> Result<Vec<Vec<Word>>>;

    /// Read the contents of a FIFO queue (0x18)
    async fn read_fifo_queue(&mut self, addr: Address) -> Result<Vec<Word>>;
}

/// Asynchronous Modbus writer
#[async_trait]
pub trait Writer: Client {
    /// Write a single coil (0x05)
    async fn write_single_coil(&mut self, addr: Address, coil: Coil) -> Result<()>;

    /// Write a single holding register (0x06)
    async fn write_single_register(&mut self, addr: Address, word: Word) -> Result<()>;

    /// Write multiple coils (0x0F)
    async fn write_multiple_coils(&mut self, addr: Address, coils: &'_ [Coil]) -> Result<()>;

    /// Write multiple holding registers (0x10)
    async fn write_multiple_registers(&mut self, addr: Address, words: &[Word]) -> Result<()>;

    /// Set or clear individual bits of a holding register (0x16)
    async fn masked_write_register(
        &mut self,
        addr: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> Result<()>;

    /// Write records to files (0x15)
    async fn write_file_record(&mut self, records: &[FileRecord]) -> Result<()>;
}

/// Asynchronous Modbus client context
#[derive(Debug)]
pub struct Context {
    client: Box<dyn Client>,
}

impl From<Box<dyn Client>> for Context {
    fn from(client: Box<dyn Client>) -> Self {
        Self { client }
    }
}

impl From<Context> for Box<dyn Client> {
    fn from(val: Context) -> Self {
        val.client
    }
}

#[async_trait]
impl Client for Context {
    async fn call(&mut self, request: Request<'_>) -> Result<Response> {
        self.client.call(request).await
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        self.client.disconnect().await
    }
}

impl SlaveContext for Context {
    fn set_slave(&mut self, slave: Slave) {
        self.client.set_slave(slave);
    }
}

/// A response of the right shape for another request.
fn unexpected_response(request: FunctionCode, response: Response) -> Error {
    ProtocolError::FunctionCodeMismatch {
        request,
        result: Ok(response),
    }
    .into()
}

#[async_trait]
impl Reader for Context {
    async fn read_coils<'a>(&'a mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>> {
        match self.client.call(Request::ReadCoils(addr, cnt)).await? {
            Ok(Response::ReadCoils(mut coils)) => {
                debug_assert!(coils.len() >= cnt.into());
                coils.truncate(cnt.into());
                Ok(Ok(coils))
            }
            Ok(rsp) => Err(unexpected_response(FunctionCode::ReadCoils, rsp)),
            Err(exception) => Ok(Err(exception)),
        }
    }

    async fn read_discrete_inputs<'a>(
        &'a mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Coil>> {
        match self.client.call(Request::ReadDiscreteInputs(addr, cnt)).await? {
            Ok(Response::ReadDiscreteInputs(mut coils)) => {
                debug_assert!(coils.len() >= cnt.into());
                coils.truncate(cnt.into());
                Ok(Ok(coils))
            }
            Ok(rsp) => Err(unexpected_response(FunctionCode::ReadDiscreteInputs, rsp)),
            Err(exception) => Ok(Err(exception)),
        }
    }

    async fn read_holding_registers<'a>(
        &'a mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Word>> {
        match self.client.call(Request::ReadHoldingRegisters(addr, cnt)).await? {
            Ok(Response::ReadHoldingRegisters(words)) => {
                debug_assert_eq!(words.len(), cnt.into());
                Ok(Ok(words))
            }
            Ok(rsp) => Err(unexpected_response(FunctionCode::ReadHoldingRegisters, rsp)),
            Err(exception) => Ok(Err(exception)),
        }
    }

    async fn read_input_registers<'a>(
        &'a mut self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Word>> {
        match self.client.call(Request::ReadInputRegisters(addr, cnt)).await? {
            Ok(Response::ReadInputRegisters(words)) => {
                debug_assert_eq!(words.len(), cnt.into());
                Ok(Ok(words))
            }
            Ok(rsp) => Err(unexpected_response(FunctionCode::ReadInputRegisters, rsp)),
            Err(exception) => Ok(Err(exception)),
        }
    }

    async fn read_write_multiple_registers<'a>(
        &'a mut self,
        read_addr: Address,
        read_count: Quantity,
        write_addr: Address,
        write_data: &[Word],
    ) -> Result<Vec<Word>> {
        let request = Request::ReadWriteMultipleRegisters(
            read_addr,
            read_count,
            write_addr,
            Cow::Borrowed(write_data),
        );
        match self.client.call(request).await? {
            Ok(Response::ReadWriteMultipleRegisters(words)) => {
                debug_assert_eq!(words.len(), read_count.into());
                Ok(Ok(words))
            }
            Ok(rsp) => Err(unexpected_response(
                FunctionCode::ReadWriteMultipleRegisters,
                rsp,
            )),
            Err(exception) => Ok(Err(exception)),
        }
    }

    async fn read_file_record<'a>(
        &'a mut self,
        requests: &[FileRecordRequest],
    ) -> Result<Vec<Vec<Word>>> {
        match self
            .client
            .call(Request::ReadFileRecord(Cow::Borrowed(requests)))
            .await?
        {
            Ok(Response::ReadFileRecord(records)) => {
                debug_assert_eq!(records.len(), requests.len());
                Ok(Ok(records))
            }
            Ok(rsp) => Err(unexpected_response(FunctionCode::ReadFileRecord, rsp)),
            Err(exception) => Ok(Err(exception)),
        }
    }

    async fn read_fifo_queue<'a>(&'a mut self, addr: Address) -> Result<Vec<Word>> {
        match self.client.call(Request::ReadFifoQueue(addr)).await? {
            Ok(Response::ReadFifoQueue(words)) => Ok(Ok(words)),
            Ok(rsp) => Err(unexpected_response(FunctionCode::ReadFifoQueue, rsp)),
            Err(exception) => Ok(Err(exception)),
        }
    }
}

#[async_trait]
impl Writer for Context {
    async fn write_single_coil<'a>(&'a mut self, addr: Address, coil: Coil) -> Result<()> {
        match self.client.call(Request::WriteSingleCoil(addr, coil)).await? {
            Ok(Response::WriteSingleCoil(rsp_addr, rsp_coil)) => {
                debug_assert_eq!(addr, rsp_addr);
                debug_assert_eq!(coil, rsp_coil);
                Ok(Ok(()))
            }
            Ok(rsp) => Err(unexpected_response(FunctionCode::WriteSingleCoil, rsp)),
            Err(exception) => Ok(Err(exception)),
        }
    }

    async fn write_multiple_coils<'a>(&'a mut self, addr: Address, coils: &[Coil]) -> Result<()> {
        let cnt = coils.len();
        match self
            .client
            .call(Request::WriteMultipleCoils(addr, Cow::Borrowed(coils)))
            .await?
        {
            Ok(Response::WriteMultipleCoils(rsp_addr, rsp_cnt)) => {
                debug_assert_eq!(addr, rsp_addr);
                debug_assert_eq!(cnt, rsp_cnt.into());
                Ok(Ok(()))
            }
            Ok(rsp) => Err(unexpected_response(FunctionCode::WriteMultipleCoils, rsp)),
            Err(exception) => Ok(Err(exception)),
        }
    }

    async fn write_single_register<'a>(&'a mut self, addr: Address, word: Word) -> Result<()> {
        match self
            .client
            .call(Request::WriteSingleRegister(addr, word))
            .await?
        {
            Ok(Response::WriteSingleRegister(rsp_addr, rsp_word)) => {
                debug_assert_eq!(addr, rsp_addr);
                debug_assert_eq!(word, rsp_word);
                Ok(Ok(()))
            }
            Ok(rsp) => Err(unexpected_response(FunctionCode::WriteSingleRegister, rsp)),
            Err(exception) => Ok(Err(exception)),
        }
    }

    async fn write_multiple_registers<'a>(
        &'a mut self,
        addr: Address,
        data: &[Word],
    ) -> Result<()> {
        let cnt = data.len();
        match self
            .client
            .call(Request::WriteMultipleRegisters(addr, Cow::Borrowed(data)))
            .await?
        {
            Ok(Response::WriteMultipleRegisters(rsp_addr, rsp_cnt)) => {
                debug_assert_eq!(addr, rsp_addr);
                debug_assert_eq!(cnt, rsp_cnt.into());
                Ok(Ok(()))
            }
            Ok(rsp) => Err(unexpected_response(
                FunctionCode::WriteMultipleRegisters,
                rsp,
            )),
            Err(exception) => Ok(Err(exception)),
        }
    }

    async fn masked_write_register<'a>(
        &'a mut self,
        addr: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> Result<()> {
        match self
            .client
            .call(Request::MaskWriteRegister(addr, and_mask, or_mask))
            .await?
        {
            Ok(Response::MaskWriteRegister(rsp_addr, rsp_and_mask, rsp_or_mask)) => {
                debug_assert_eq!(addr, rsp_addr);
                debug_assert_eq!(and_mask, rsp_and_mask);
                debug_assert_eq!(or_mask, rsp_or_mask);
                Ok(Ok(()))
            }
            Ok(rsp) => Err(unexpected_response(FunctionCode::MaskWriteRegister, rsp)),
            Err(exception) => Ok(Err(exception)),
        }
    }

    async fn write_file_record<'a>(&'a mut self, records: &[FileRecord]) -> Result<()> {
        match self
            .client
            .call(Request::WriteFileRecord(Cow::Borrowed(records)))
            .await?
        {
            Ok(Response::WriteFileRecord(rsp_records)) => {
                debug_assert_eq!(records, &rsp_records[..]);
                Ok(Ok(()))
            }
            Ok(rsp) => Err(unexpected_response(FunctionCode::WriteFileRecord, rsp)),
            Err(exception) => Ok(Err(exception)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Error, Result};

    use super::*;
    use std::io;

    #[derive(Default, Debug)]
    pub(crate) struct ClientMock {
        next_response: Option<Result<Response>>,
    }

    impl ClientMock {
        pub(crate) fn set_next_response(&mut self, next_response: Result<Response>) {
            self.next_response = Some(next_response);
        }
    }

    #[async_trait]
    impl Client for ClientMock {
        async fn call(&mut self, _request: Request<'_>) -> Result<Response> {
            match self.next_response.take().unwrap() {
                Ok(response) => Ok(response),
                Err(Error::Transport(err)) => {
                    Err(io::Error::new(err.kind(), format!("{err}")).into())
                }
                Err(err) => Err(err),
            }
        }

        async fn disconnect(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SlaveContext for ClientMock {
        fn set_slave(&mut self, _slave: Slave) {}
    }

    fn context(next_response: Result<Response>) -> Context {
        let mut client = Box::<ClientMock>::default();
        client.set_next_response(next_response);
        let mut context = Context { client };
        context.set_slave(Slave(1));
        context
    }

    #[test]
    fn read_some_coils() {
        // The protocol will always return entire bytes with, i.e.
        // a multiple of 8 coils.
        let response_coils = [true, false, false, true, false, true, false, true];
        for num_coils in 1..8 {
            let mut context = context(Ok(Ok(Response::ReadCoils(response_coils.to_vec()))));
            let coils = futures::executor::block_on(context.read_coils(1, num_coils))
                .unwrap()
                .unwrap();
            assert_eq!(&response_coils[0..num_coils as usize], &coils[..]);
        }
    }

    #[test]
    fn read_some_discrete_inputs() {
        let response_inputs = [true, false, false, true, false, true, false, true];
        for num_inputs in 1..8 {
            let mut context = context(Ok(Ok(Response::ReadDiscreteInputs(
                response_inputs.to_vec(),
            ))));
            let inputs = futures::executor::block_on(context.read_discrete_inputs(1, num_inputs))
                .unwrap()
                .unwrap();
            assert_eq!(&response_inputs[0..num_inputs as usize], &inputs[..]);
        }
    }

    #[test]
    fn exception_is_passed_through() {
        let mut context = context(Ok(Err(ExceptionCode::IllegalDataAddress)));
        let result = futures::executor::block_on(context.read_holding_registers(0, 1)).unwrap();
        assert_eq!(result, Err(ExceptionCode::IllegalDataAddress));
    }

    #[test]
    fn mismatching_response_is_an_error() {
        let mut context = context(Ok(Ok(Response::ReadInputRegisters(vec![1]))));
        let err =
            futures::executor::block_on(context.read_holding_registers(0, 1)).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::FunctionCodeMismatch {
                request: FunctionCode::ReadHoldingRegisters,
                ..
            })
        ));
    }

    #[test]
    fn read_file_records() {
        let mut context = context(Ok(Ok(Response::ReadFileRecord(vec![
            vec![0x0DFE, 0x0020],
            vec![0x33CD],
        ]))));
        let requests = [
            FileRecordRequest {
                file_number: 4,
                record_number: 1,
                record_length: 2,
            },
            FileRecordRequest {
                file_number: 3,
                record_number: 9,
                record_length: 1,
            },
        ];
        let records = futures::executor::block_on(context.read_file_record(&requests))
            .unwrap()
            .unwrap();
        assert_eq!(records, vec![vec![0x0DFE, 0x0020], vec![0x33CD]]);
    }

    #[test]
    fn read_fifo_queue() {
        let mut context = context(Ok(Ok(Response::ReadFifoQueue(vec![0x01B8, 0x1284]))));
        let values = futures::executor::block_on(context.read_fifo_queue(0x04DE))
            .unwrap()
            .unwrap();
        assert_eq!(values, vec![0x01B8, 0x1284]);
    }

    #[test]
    fn transport_errors_are_passed_through() {
        let mut context = context(Err(io::Error::from(io::ErrorKind::BrokenPipe).into()));
        let err = futures::executor::block_on(context.write_single_coil(1, true)).unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(ref err) if err.kind() == io::ErrorKind::BrokenPipe
        ));
    }
}
