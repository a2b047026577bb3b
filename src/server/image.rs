// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Answering requests from a process image

use std::{future, sync::Arc};

use crate::{
    codec::response_pdu_size,
    frame::{Address, ExceptionCode, Request, Response, SlaveRequest, UnitId},
    image::{Bank, ImageError, ProcessImage},
    slave::Slave,
};

use super::Service;

const MAX_READ_BITS: usize = 2_000;

const MAX_READ_REGISTERS: usize = 125;

const MAX_WRITE_COILS: usize = 1_968;

const MAX_WRITE_REGISTERS: usize = 123;

const MAX_READ_WRITE_READ_REGISTERS: usize = 125;

const MAX_READ_WRITE_WRITE_REGISTERS: usize = 121;

/// A [`Service`] backed by a shared [`ProcessImage`].
///
/// Without an image every request is answered with
/// [`ExceptionCode::IllegalFunction`].
#[derive(Debug, Clone, Default)]
pub struct ImageService {
    image: Option<Arc<ProcessImage>>,
    unit_id: Option<UnitId>,
}

impl ImageService {
    #[must_use]
    pub fn new(image: Arc<ProcessImage>) -> Self {
        Self {
            image: Some(image),
            unit_id: None,
        }
    }

    /// Only answer requests for `slave`, as required on a shared serial line.
    ///
    /// Broadcast requests are always executed.
    #[must_use]
    pub fn with_slave(mut self, slave: Slave) -> Self {
        self.unit_id = Some(slave.into());
        self
    }

    #[must_use]
    pub fn image(&self) -> Option<&Arc<ProcessImage>> {
        self.image.as_ref()
    }

    fn accepts(&self, unit_id: UnitId) -> bool {
        match self.unit_id {
            Some(own) => own == unit_id || Slave(unit_id).is_broadcast(),
            None => true,
        }
    }

    /// Execute a request against the image.
    pub fn handle(&self, request: &Request<'_>) -> Result<Response, ExceptionCode> {
        let Some(image) = &self.image else {
            return Err(ExceptionCode::IllegalFunction);
        };
        let response = match request {
            Request::ReadCoils(addr, cnt) => {
                check_quantity(usize::from(*cnt), MAX_READ_BITS)?;
                Response::ReadCoils(image.coils().get_range(*addr, *cnt)?)
            }
            Request::ReadDiscreteInputs(addr, cnt) => {
                check_quantity(usize::from(*cnt), MAX_READ_BITS)?;
                Response::ReadDiscreteInputs(image.discrete_inputs().get_range(*addr, *cnt)?)
            }
            Request::ReadHoldingRegisters(addr, cnt) => {
                check_quantity(usize::from(*cnt), MAX_READ_REGISTERS)?;
                Response::ReadHoldingRegisters(image.holding_registers().get_range(*addr, *cnt)?)
            }
            Request::ReadInputRegisters(addr, cnt) => {
                check_quantity(usize::from(*cnt), MAX_READ_REGISTERS)?;
                Response::ReadInputRegisters(image.input_registers().get_range(*addr, *cnt)?)
            }
            Request::WriteSingleCoil(addr, coil) => {
                image.coils_mut().write(*addr, *coil)?;
                Response::WriteSingleCoil(*addr, *coil)
            }
            Request::WriteSingleRegister(addr, word) => {
                image.holding_registers_mut().write(*addr, *word)?;
                Response::WriteSingleRegister(*addr, *word)
            }
            Request::WriteMultipleCoils(addr, coils) => {
                let cnt = check_quantity(coils.len(), MAX_WRITE_COILS)?;
                write_each(&mut image.coils_mut(), *addr, coils)?;
                Response::WriteMultipleCoils(*addr, cnt)
            }
            Request::WriteMultipleRegisters(addr, words) => {
                let cnt = check_quantity(words.len(), MAX_WRITE_REGISTERS)?;
                write_each(&mut image.holding_registers_mut(), *addr, words)?;
                Response::WriteMultipleRegisters(*addr, cnt)
            }
            Request::MaskWriteRegister(addr, and_mask, or_mask) => {
                let mut registers = image.holding_registers_mut();
                let current = registers.get(*addr)?;
                registers.write(*addr, (current & and_mask) | (or_mask & !and_mask))?;
                Response::MaskWriteRegister(*addr, *and_mask, *or_mask)
            }
            Request::ReadWriteMultipleRegisters(read_addr, read_cnt, write_addr, words) => {
                check_quantity(usize::from(*read_cnt), MAX_READ_WRITE_READ_REGISTERS)?;
                check_quantity(words.len(), MAX_READ_WRITE_WRITE_REGISTERS)?;
                let mut registers = image.holding_registers_mut();
                write_each(&mut registers, *write_addr, words)?;
                Response::ReadWriteMultipleRegisters(registers.get_range(*read_addr, *read_cnt)?)
            }
            Request::ReadFileRecord(requests) => {
                let files = image.files();
                let records = requests
                    .iter()
                    .map(|req| {
                        files.read_record(req.file_number, req.record_number, req.record_length)
                    })
                    .collect::<Result<_, _>>()?;
                Response::ReadFileRecord(records)
            }
            Request::WriteFileRecord(records) => {
                let mut files = image.files_mut();
                for record in records.iter() {
                    files.write_record(record.file_number, record.record_number, &record.data)?;
                }
                Response::WriteFileRecord(records.to_vec())
            }
            Request::ReadFifoQueue(addr) => Response::ReadFifoQueue(image.fifos().read(*addr)?),
            Request::Custom(..) => return Err(ExceptionCode::IllegalFunction),
        };
        // The answer has to fit into a single PDU.
        response_pdu_size(&response).map_err(|_| ExceptionCode::IllegalDataValue)?;
        Ok(response)
    }
}

impl Service for ImageService {
    type Request = SlaveRequest<'static>;
    type Response = Option<Response>;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        if !self.accepts(req.slave) {
            log::trace!("Ignoring request for slave {}", Slave(req.slave));
            return future::ready(Ok(None));
        }
        let result = self.handle(&req.request).map(Some);
        if let Err(exception) = &result {
            log::debug!("Request {:?} failed: {exception}", req.request);
        }
        future::ready(result)
    }
}

/// Reject empty and oversized requests.
fn check_quantity(cnt: usize, max: usize) -> Result<u16, ExceptionCode> {
    if cnt == 0 || cnt > max {
        return Err(ExceptionCode::IllegalDataValue);
    }
    u16::try_from(cnt).map_err(|_| ExceptionCode::IllegalDataValue)
}

/// Write consecutive values one by one.
///
/// Values written before a failing address are kept.
fn write_each<V>(bank: &mut Bank<V>, addr: Address, values: &[V]) -> Result<(), ImageError>
where
    V: Copy,
{
    if usize::from(addr) + values.len() > usize::from(Address::MAX) + 1 {
        return Err(ImageError::IllegalAddress(addr));
    }
    for (addr, value) in (addr..=Address::MAX).zip(values) {
        bank.write(addr, *value)?;
    }
    Ok(())
}
