// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slave side process image
//!
//! The image holds the data a slave exposes to masters. Every kind of
//! entity lives in its own address space behind its own lock, so
//! concurrent requests only contend when they touch the same kind.
//!
//! ```
//! use tokio_fieldbus::image::ProcessImage;
//!
//! let image = ProcessImage::new();
//! image.holding_registers_mut().add(0, 251, true).unwrap();
//! assert_eq!(image.holding_registers().get(0), Ok(251));
//! ```

mod fifo;
mod file;

use std::collections::BTreeMap;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

use crate::frame::{Address, Coil, ExceptionCode, Quantity, Word};

pub use self::{fifo::Fifos, file::Files};

/// Failed access to the process image.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    /// The address is not occupied or the range leaves the address space.
    #[error("illegal address: {0}")]
    IllegalAddress(Address),

    /// The entity cannot be written by a master.
    #[error("read-only address: {0}")]
    ReadOnly(Address),

    #[error("address already occupied: {0}")]
    DuplicateAddress(Address),

    /// The FIFO queue already holds the maximum number of values.
    #[error("FIFO queue full: {0}")]
    QueueFull(Address),
}

impl From<ImageError> for ExceptionCode {
    fn from(from: ImageError) -> Self {
        match from {
            ImageError::IllegalAddress(_)
            | ImageError::ReadOnly(_)
            | ImageError::DuplicateAddress(_) => ExceptionCode::IllegalDataAddress,
            ImageError::QueueFull(_) => ExceptionCode::IllegalDataValue,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cell<V> {
    value: V,
    writable: bool,
}

/// Address indexed entities of one kind.
///
/// Addresses may be sparse, but every read has to hit occupied
/// addresses only.
#[derive(Debug, Clone)]
pub struct Bank<V> {
    cells: BTreeMap<Address, Cell<V>>,
}

impl<V> Default for Bank<V> {
    fn default() -> Self {
        Self {
            cells: BTreeMap::new(),
        }
    }
}

impl<V> Bank<V>
where
    V: Copy,
{
    /// Number of occupied addresses.
    #[must_use]
    pub fn count(&self) -> usize {
        self.cells.len()
    }

    pub fn get(&self, addr: Address) -> Result<V, ImageError> {
        self.cells
            .get(&addr)
            .map(|cell| cell.value)
            .ok_or(ImageError::IllegalAddress(addr))
    }

    /// Read `count` consecutive entities starting at `offset`.
    pub fn get_range(&self, offset: Address, count: Quantity) -> Result<Vec<V>, ImageError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let last = offset
            .checked_add(count - 1)
            .ok_or(ImageError::IllegalAddress(offset))?;
        (offset..=last).map(|addr| self.get(addr)).collect()
    }

    /// Occupied addresses in ascending order.
    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.cells.keys().copied()
    }

    /// Occupy a new address.
    pub fn add(&mut self, addr: Address, value: V, writable: bool) -> Result<(), ImageError> {
        if self.cells.contains_key(&addr) {
            return Err(ImageError::DuplicateAddress(addr));
        }
        self.cells.insert(addr, Cell { value, writable });
        Ok(())
    }

    /// Update a value on behalf of the slave, regardless of access rights.
    pub fn set(&mut self, addr: Address, value: V) -> Result<(), ImageError> {
        let cell = self
            .cells
            .get_mut(&addr)
            .ok_or(ImageError::IllegalAddress(addr))?;
        cell.value = value;
        Ok(())
    }

    pub fn set_writable(&mut self, addr: Address, writable: bool) -> Result<(), ImageError> {
        let cell = self
            .cells
            .get_mut(&addr)
            .ok_or(ImageError::IllegalAddress(addr))?;
        cell.writable = writable;
        Ok(())
    }

    pub fn remove(&mut self, addr: Address) -> Option<V> {
        self.cells.remove(&addr).map(|cell| cell.value)
    }

    /// Update a value on behalf of a master.
    pub fn write(&mut self, addr: Address, value: V) -> Result<(), ImageError> {
        let cell = self
            .cells
            .get_mut(&addr)
            .ok_or(ImageError::IllegalAddress(addr))?;
        if !cell.writable {
            return Err(ImageError::ReadOnly(addr));
        }
        cell.value = value;
        Ok(())
    }
}

/// The data of a slave, shared by all connections.
///
/// ```
/// use std::sync::Arc;
///
/// use tokio_fieldbus::image::ProcessImage;
///
/// let image = Arc::new(ProcessImage::new());
/// {
///     let mut coils = image.coils_mut();
///     for addr in 0..8 {
///         coils.add(addr, false, true).unwrap();
///     }
/// }
/// assert_eq!(image.coils().count(), 8);
/// ```
#[derive(Debug, Default)]
pub struct ProcessImage {
    coils: RwLock<Bank<Coil>>,
    discrete_inputs: RwLock<Bank<Coil>>,
    input_registers: RwLock<Bank<Word>>,
    holding_registers: RwLock<Bank<Word>>,
    files: RwLock<Files>,
    fifos: RwLock<Fifos>,
}

impl ProcessImage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coils(&self) -> RwLockReadGuard<'_, Bank<Coil>> {
        self.coils.read()
    }

    pub fn coils_mut(&self) -> RwLockWriteGuard<'_, Bank<Coil>> {
        self.coils.write()
    }

    pub fn discrete_inputs(&self) -> RwLockReadGuard<'_, Bank<Coil>> {
        self.discrete_inputs.read()
    }

    pub fn discrete_inputs_mut(&self) -> RwLockWriteGuard<'_, Bank<Coil>> {
        self.discrete_inputs.write()
    }

    pub fn input_registers(&self) -> RwLockReadGuard<'_, Bank<Word>> {
        self.input_registers.read()
    }

    pub fn input_registers_mut(&self) -> RwLockWriteGuard<'_, Bank<Word>> {
        self.input_registers.write()
    }

    pub fn holding_registers(&self) -> RwLockReadGuard<'_, Bank<Word>> {
        self.holding_registers.read()
    }

    pub fn holding_registers_mut(&self) -> RwLockWriteGuard<'_, Bank<Word>> {
        self.holding_registers.write()
    }

    pub fn files(&self) -> RwLockReadGuard<'_, Files> {
        self.files.read()
    }

    pub fn files_mut(&self) -> RwLockWriteGuard<'_, Files> {
        self.files.write()
    }

    pub fn fifos(&self) -> RwLockReadGuard<'_, Fifos> {
        self.fifos.read()
    }

    pub fn fifos_mut(&self) -> RwLockWriteGuard<'_, Fifos> {
        self.fifos.write()
    }
}
