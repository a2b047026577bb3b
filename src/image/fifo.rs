// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{BTreeMap, VecDeque};

use crate::{codec::MAX_FIFO_COUNT, frame::Address, frame::Word};

use super::ImageError;

/// Bounded register queues, each addressed by its pointer address.
#[derive(Debug, Clone, Default)]
pub struct Fifos {
    queues: BTreeMap<Address, VecDeque<Word>>,
}

impl Fifos {
    /// Number of queues.
    #[must_use]
    pub fn count(&self) -> usize {
        self.queues.len()
    }

    pub fn add_fifo(&mut self, addr: Address) -> Result<(), ImageError> {
        if self.queues.contains_key(&addr) {
            return Err(ImageError::DuplicateAddress(addr));
        }
        self.queues
            .insert(addr, VecDeque::with_capacity(MAX_FIFO_COUNT));
        Ok(())
    }

    pub fn remove_fifo(&mut self, addr: Address) -> Option<Vec<Word>> {
        self.queues.remove(&addr).map(Vec::from)
    }

    /// Append a value, at most 31 values fit into a queue.
    pub fn push(&mut self, addr: Address, value: Word) -> Result<(), ImageError> {
        let queue = self
            .queues
            .get_mut(&addr)
            .ok_or(ImageError::IllegalAddress(addr))?;
        if queue.len() >= MAX_FIFO_COUNT {
            return Err(ImageError::QueueFull(addr));
        }
        queue.push_back(value);
        Ok(())
    }

    /// Current contents, oldest first. Reading does not drain the queue.
    pub fn read(&self, addr: Address) -> Result<Vec<Word>, ImageError> {
        self.queues
            .get(&addr)
            .map(|queue| queue.iter().copied().collect())
            .ok_or(ImageError::IllegalAddress(addr))
    }

    pub fn clear(&mut self, addr: Address) -> Result<(), ImageError> {
        self.queues
            .get_mut(&addr)
            .ok_or(ImageError::IllegalAddress(addr))?
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_queue() {
        let mut fifos = Fifos::default();
        fifos.add_fifo(0x04DE).unwrap();
        for value in 0..31 {
            fifos.push(0x04DE, value).unwrap();
        }
        assert_eq!(fifos.push(0x04DE, 31), Err(ImageError::QueueFull(0x04DE)));
        let values = fifos.read(0x04DE).unwrap();
        assert_eq!(values.len(), 31);
        assert_eq!(values[0], 0);
        assert_eq!(values[30], 30);
        // Not drained
        assert_eq!(fifos.read(0x04DE).unwrap().len(), 31);

        fifos.clear(0x04DE).unwrap();
        assert_eq!(fifos.read(0x04DE), Ok(vec![]));
    }

    #[test]
    fn unknown_queue() {
        let mut fifos = Fifos::default();
        assert_eq!(fifos.read(1), Err(ImageError::IllegalAddress(1)));
        assert_eq!(fifos.push(1, 0), Err(ImageError::IllegalAddress(1)));
        fifos.add_fifo(1).unwrap();
        assert_eq!(fifos.add_fifo(1), Err(ImageError::DuplicateAddress(1)));
    }
}
