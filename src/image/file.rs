// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeMap;

use crate::frame::Word;

use super::ImageError;

/// Highest record number that can be addressed.
pub const MAX_RECORD_NUMBER: u16 = 9_999;

/// Numbered files, each a block of registers addressed by record number.
#[derive(Debug, Clone, Default)]
pub struct Files {
    files: BTreeMap<u16, Vec<Word>>,
}

impl Files {
    /// Number of files.
    #[must_use]
    pub fn count(&self) -> usize {
        self.files.len()
    }

    /// Add a file of `len` zeroed records.
    pub fn add_file(&mut self, file_number: u16, len: u16) -> Result<(), ImageError> {
        if len > MAX_RECORD_NUMBER + 1 {
            return Err(ImageError::IllegalAddress(len));
        }
        if self.files.contains_key(&file_number) {
            return Err(ImageError::DuplicateAddress(file_number));
        }
        self.files.insert(file_number, vec![0; usize::from(len)]);
        Ok(())
    }

    pub fn remove_file(&mut self, file_number: u16) -> Option<Vec<Word>> {
        self.files.remove(&file_number)
    }

    fn span(
        &self,
        file_number: u16,
        record_number: u16,
        len: usize,
    ) -> Result<std::ops::Range<usize>, ImageError> {
        let file = self
            .files
            .get(&file_number)
            .ok_or(ImageError::IllegalAddress(file_number))?;
        let start = usize::from(record_number);
        let end = start + len;
        if record_number > MAX_RECORD_NUMBER || end > file.len() {
            return Err(ImageError::IllegalAddress(record_number));
        }
        Ok(start..end)
    }

    pub fn read_record(
        &self,
        file_number: u16,
        record_number: u16,
        record_length: u16,
    ) -> Result<Vec<Word>, ImageError> {
        let span = self.span(file_number, record_number, usize::from(record_length))?;
        Ok(self.files[&file_number][span].to_vec())
    }

    pub fn write_record(
        &mut self,
        file_number: u16,
        record_number: u16,
        data: &[Word],
    ) -> Result<(), ImageError> {
        let span = self.span(file_number, record_number, data.len())?;
        if let Some(file) = self.files.get_mut(&file_number) {
            file[span].copy_from_slice(data);
        }
        Ok(())
    }
}
