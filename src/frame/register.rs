// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use crate::error::ProtocolError;

use super::Word;

/// A 16 bit register value stored as two big-endian bytes.
///
/// Values may be interpreted as unsigned or as two's complement signed
/// integers. Integers outside of `i16::MIN..=u16::MAX` cannot be
/// represented and are rejected on conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Register([u8; 2]);

impl Register {
    #[must_use]
    pub const fn from_u16(value: u16) -> Self {
        Self(value.to_be_bytes())
    }

    #[must_use]
    pub const fn from_i16(value: i16) -> Self {
        Self(value.to_be_bytes())
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 2]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn to_u16(self) -> u16 {
        u16::from_be_bytes(self.0)
    }

    #[must_use]
    pub const fn to_i16(self) -> i16 {
        i16::from_be_bytes(self.0)
    }

    #[must_use]
    pub const fn to_bytes(self) -> [u8; 2] {
        self.0
    }
}

impl From<Word> for Register {
    fn from(from: Word) -> Self {
        Self::from_u16(from)
    }
}

impl From<i16> for Register {
    fn from(from: i16) -> Self {
        Self::from_i16(from)
    }
}

impl From<Register> for Word {
    fn from(from: Register) -> Self {
        from.to_u16()
    }
}

impl TryFrom<i32> for Register {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        if let Ok(value) = u16::try_from(value) {
            return Ok(Self::from_u16(value));
        }
        i16::try_from(value)
            .map(Self::from_i16)
            .map_err(|_| ProtocolError::RegisterValueOutOfRange {
                value: value.into(),
            })
    }
}

impl TryFrom<u32> for Register {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        u16::try_from(value)
            .map(Self::from_u16)
            .map_err(|_| ProtocolError::RegisterValueOutOfRange {
                value: value.into(),
            })
    }
}

impl TryFrom<i64> for Register {
    type Error = ProtocolError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        i32::try_from(value)
            .map_err(|_| ProtocolError::RegisterValueOutOfRange { value })
            .and_then(Self::try_from)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.to_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_storage() {
        let reg = Register::from_u16(0x1234);
        assert_eq!(reg.to_bytes(), [0x12, 0x34]);
        assert_eq!(Register::from_bytes([0x00, 0xFB]).to_u16(), 251);
    }

    #[test]
    fn signed_and_unsigned_views() {
        let reg = Register::from_i16(-1);
        assert_eq!(reg.to_u16(), 0xFFFF);
        assert_eq!(reg.to_i16(), -1);
        assert_eq!(Register::from_u16(0x8000).to_i16(), i16::MIN);
    }

    #[test]
    fn convert_integers_in_range() {
        assert_eq!(Register::try_from(-32768_i32).unwrap().to_i16(), -32768);
        assert_eq!(Register::try_from(65535_i32).unwrap().to_u16(), 65535);
        assert_eq!(Register::try_from(0_u32).unwrap().to_u16(), 0);
        assert_eq!(Register::try_from(-5_i64).unwrap().to_i16(), -5);
    }

    #[test]
    fn reject_integers_out_of_range() {
        assert!(matches!(
            Register::try_from(65536_i32),
            Err(ProtocolError::RegisterValueOutOfRange { value: 65536 })
        ));
        assert!(matches!(
            Register::try_from(-32769_i32),
            Err(ProtocolError::RegisterValueOutOfRange { value: -32769 })
        ));
        assert!(Register::try_from(70_000_u32).is_err());
        assert!(Register::try_from(i64::MAX).is_err());
    }
}
