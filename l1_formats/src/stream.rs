use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Bounds-checked little-endian cursor over a borrowed buffer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Result<Self> {
        if pos > data.len() {
            return Err(Error::TruncatedInput {
                context: "seeking",
                needed: pos,
                available: data.len(),
            });
        }
        Ok(Self { data, pos })
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn take(&mut self, len: usize, context: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::TruncatedInput {
                context,
                needed: len,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn u8(&mut self, context: &'static str) -> Result<u8> {
        Ok(self.take(1, context)?[0])
    }

    pub fn i8(&mut self, context: &'static str) -> Result<i8> {
        Ok(self.u8(context)? as i8)
    }

    pub fn u16(&mut self, context: &'static str) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2, context)?))
    }

    pub fn i16(&mut self, context: &'static str) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.take(2, context)?))
    }

    pub fn u32(&mut self, context: &'static str) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4, context)?))
    }

    pub fn i32(&mut self, context: &'static str) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4, context)?))
    }
}
