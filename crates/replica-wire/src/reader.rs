//! Bounds-checked reader for message bodies
//!
//! Every getter checks the remaining length first and reports
//! `ReplicaError::BufferTooShort` instead of panicking.

use bytes::{Buf, Bytes};
use replica_core::{ReplicaError, ReplicaResult};

/// Cursor over a received message body
pub struct WireReader<'a> {
    buf: &'a [u8],
    consumed: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        WireReader { buf, consumed: 0 }
    }

    /// Bytes left to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Bytes read so far
    #[inline]
    pub fn position(&self) -> usize {
        self.consumed
    }

    fn ensure(&self, len: usize) -> ReplicaResult<()> {
        if self.buf.remaining() < len {
            return Err(ReplicaError::BufferTooShort {
                expected: self.consumed + len,
                actual: self.consumed + self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> ReplicaResult<u8> {
        self.ensure(1)?;
        self.consumed += 1;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> ReplicaResult<u16> {
        self.ensure(2)?;
        self.consumed += 2;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_u32(&mut self) -> ReplicaResult<u32> {
        self.ensure(4)?;
        self.consumed += 4;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_u64(&mut self) -> ReplicaResult<u64> {
        self.ensure(8)?;
        self.consumed += 8;
        Ok(self.buf.get_u64_le())
    }

    pub fn read_f32(&mut self) -> ReplicaResult<f32> {
        self.ensure(4)?;
        self.consumed += 4;
        Ok(self.buf.get_f32_le())
    }

    pub fn read_bool(&mut self) -> ReplicaResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ReplicaError::InvalidWireFormat(format!(
                "Invalid bool byte {:#04x}",
                other
            ))),
        }
    }

    /// Read a `u16` length-prefixed payload
    pub fn read_payload(&mut self) -> ReplicaResult<Bytes> {
        let len = self.read_u16()? as usize;
        self.ensure(len)?;
        self.consumed += len;
        Ok(self.buf.copy_to_bytes(len))
    }

    /// Fail if anything is left after the message body
    pub fn finish(self) -> ReplicaResult<()> {
        if self.buf.has_remaining() {
            return Err(ReplicaError::InvalidWireFormat(format!(
                "{} trailing bytes after message",
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_little_endian() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut reader = WireReader::new(&data);
        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert_eq!(reader.read_u16().unwrap(), 0x0302);
        assert_eq!(reader.read_u32().unwrap(), 0x0706_0504);
        assert_eq!(reader.position(), 7);
        reader.finish().unwrap();
    }

    #[test]
    fn test_short_buffer_reports_lengths() {
        let data = [0xAA, 0xBB, 0xCC];
        let mut reader = WireReader::new(&data);
        reader.read_u8().unwrap();
        let err = reader.read_u32().unwrap_err();
        assert!(matches!(
            err,
            ReplicaError::BufferTooShort {
                expected: 5,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_payload_length_checked() {
        // Declares 10 bytes, carries 2
        let data = [10, 0, 1, 2];
        let mut reader = WireReader::new(&data);
        assert!(matches!(
            reader.read_payload(),
            Err(ReplicaError::BufferTooShort { .. })
        ));
    }

    #[test]
    fn test_invalid_bool() {
        let data = [2];
        let mut reader = WireReader::new(&data);
        assert!(matches!(
            reader.read_bool(),
            Err(ReplicaError::InvalidWireFormat(_))
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let data = [1, 2];
        let mut reader = WireReader::new(&data);
        reader.read_u8().unwrap();
        assert!(reader.finish().is_err());
    }
}
