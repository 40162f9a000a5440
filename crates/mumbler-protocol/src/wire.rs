//! Low-level readers and writers for payload fields.
//!
//! Integers are fixed-width little-endian. Strings are UTF-8 prefixed with
//! their byte length as a 7-bit variable-length integer (low bits first,
//! high bit set on every byte but the last). Lists are prefixed with a
//! `u16` count.

use crate::ProtocolError;

/// Longest string the length prefix may describe.
pub(crate) const MAX_STRING_LEN: usize = i32::MAX as usize;

/// Longest list a `u16` count may describe.
pub(crate) const MAX_LIST_LEN: usize = u16::MAX as usize;

/// A 7-bit encoded `u32` never needs more than 5 bytes.
const MAX_VARINT_BYTES: usize = 5;

// ---------------------------------------------------------------------------
// PacketWriter
// ---------------------------------------------------------------------------

/// Appends payload fields to an owned buffer.
///
/// The writer is only handed back as bytes by [`into_bytes`](Self::into_bytes)
/// once every field has been written, so a failed encode never leaks a
/// half-written packet.
#[derive(Debug, Default)]
pub(crate) struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub(crate) fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub(crate) fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a length-prefixed UTF-8 string.
    pub(crate) fn write_str(
        &mut self,
        field: &'static str,
        value: &str,
    ) -> Result<(), ProtocolError> {
        let len = value.len();
        if len > MAX_STRING_LEN {
            return Err(ProtocolError::PayloadTooLarge {
                field,
                len,
                max: MAX_STRING_LEN,
            });
        }
        // Checked above: the length fits in 31 bits.
        let mut rest = len as u32;
        while rest >= 0x80 {
            self.buf.push((rest as u8) | 0x80);
            rest >>= 7;
        }
        self.buf.push(rest as u8);
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Writes the `u16` count that precedes a list.
    pub(crate) fn write_count(
        &mut self,
        field: &'static str,
        len: usize,
    ) -> Result<(), ProtocolError> {
        let count = u16::try_from(len).map_err(|_| {
            ProtocolError::PayloadTooLarge {
                field,
                len,
                max: MAX_LIST_LEN,
            }
        })?;
        self.write_u16(count);
        Ok(())
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

// ---------------------------------------------------------------------------
// PacketReader
// ---------------------------------------------------------------------------

/// Reads payload fields from a borrowed byte slice.
///
/// Every read is bounds-checked; running out of bytes is a
/// [`ProtocolError::MalformedPayload`], never a panic.
#[derive(Debug)]
pub(crate) struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(
        &mut self,
        len: usize,
        field: &str,
    ) -> Result<&'a [u8], ProtocolError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                ProtocolError::MalformedPayload(format!(
                    "truncated {field}: need {len} bytes at offset {}, have {}",
                    self.pos,
                    self.data.len() - self.pos,
                ))
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub(crate) fn read_u8(&mut self, field: &str) -> Result<u8, ProtocolError> {
        Ok(self.take(1, field)?[0])
    }

    pub(crate) fn read_u16(
        &mut self,
        field: &str,
    ) -> Result<u16, ProtocolError> {
        let bytes = self.take(2, field)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_u32(
        &mut self,
        field: &str,
    ) -> Result<u32, ProtocolError> {
        let bytes = self.take(4, field)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a 7-bit encoded length prefix.
    fn read_varint(&mut self, field: &str) -> Result<usize, ProtocolError> {
        let mut value: u64 = 0;
        for index in 0..MAX_VARINT_BYTES {
            let byte = self.read_u8(field)?;
            value |= u64::from(byte & 0x7f) << (7 * index);
            if byte & 0x80 == 0 {
                return usize::try_from(value)
                    .ok()
                    .filter(|len| *len <= MAX_STRING_LEN)
                    .ok_or_else(|| {
                        ProtocolError::MalformedPayload(format!(
                            "{field} length {value} out of range"
                        ))
                    });
            }
        }
        Err(ProtocolError::MalformedPayload(format!(
            "{field} length prefix longer than {MAX_VARINT_BYTES} bytes"
        )))
    }

    pub(crate) fn read_string(
        &mut self,
        field: &str,
    ) -> Result<String, ProtocolError> {
        let len = self.read_varint(field)?;
        let bytes = self.take(len, field)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            ProtocolError::MalformedPayload(format!("{field} is not UTF-8: {e}"))
        })
    }

    pub(crate) fn read_count(
        &mut self,
        field: &str,
    ) -> Result<usize, ProtocolError> {
        self.read_u16(field).map(usize::from)
    }

    /// Capacity to reserve for a list of `count` elements, each at least
    /// `min_len` bytes long, given what is left in the buffer.
    pub(crate) fn bounded_capacity(
        &self,
        count: usize,
        min_len: usize,
    ) -> usize {
        count.min((self.data.len() - self.pos) / min_len.max(1))
    }

    /// Asserts the payload has been fully consumed.
    pub(crate) fn finish(self) -> Result<(), ProtocolError> {
        let trailing = self.data.len() - self.pos;
        if trailing == 0 {
            Ok(())
        } else {
            Err(ProtocolError::MalformedPayload(format!(
                "{trailing} trailing bytes after payload"
            )))
        }
    }
}
