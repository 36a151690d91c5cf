//! Tools for converting wire-format structures to and from bytes.
//!
//! This module is a trimmed, `std`-only descendant of the `Pod`/`Bytes`
//! machinery in `object::pod`: the same cast-with-bounds-and-alignment-check
//! approach, without the `no_std`/`alloc` generality this crate does not
//! need.

use std::{fmt, mem, slice};

type Result<T> = std::result::Result<T, ()>;

/// A trait for types that can safely be converted from and to byte slices.
///
/// A type that is `Pod` must:
/// - be `#[repr(C)]` or `#[repr(transparent)]`
/// - have no invalid byte values
/// - have no padding
pub unsafe trait Pod: Copy + 'static {}

#[inline]
fn from_bytes<T: Pod>(data: &[u8]) -> Result<(&T, &[u8])> {
    let size = mem::size_of::<T>();
    let tail = data.get(size..).ok_or(())?;
    let ptr = data.as_ptr();
    if (ptr as usize) % mem::align_of::<T>() != 0 {
        return Err(());
    }
    let val = unsafe { &*ptr.cast() };
    Ok((val, tail))
}

/// A newtype for byte slices used while parsing the wire format.
///
/// Unlike plain slice indexing this never panics: every accessor returns a
/// `Result` so a truncated or corrupt file becomes a `Read` error instead of
/// an abort.
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct Bytes<'data>(pub &'data [u8]);

impl fmt::Debug for Bytes<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "Bytes({} bytes)", self.0.len())
    }
}

impl<'data> Bytes<'data> {
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Skip over the given number of bytes at the start of the byte slice.
    #[inline]
    pub fn skip(&mut self, offset: usize) -> Result<()> {
        match self.0.get(offset..) {
            Some(tail) => {
                self.0 = tail;
                Ok(())
            }
            None => {
                self.0 = &[];
                Err(())
            }
        }
    }

    /// Return the given number of bytes at the start of the slice, advancing past them.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<Bytes<'data>> {
        match (self.0.get(..count), self.0.get(count..)) {
            (Some(head), Some(tail)) => {
                self.0 = tail;
                Ok(Bytes(head))
            }
            _ => {
                self.0 = &[];
                Err(())
            }
        }
    }

    /// Return a `Pod` struct at the start of the slice, advancing past it.
    #[inline]
    pub fn read<T: Pod>(&mut self) -> Result<&'data T> {
        match from_bytes(self.0) {
            Ok((value, tail)) => {
                self.0 = tail;
                Ok(value)
            }
            Err(()) => {
                self.0 = &[];
                Err(())
            }
        }
    }

    /// Read a fixed-size little-endian `u16`.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b.0[0], b.0[1]]))
    }

    /// Read a fixed-size little-endian `i16`.
    #[inline]
    pub fn read_i16(&mut self) -> Result<i16> {
        self.read_u16().map(|v| v as i16)
    }

    /// Read a fixed-size little-endian `u32`.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b.0[0], b.0[1], b.0[2], b.0[3]]))
    }

    /// Read a fixed-size little-endian `u8`.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        let b = self.read_bytes(1)?;
        Ok(b.0[0])
    }

    /// Read `len` raw bytes as an owned vector.
    #[inline]
    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        Ok(self.read_bytes(len)?.0.to_vec())
    }
}

unsafe impl Pod for u8 {}
unsafe impl Pod for u16 {}
unsafe impl Pod for u32 {}
unsafe impl Pod for i16 {}
unsafe impl Pod for i32 {}

/// A small little-endian byte output buffer, used by the writers.
///
/// Mirrors the `gp_fputl16`/`gp_fputl32` helpers in the C emitter: every
/// multi-byte field is written one byte at a time in a fixed, explicit
/// order so there is never a question of host endianness leaking in.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i16(&mut self, v: i16) -> &mut Self {
        self.u16(v as u16)
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    pub fn zero(&mut self, count: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + count, 0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_u32() {
        let mut w = ByteWriter::new();
        w.u32(0xdead_beef);
        let mut b = Bytes(&w.into_vec());
        assert_eq!(b.read_u32().unwrap(), 0xdead_beef);
        assert!(b.is_empty());
    }

    #[test]
    fn truncated_read_errors() {
        let data = [0u8; 1];
        let mut b = Bytes(&data);
        assert!(b.read_u32().is_err());
    }
}
