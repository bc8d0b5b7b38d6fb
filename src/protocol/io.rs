//! Byte cursor untuk decode dan encode
//!
//! Reader membaca little-endian, atau big-endian kalau `swapped`
//! (magic terbaca terbalik). Writer selalu little-endian dan menulis
//! ke buffer yang ukurannya sudah dihitung sebelumnya.

use crate::error::{MessageError, Result};

/// Bounds-checked reader; setiap over-read menjadi `BadData`
#[derive(Debug, Clone)]
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    swapped: bool,
}

impl<'a> ByteReader<'a> {
    #[inline(always)]
    pub fn new(bytes: &'a [u8], swapped: bool) -> Self {
        Self {
            bytes,
            pos: 0,
            swapped,
        }
    }

    #[inline(always)]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    #[inline(always)]
    pub fn is_swapped(&self) -> bool {
        self.swapped
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.bytes.len() {
            return Err(MessageError::bad_data(format!(
                "seek to {} past end of {} bytes",
                pos,
                self.bytes.len()
            )));
        }
        self.pos = pos;
        Ok(())
    }

    /// Ambil `len` bytes mentah
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                MessageError::bad_data(format!(
                    "truncated: need {} bytes at offset {}, have {}",
                    len,
                    self.pos,
                    self.remaining()
                ))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    #[inline(always)]
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    #[inline(always)]
    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut raw = [0u8; N];
        raw.copy_from_slice(self.take(N)?);
        if self.swapped {
            raw.reverse();
        }
        Ok(raw)
    }

    #[inline(always)]
    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    #[inline(always)]
    pub fn u16(&mut self) -> Result<u16> {
        self.array().map(u16::from_le_bytes)
    }

    #[inline(always)]
    pub fn i16(&mut self) -> Result<i16> {
        self.array().map(i16::from_le_bytes)
    }

    #[inline(always)]
    pub fn u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }

    #[inline(always)]
    pub fn i32(&mut self) -> Result<i32> {
        self.array().map(i32::from_le_bytes)
    }

    /// Size/count field: negatif tidak valid
    pub fn size_i32(&mut self) -> Result<usize> {
        let value = self.i32()?;
        usize::try_from(value)
            .map_err(|_| MessageError::bad_data(format!("negative size {}", value)))
    }
}

/// Little-endian writer ke buffer yang sudah pas ukurannya
///
/// Ukuran dihitung oleh `flattened_size`, jadi overflow di sini
/// adalah bug internal.
pub(crate) struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    #[inline(always)]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline(always)]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline(always)]
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    #[inline(always)]
    pub fn put_u8(&mut self, value: u8) {
        self.put_bytes(&[value]);
    }

    #[inline(always)]
    pub fn put_u16(&mut self, value: u16) {
        self.put_bytes(&value.to_le_bytes());
    }

    #[inline(always)]
    pub fn put_u32(&mut self, value: u32) {
        self.put_bytes(&value.to_le_bytes());
    }

    #[inline(always)]
    pub fn put_i32(&mut self, value: i32) {
        self.put_bytes(&value.to_le_bytes());
    }

    /// Tulis ulang u32 di posisi yang sudah lewat (checksum patch)
    #[inline(always)]
    pub fn patch_u32(&mut self, at: usize, value: u32) {
        self.buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    #[inline(always)]
    pub fn written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
}
