//! Relocatable Data Arena
//!
//! Satu buffer kontigu yang menyimpan semua name + value bytes:
//! ┌──────────────┬──────────────────┬──────────────┬─────────┐
//! │ name0\0      │ data0 ...        │ name1\0      │ data1.. │
//! └──────────────┴──────────────────┴──────────────┴─────────┘
//!
//! `resize(offset, delta)` menyisipkan atau menghapus bytes di tengah
//! buffer dan menggeser tail. Setiap resize boleh me-relocate buffer,
//! jadi caller hanya menyimpan offset, tidak pernah pointer.

use crate::error::{MessageError, Result};

/// Growable byte buffer dengan amortized growth dan shrink hysteresis
#[derive(Debug, Clone)]
pub struct DataArena {
    buffer: Vec<u8>,
    max_prealloc: usize,
}

impl DataArena {
    /// Membuat arena kosong (belum ada alokasi)
    pub fn new(max_prealloc: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_prealloc,
        }
    }

    /// Adopt bytes yang sudah jadi (dipakai saat unflatten)
    pub(crate) fn from_bytes(bytes: &[u8], max_prealloc: usize) -> Result<Self> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(bytes.len())
            .map_err(|_| MessageError::OutOfMemory)?;
        buffer.extend_from_slice(bytes);
        Ok(Self {
            buffer,
            max_prealloc,
        })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Kapasitas buffer saat ini (len + slack)
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Slice `len` bytes mulai dari `offset`
    ///
    /// Offsets selalu berasal dari field table, jadi out-of-range di sini
    /// adalah bug internal.
    #[inline(always)]
    pub fn slice(&self, offset: usize, len: usize) -> &[u8] {
        &self.buffer[offset..offset + len]
    }

    #[inline(always)]
    pub fn slice_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.buffer[offset..offset + len]
    }

    /// Copy `bytes` ke arena mulai di `offset` (region harus sudah ada)
    #[inline(always)]
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        self.buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Insert `delta` bytes (delta > 0) atau hapus `|delta|` bytes (delta < 0)
    /// di `offset`, geser tail dengan satu bulk move.
    ///
    /// Bytes yang baru disisipkan di-zero. Kalau alokasi gagal, arena
    /// tetap persis seperti sebelum call.
    pub fn resize(&mut self, offset: usize, delta: isize) -> Result<()> {
        let len = self.buffer.len();
        if offset > len {
            return Err(MessageError::BadValue("arena offset past end"));
        }

        if delta == 0 {
            return Ok(());
        }

        if delta > 0 {
            let change = delta as usize;
            let needed = len.checked_add(change).ok_or(MessageError::OutOfMemory)?;
            self.reserve_for(needed)?;

            // Tidak ada lagi yang bisa gagal setelah ini
            self.buffer.resize(needed, 0);
            if offset < len {
                self.buffer.copy_within(offset..len, offset + change);
                self.buffer[offset..offset + change].fill(0);
            }
            return Ok(());
        }

        let change = delta.unsigned_abs();
        if change > len - offset {
            return Err(MessageError::BadValue("arena removal past end"));
        }

        self.buffer.copy_within(offset + change..len, offset);
        self.buffer.truncate(len - change);
        self.shrink_slack();
        Ok(())
    }

    /// Hapus semua data, lepas alokasi
    pub fn clear(&mut self) {
        self.buffer = Vec::new();
    }

    /// Grow capacity ke min(2*cap, cap + max_prealloc), minimal `needed`
    fn reserve_for(&mut self, needed: usize) -> Result<()> {
        let capacity = self.buffer.capacity();
        if needed <= capacity {
            return Ok(());
        }

        let doubled = capacity.saturating_mul(2);
        let capped = doubled.min(capacity.saturating_add(self.max_prealloc));
        let target = capped.max(needed);

        log::trace!(
            "arena grow: len={} cap={} -> target={}",
            self.buffer.len(),
            capacity,
            target
        );

        let len = self.buffer.len();
        if self.buffer.try_reserve_exact(target - len).is_err() {
            // Target preallocation terlalu besar; coba ukuran minimum
            self.buffer
                .try_reserve_exact(needed - len)
                .map_err(|_| MessageError::OutOfMemory)?;
        }
        Ok(())
    }

    /// Shrink kalau slack melebihi max_prealloc, sisakan max_prealloc/2
    fn shrink_slack(&mut self) {
        let len = self.buffer.len();
        let slack = self.buffer.capacity() - len;
        if slack > self.max_prealloc {
            let keep = self.max_prealloc / 2;
            log::trace!("arena shrink: len={} slack={} -> {}", len, slack, keep);
            self.buffer.shrink_to(len + keep);
        }
    }
}
