//! Memory-Mapped Message Files
//!
//! Flattened message di-mmap langsung:
//! - Zero-copy read: `bytes()` menunjuk ke page cache, decode langsung dari sana
//! - Write in place: file di-size ke `flattened_size()` lalu di-flatten ke mapping
//! - Format apa pun yang bisa di-unflatten bisa di-load

use memmap2::{Mmap, MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::error::{MessageError, Result};
use crate::message::MessageStore;

/// Read-only mapping atas satu flattened message
pub struct MessageFile {
    mmap: Mmap,
}

impl MessageFile {
    /// Tulis `store` (native format) ke `path` lewat mapping writable
    pub fn create<P: AsRef<Path>>(path: P, store: &MessageStore) -> Result<Self> {
        let size = store.flattened_size();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size as u64)?;

        // SAFETY: file baru di-truncate dan dibuka read/write oleh kita sendiri
        let mut mmap: MmapMut = unsafe { MmapOptions::new().len(size).map_mut(&file)? };
        store.flatten_to_slice(&mut mmap[..])?;
        mmap.flush()?;

        log::debug!("message file: wrote {} bytes", size);
        Ok(Self {
            mmap: mmap.make_read_only()?,
        })
    }

    /// Map file yang sudah ada (read-only)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            // mmap panjang nol tidak valid; file kosong bukan message
            return Err(MessageError::bad_data("empty message file"));
        }

        // SAFETY: mapping read-only; isi file divalidasi penuh saat load()
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(Self { mmap })
    }

    /// Raw bytes dari mapping (zero-copy)
    #[inline(always)]
    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Decode isi file ke store baru
    pub fn load(&self) -> Result<MessageStore> {
        MessageStore::unflatten(self.bytes())
    }
}
