//! Protocol Layer: flatten / unflatten
//!
//! Prinsip desain:
//! - Satu format tulis: native (`'4GSM'`), selalu little-endian
//! - Empat format baca, dipilih dari magic lewat tabel statis
//! - All-or-nothing: decoder selalu mengisi store baru, target lama
//!   hanya diganti kalau decode sukses
//!
//! ┌────────────┐   magic    ┌─────────────────────────────┐
//! │ bytes      │ ─────────► │ FORMATS: native / r5 / dano │ ──► MessageStore
//! └────────────┘            │          / kmessage         │
//!                           └─────────────────────────────┘

pub mod checksum;
pub mod dano;
mod io;
pub mod kmessage;
pub mod native;
pub mod r5;

use std::io::{Read, Write};

use crate::config::StoreConfig;
use crate::error::{MessageError, Result};
use crate::message::MessageStore;

pub use checksum::header_checksum;
pub use kmessage::{KMessage, KMessageField, KMessageSource};

/// Bytes minimum yang dibutuhkan untuk membaca declared size
pub const SIZE_PREFIX_LEN: usize = 12;

/// Satu strategi decode, dipilih dari magic pertama
pub struct WireFormat {
    pub name: &'static str,
    /// Magic seperti terbaca little-endian dari 4 byte pertama
    pub magic: u32,
    /// Input ditulis big-endian
    pub swapped: bool,
    declared_size: fn(&[u8], bool) -> Result<usize>,
    decode: fn(&[u8], bool, &StoreConfig) -> Result<MessageStore>,
}

impl WireFormat {
    /// Total size yang dideklarasikan prefix (minimal `SIZE_PREFIX_LEN` bytes)
    pub fn declared_size(&self, prefix: &[u8]) -> Result<usize> {
        (self.declared_size)(prefix, self.swapped)
    }

    pub fn decode(&self, bytes: &[u8], config: &StoreConfig) -> Result<MessageStore> {
        (self.decode)(bytes, self.swapped, config)
    }
}

impl std::fmt::Debug for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireFormat")
            .field("name", &self.name)
            .field("magic", &format_args!("{:#010x}", self.magic))
            .field("swapped", &self.swapped)
            .finish()
    }
}

/// Tabel format yang dikenali
pub static FORMATS: [WireFormat; 7] = [
    WireFormat {
        name: "native",
        magic: native::MAGIC_NATIVE,
        swapped: false,
        declared_size: native::declared_size,
        decode: native::unflatten,
    },
    WireFormat {
        name: "native (swapped)",
        magic: native::MAGIC_NATIVE_SWAPPED,
        swapped: true,
        declared_size: native::declared_size,
        decode: native::unflatten,
    },
    WireFormat {
        name: "r5",
        magic: r5::MAGIC_R5,
        swapped: false,
        declared_size: native::declared_size,
        decode: r5::unflatten,
    },
    WireFormat {
        name: "r5 (swapped)",
        magic: r5::MAGIC_R5_SWAPPED,
        swapped: true,
        declared_size: native::declared_size,
        decode: r5::unflatten,
    },
    WireFormat {
        name: "dano",
        magic: dano::MAGIC_DANO,
        swapped: false,
        declared_size: dano::declared_size,
        decode: dano::unflatten,
    },
    WireFormat {
        name: "dano (swapped)",
        magic: dano::MAGIC_DANO_SWAPPED,
        swapped: true,
        declared_size: dano::declared_size,
        decode: dano::unflatten,
    },
    WireFormat {
        name: "kmessage",
        magic: kmessage::MAGIC_KMESSAGE,
        swapped: false,
        declared_size: kmessage::declared_size,
        decode: kmessage::unflatten,
    },
];

/// Cari format dari 4 byte pertama
pub fn detect_format(bytes: &[u8]) -> Result<&'static WireFormat> {
    let magic = bytes
        .get(..4)
        .map(|raw| u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
        .ok_or_else(|| MessageError::bad_data("buffer shorter than magic"))?;

    FORMATS
        .iter()
        .find(|format| format.magic == magic)
        .ok_or(MessageError::NotAMessage)
}

/// Penolakan store terhadap isi wire = data rusak, bukan salah caller
pub(crate) fn wire_error(err: MessageError) -> MessageError {
    match err {
        MessageError::BadValue(reason) => MessageError::bad_data(reason),
        MessageError::TypeMismatch => MessageError::bad_data("name repeated with another type"),
        MessageError::BadIndex => MessageError::bad_data("item index out of range"),
        other => other,
    }
}

impl MessageStore {
    /// Panjang hasil `flatten` untuk state saat ini
    pub fn flattened_size(&self) -> usize {
        native::flattened_size(self)
    }

    /// Flatten ke buffer baru (native format)
    pub fn flatten(&self) -> Result<Vec<u8>> {
        let size = self.flattened_size();
        let mut out = Vec::new();
        out.try_reserve_exact(size)
            .map_err(|_| MessageError::OutOfMemory)?;
        out.resize(size, 0);
        native::flatten_to_slice(self, &mut out)?;
        Ok(out)
    }

    /// Flatten ke `out`; `out.len()` harus >= `flattened_size()`
    pub fn flatten_to_slice(&self, out: &mut [u8]) -> Result<()> {
        native::flatten_to_slice(self, out)
    }

    /// Flatten ke writer apa pun; returns jumlah bytes yang ditulis
    pub fn flatten_into<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let bytes = self.flatten()?;
        writer.write_all(&bytes)?;
        Ok(bytes.len())
    }

    /// Decode format apa pun yang dikenali dengan config default
    pub fn unflatten(bytes: &[u8]) -> Result<Self> {
        Self::unflatten_with_config(bytes, StoreConfig::default())
    }

    pub fn unflatten_with_config(bytes: &[u8], config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let format = detect_format(bytes)?;
        log::debug!("unflatten: {} bytes as {} format", bytes.len(), format.name);

        format.decode(bytes, &config).map_err(|err| {
            log::debug!("unflatten: {} decoder rejected input: {}", format.name, err);
            err
        })
    }

    /// Decode ke store ini; kalau gagal, store tidak berubah sama sekali
    pub fn unflatten_in_place(&mut self, bytes: &[u8]) -> Result<()> {
        let decoded = Self::unflatten_with_config(bytes, *self.config())?;
        *self = decoded;
        Ok(())
    }

    /// Baca tepat satu flattened message dari stream
    ///
    /// Prefix dibaca dulu untuk menentukan format dan declared size, lalu
    /// sisa message dibaca persis sebanyak itu.
    pub fn unflatten_from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buffer = vec![0u8; SIZE_PREFIX_LEN];
        reader.read_exact(&mut buffer[..4])?;
        let format = detect_format(&buffer)?;

        reader.read_exact(&mut buffer[4..])?;
        let size = format.declared_size(&buffer)?;
        if size < SIZE_PREFIX_LEN {
            return Err(MessageError::bad_data(format!(
                "declared size {} smaller than prefix",
                size
            )));
        }

        // Buffer tumbuh sesuai bytes yang benar-benar datang, bukan
        // langsung sebesar declared size
        let remaining = (size - SIZE_PREFIX_LEN) as u64;
        reader.by_ref().take(remaining).read_to_end(&mut buffer)?;
        if buffer.len() != size {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("stream ended after {} of {} bytes", buffer.len(), size),
            )
            .into());
        }

        log::debug!("unflatten_from_reader: read {} bytes of {} format", size, format.name);
        Self::unflatten(&buffer)
    }
}
