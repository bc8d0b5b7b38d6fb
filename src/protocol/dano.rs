//! Dano wire format (`'FOB2'`), decode only
//!
//! Message adalah urutan section `{code u32, size i32}`; size mencakup
//! 8 byte section header dan payload yang di-pad ke 8.
//! ┌───────────────────────────────┐
//! │ FOB2 │ total │ what │ pad     │  header section (16 bytes)
//! ├───────────────────────────────┤
//! │ SGDa │ size  │ type, item_size, name, data            │
//! │ FADa │ size  │ type, item_size, count, name, data     │
//! │ VADa │ size  │ type, count, name, end offsets, data   │
//! │ STof / ENwh / DXIn / unknown  │  dilewati
//! │ DDEn │ 8     │                │  akhir message
//! └───────────────────────────────┘

use super::io::ByteReader;
use crate::config::StoreConfig;
use crate::error::{MessageError, Result};
use crate::message::{swap_items, MessageStore, TypeCode};

pub const MAGIC_DANO: u32 = u32::from_be_bytes(*b"FOB2");
pub const MAGIC_DANO_SWAPPED: u32 = MAGIC_DANO.swap_bytes();

pub const SECTION_HEADER_SIZE: usize = 8;
/// magic + size + what + padding
pub const DANO_HEADER_SIZE: usize = 16;

pub const SECTION_SINGLE_DATA: u32 = u32::from_be_bytes(*b"SGDa");
pub const SECTION_FIXED_ARRAY: u32 = u32::from_be_bytes(*b"FADa");
pub const SECTION_VARIABLE_ARRAY: u32 = u32::from_be_bytes(*b"VADa");
pub const SECTION_OFFSET_TABLE: u32 = u32::from_be_bytes(*b"STof");
pub const SECTION_TARGET_INFO: u32 = u32::from_be_bytes(*b"ENwh");
pub const SECTION_SINGLE_DATA_INDEX: u32 = u32::from_be_bytes(*b"DXIn");
pub const SECTION_END_OF_DATA: u32 = u32::from_be_bytes(*b"DDEn");

/// Declared total size: i32 tepat setelah magic
pub(crate) fn declared_size(prefix: &[u8], swapped: bool) -> Result<usize> {
    let mut reader = ByteReader::new(prefix, swapped);
    reader.seek(4)?;
    reader.size_i32()
}

pub(crate) fn unflatten(bytes: &[u8], swapped: bool, config: &StoreConfig) -> Result<MessageStore> {
    let mut reader = ByteReader::new(bytes, swapped);
    reader.skip(4)?;
    let total = reader.size_i32()?;
    let what = reader.u32()?;
    reader.skip(4)?;

    if total > bytes.len() {
        return Err(MessageError::bad_data(format!(
            "declared size {} exceeds available {} bytes",
            total,
            bytes.len()
        )));
    }
    if total < DANO_HEADER_SIZE {
        return Err(MessageError::bad_data("declared size smaller than header"));
    }

    let mut store = MessageStore::with_config(what, *config)?;
    let mut sections = ByteReader::new(&bytes[..total], swapped);
    sections.seek(DANO_HEADER_SIZE)?;

    loop {
        let start = sections.position();
        let code = sections.u32()?;
        let size = sections.size_i32()?;
        if size < SECTION_HEADER_SIZE {
            return Err(MessageError::bad_data(format!(
                "section at {} has size {}",
                start, size
            )));
        }
        let payload = sections.take(size - SECTION_HEADER_SIZE)?;
        let mut section = ByteReader::new(payload, swapped);

        let result = match code {
            SECTION_END_OF_DATA => break,
            SECTION_SINGLE_DATA => read_single(&mut section, &mut store),
            SECTION_FIXED_ARRAY => read_fixed_array(&mut section, &mut store),
            SECTION_VARIABLE_ARRAY => read_variable_array(&mut section, &mut store),
            SECTION_OFFSET_TABLE | SECTION_TARGET_INFO | SECTION_SINGLE_DATA_INDEX => {
                log::trace!("dano: skipping section {} ({} bytes)", TypeCode(code), size);
                Ok(())
            }
            other => {
                log::trace!("dano: skipping unknown section {} ({} bytes)", TypeCode(other), size);
                Ok(())
            }
        };
        result.map_err(|err| match err {
            MessageError::BadData(reason) => {
                MessageError::BadData(format!("dano section at {}: {}", start, reason))
            }
            other => other,
        })?;
    }

    Ok(store)
}

fn read_name<'a>(section: &mut ByteReader<'a>) -> Result<&'a str> {
    let len = section.u8()? as usize;
    std::str::from_utf8(section.take(len)?)
        .map_err(|_| MessageError::bad_data("name is not valid UTF-8"))
}

/// Tambah item; swap kalau input big-endian dan type punya swap width
fn add_item(
    store: &mut MessageStore,
    name: &str,
    type_code: TypeCode,
    item: &[u8],
    fixed: bool,
    swapped: bool,
) -> Result<()> {
    let width = type_code
        .swap_width()
        .filter(|width| swapped && item.len() % width == 0);
    let result = match width {
        Some(width) => {
            let mut owned = item.to_vec();
            swap_items(&mut owned, width);
            store.add_data(name, type_code, &owned, fixed)
        }
        None => store.add_data(name, type_code, item, fixed),
    };
    result.map_err(super::wire_error)
}

fn read_single(section: &mut ByteReader<'_>, store: &mut MessageStore) -> Result<()> {
    let type_code = TypeCode(section.u32()?);
    let item_size = section.size_i32()?;
    let name = read_name(section)?;
    let item = section.take(item_size)?;
    let fixed = type_code.is_fixed_size();
    add_item(store, name, type_code, item, fixed, section.is_swapped())
}

fn read_fixed_array(section: &mut ByteReader<'_>, store: &mut MessageStore) -> Result<()> {
    let type_code = TypeCode(section.u32()?);
    let item_size = section.size_i32()?;
    let count = section.size_i32()?;
    let name = read_name(section)?;

    if item_size == 0 || count == 0 {
        return Err(MessageError::bad_data("empty fixed array"));
    }
    let total = item_size
        .checked_mul(count)
        .ok_or_else(|| MessageError::bad_data("fixed array size overflow"))?;
    let data = section.take(total)?;

    for item in data.chunks_exact(item_size) {
        add_item(store, name, type_code, item, true, section.is_swapped())?;
    }
    Ok(())
}

fn read_variable_array(section: &mut ByteReader<'_>, store: &mut MessageStore) -> Result<()> {
    let type_code = TypeCode(section.u32()?);
    let count = section.size_i32()?;
    let name = read_name(section)?;

    if count == 0 {
        return Err(MessageError::bad_data("empty variable array"));
    }
    if count > section.remaining() / 4 {
        return Err(MessageError::bad_data("offset table past end of section"));
    }

    let mut ends = Vec::new();
    ends.try_reserve_exact(count)
        .map_err(|_| MessageError::OutOfMemory)?;
    for _ in 0..count {
        ends.push(section.size_i32()?);
    }

    let data_len = ends.last().copied().unwrap_or(0);
    let data = section.take(data_len)?;

    let mut begin = 0usize;
    for end in ends {
        if end < begin || end > data.len() {
            return Err(MessageError::bad_data("variable array offsets not ascending"));
        }
        add_item(store, name, type_code, &data[begin..end], false, section.is_swapped())?;
        begin = end;
    }
    Ok(())
}
