//! R5 wire format (`'FOB1'`), decode only
//!
//! Header prefix sama dengan native (tanpa field_count/data_size),
//! lalu stream field sampai flags byte tanpa VALID:
//! ┌───────┬──────┬────────────────┬────────────────┬─────────┬──────┬──────┐
//! │ flags │ type │ count          │ data size      │ namelen │ name │ data │
//! │ u8    │ u32  │ -/u8/u32       │ u8/u32         │ u8      │      │      │
//! └───────┴──────┴────────────────┴────────────────┴─────────┴──────┴──────┘
//! count tidak ada kalau SINGLE; u8 kalau MINI. Variable item:
//! `size u32 + payload + pad ke 8`.

use super::io::ByteReader;
use super::native::{read_header_prefix, verify_checksum};
use crate::config::StoreConfig;
use crate::core::framed_size;
use crate::error::{MessageError, Result};
use crate::message::{swap_items, MessageStore, TypeCode};

pub const MAGIC_R5: u32 = u32::from_be_bytes(*b"FOB1");
pub const MAGIC_R5_SWAPPED: u32 = MAGIC_R5.swap_bytes();

pub const R5_FIELD_FLAG_VALID: u8 = 0x01;
pub const R5_FIELD_FLAG_MINI_DATA: u8 = 0x02;
pub const R5_FIELD_FLAG_FIXED_SIZE: u8 = 0x04;
pub const R5_FIELD_FLAG_SINGLE_ITEM: u8 = 0x08;

/// Decode R5 bytes ke store baru lewat operasi `add_data` biasa
pub(crate) fn unflatten(bytes: &[u8], swapped: bool, config: &StoreConfig) -> Result<MessageStore> {
    let mut reader = ByteReader::new(bytes, swapped);
    reader.skip(4)?;

    let (checksum, prefix) = read_header_prefix(&mut reader)?;
    verify_checksum(bytes, reader.position(), checksum)?;

    if prefix.flattened_size > bytes.len() {
        return Err(MessageError::bad_data(format!(
            "declared size {} exceeds available {} bytes",
            prefix.flattened_size,
            bytes.len()
        )));
    }
    if prefix.flattened_size < reader.position() {
        return Err(MessageError::bad_data("declared size smaller than header"));
    }

    let mut store = MessageStore::with_config(prefix.what, *config)?;
    store.set_header(prefix.header);

    // Field stream hanya boleh membaca sampai declared size
    let mut body = ByteReader::new(&bytes[..prefix.flattened_size], swapped);
    body.seek(reader.position())?;

    let mut index = 0usize;
    loop {
        let flags = body.u8()?;
        if flags & R5_FIELD_FLAG_VALID == 0 {
            break;
        }
        read_field(&mut body, flags, &mut store).map_err(|err| match err {
            MessageError::BadData(reason) => {
                MessageError::BadData(format!("r5 field {}: {}", index, reason))
            }
            other => other,
        })?;
        index += 1;
    }

    Ok(store)
}

fn read_field(reader: &mut ByteReader<'_>, flags: u8, store: &mut MessageStore) -> Result<()> {
    let mini = flags & R5_FIELD_FLAG_MINI_DATA != 0;
    let fixed = flags & R5_FIELD_FLAG_FIXED_SIZE != 0;

    let type_code = TypeCode(reader.u32()?);
    let count = if flags & R5_FIELD_FLAG_SINGLE_ITEM != 0 {
        1
    } else if mini {
        reader.u8()? as usize
    } else {
        reader.u32()? as usize
    };
    let data_size = if mini {
        reader.u8()? as usize
    } else {
        reader.u32()? as usize
    };

    let name_length = reader.u8()? as usize;
    let name = std::str::from_utf8(reader.take(name_length)?)
        .map_err(|_| MessageError::bad_data("name is not valid UTF-8"))?;
    let data = reader.take(data_size)?;

    if count == 0 {
        return Err(MessageError::bad_data("field without items"));
    }

    let swap_width = if reader.is_swapped() {
        type_code.swap_width()
    } else {
        None
    };
    let mut scratch = Vec::new();
    let mut add = |item: &[u8]| -> Result<()> {
        let result = match swap_width.filter(|width| item.len() % width == 0) {
            Some(width) => {
                scratch.clear();
                scratch.extend_from_slice(item);
                swap_items(&mut scratch, width);
                store.add_data(name, type_code, &scratch, fixed)
            }
            None => store.add_data(name, type_code, item, fixed),
        };
        result.map_err(super::wire_error)
    };

    if fixed {
        if data_size == 0 || data_size % count != 0 {
            return Err(MessageError::bad_data(format!(
                "fixed data size {} not divisible by count {}",
                data_size, count
            )));
        }
        let item_size = data_size / count;
        for item in data.chunks_exact(item_size) {
            add(item)?;
        }
    } else {
        let mut items = ByteReader::new(data, reader.is_swapped());
        for _ in 0..count {
            let start = items.position();
            let len = items.u32()? as usize;
            let payload = items.take(len)?;
            add(payload)?;
            items.seek(start)?;
            // record terakhir boleh tanpa padding penuh
            let record = framed_size(len).min(items.remaining());
            items.skip(record)?;
        }
    }
    Ok(())
}
