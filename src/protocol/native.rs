//! Native wire format (`'4GSM'`)
//!
//! Layout (semua integer little-endian):
//! ┌──────────────────────────────────────────────────────────────┐
//! │ magic u32 │ checksum u32 │ flattened_size u32 │ what u32     │
//! │ flags u8  │ [target i32] │ [reply port/target/team + 4 u8]  │
//! │ field_count u32 │ data_size u32                              │
//! ├──────────────────────────────────────────────────────────────┤
//! │ field table: field_count x 20 bytes                          │
//! │   flags u16 │ name_length u16 │ type u32 │ count u32         │
//! │   data_size u32 │ offset u32                                 │
//! ├──────────────────────────────────────────────────────────────┤
//! │ data region: arena verbatim (name\0 + items per field)       │
//! └──────────────────────────────────────────────────────────────┘
//!
//! Panjang header variabel (target/reply opsional), jadi selalu
//! dihitung ulang dari state header saat flatten.

use std::collections::HashSet;

use super::checksum::header_checksum;
use super::io::{ByteReader, ByteWriter};
use crate::config::StoreConfig;
use crate::core::{
    framed_size, DataArena, FieldHeader, FieldTable, ItemLayout, FIELD_FLAG_FIXED_SIZE,
    FIELD_FLAG_VALID, ITEM_LENGTH_PREFIX, MAX_NAME_LENGTH,
};
use crate::error::{MessageError, Result};
use crate::message::{
    swap_items, DeliveryFlags, MessageHeader, MessageStore, ReplyAddress, TypeCode,
};

pub const MAGIC_NATIVE: u32 = u32::from_be_bytes(*b"4GSM");
pub const MAGIC_NATIVE_SWAPPED: u32 = MAGIC_NATIVE.swap_bytes();

pub const FLAG_INCLUDE_TARGET: u8 = 0x02;
pub const FLAG_INCLUDE_REPLY: u8 = 0x04;
pub const FLAG_SCRIPT_MESSAGE: u8 = 0x08;

/// magic + checksum + flattened_size + what + flags
pub const MIN_HEADER_SIZE: usize = 17;
pub const TARGET_SECTION_SIZE: usize = 4;
/// port + target + team + 4 flag bytes
pub const REPLY_SECTION_SIZE: usize = 16;
pub const FIELD_DESCRIPTOR_SIZE: usize = 20;
/// Offset `flattened_size` di header (native dan R5)
pub const SIZE_OFFSET: usize = 8;
const CHECKSUM_OFFSET: usize = 4;

/// Hasil decode prefix header yang dipakai bersama native dan R5
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeaderPrefix {
    pub flattened_size: usize,
    pub what: u32,
    pub header: MessageHeader,
}

/// Panjang prefix (sampai sebelum field_count) untuk state header ini
#[inline(always)]
pub(crate) fn prefix_size(header: &MessageHeader) -> usize {
    let mut size = MIN_HEADER_SIZE;
    if header.has_target() {
        size += TARGET_SECTION_SIZE;
    }
    if header.has_reply() {
        size += REPLY_SECTION_SIZE;
    }
    size
}

/// Baca checksum, size, what, flags dan section opsional.
/// Reader harus sudah melewati magic.
pub(crate) fn read_header_prefix(reader: &mut ByteReader<'_>) -> Result<(u32, HeaderPrefix)> {
    let checksum = reader.u32()?;
    let flattened_size = reader.u32()? as usize;
    let what = reader.u32()?;
    let flags = reader.u8()?;

    let mut header = MessageHeader::default();
    if flags & FLAG_INCLUDE_TARGET != 0 {
        header.target = Some(reader.i32()?);
    }
    if flags & FLAG_INCLUDE_REPLY != 0 {
        let port = reader.i32()?;
        let target = reader.i32()?;
        let team = reader.i32()?;
        header.reply_to = Some(ReplyAddress::new(port, target, team));
        header.delivery = DeliveryFlags {
            preferred: reader.u8()? != 0,
            reply_required: reader.u8()? != 0,
            reply_done: reader.u8()? != 0,
            is_reply: reader.u8()? != 0,
            // Reply info hanya ada kalau message pernah dikirim
            was_delivered: true,
        };
    }

    Ok((
        checksum,
        HeaderPrefix {
            flattened_size,
            what,
            header,
        },
    ))
}

/// Verifikasi checksum atas `bytes[8..header_len]`
pub(crate) fn verify_checksum(bytes: &[u8], header_len: usize, expected: u32) -> Result<()> {
    let actual = header_checksum(&bytes[SIZE_OFFSET..header_len]);
    if actual != expected {
        return Err(MessageError::bad_data(format!(
            "header checksum mismatch: stored {:#010x}, computed {:#010x}",
            expected, actual
        )));
    }
    Ok(())
}

fn write_header_prefix(writer: &mut ByteWriter<'_>, store: &MessageStore, total: usize) {
    let header = store.header();

    let mut flags = 0u8;
    if header.has_target() {
        flags |= FLAG_INCLUDE_TARGET;
    }
    if header.has_reply() {
        flags |= FLAG_INCLUDE_REPLY;
    }

    writer.put_u32(MAGIC_NATIVE);
    writer.put_u32(0); // checksum, di-patch setelah header lengkap
    writer.put_u32(total as u32);
    writer.put_u32(store.what);
    writer.put_u8(flags);

    if let Some(target) = header.target.filter(|_| header.has_target()) {
        writer.put_i32(target);
    }
    if let Some(reply) = header.reply_to.filter(|_| header.has_reply()) {
        let delivery = header.delivery;
        writer.put_i32(reply.port);
        writer.put_i32(reply.target);
        writer.put_i32(reply.team);
        writer.put_u8(u8::from(delivery.preferred));
        writer.put_u8(u8::from(delivery.reply_required));
        writer.put_u8(u8::from(delivery.reply_done));
        writer.put_u8(u8::from(delivery.is_reply));
    }
}

/// Ukuran header native lengkap (prefix + field_count + data_size)
#[inline(always)]
pub(crate) fn header_size(store: &MessageStore) -> usize {
    prefix_size(store.header()) + 8
}

/// Total bytes yang akan ditulis `flatten`
pub(crate) fn flattened_size(store: &MessageStore) -> usize {
    let table = store.table();
    header_size(store) + table.len() * FIELD_DESCRIPTOR_SIZE + table.arena().len()
}

/// Flatten ke `out`; panjang `out` harus >= `flattened_size`
pub(crate) fn flatten_to_slice(store: &MessageStore, out: &mut [u8]) -> Result<()> {
    let total = flattened_size(store);
    if out.len() < total {
        return Err(MessageError::BadValue("output buffer smaller than flattened size"));
    }
    if total > u32::MAX as usize {
        return Err(MessageError::OutOfMemory);
    }

    let table = store.table();
    let mut writer = ByteWriter::new(&mut out[..total]);

    write_header_prefix(&mut writer, store, total);
    writer.put_u32(table.len() as u32);
    writer.put_u32(table.arena().len() as u32);

    let header_len = writer.position();
    let checksum = header_checksum(&writer.written()[SIZE_OFFSET..header_len]);
    writer.patch_u32(CHECKSUM_OFFSET, checksum);

    for field in table.headers() {
        writer.put_u16(field.flags());
        writer.put_u16(field.name_length as u16);
        writer.put_u32(field.type_code.0);
        writer.put_u32(field.count as u32);
        writer.put_u32(field.data_size as u32);
        writer.put_u32(field.offset as u32);
    }

    writer.put_bytes(table.arena().as_bytes());
    debug_assert_eq!(writer.position(), total);
    Ok(())
}

/// Declared total size dari prefix native / R5
pub(crate) fn declared_size(prefix: &[u8], swapped: bool) -> Result<usize> {
    let mut reader = ByteReader::new(prefix, swapped);
    reader.seek(SIZE_OFFSET)?;
    Ok(reader.u32()? as usize)
}

/// Decode native bytes ke store baru
///
/// Semua ukuran, offset, nama dan item framing divalidasi sebelum store
/// dirakit; hash chains dibangun ulang, tidak pernah dibaca dari wire.
pub(crate) fn unflatten(bytes: &[u8], swapped: bool, config: &StoreConfig) -> Result<MessageStore> {
    let mut reader = ByteReader::new(bytes, swapped);
    reader.skip(4)?;

    let (checksum, prefix) = read_header_prefix(&mut reader)?;
    let field_count = reader.u32()? as usize;
    let data_size = reader.u32()? as usize;
    let header_len = reader.position();

    verify_checksum(bytes, header_len, checksum)?;

    if prefix.flattened_size > bytes.len() {
        return Err(MessageError::bad_data(format!(
            "declared size {} exceeds available {} bytes",
            prefix.flattened_size,
            bytes.len()
        )));
    }

    let expected = field_count
        .checked_mul(FIELD_DESCRIPTOR_SIZE)
        .and_then(|table| table.checked_add(header_len))
        .and_then(|size| size.checked_add(data_size))
        .ok_or_else(|| MessageError::bad_data("size overflow"))?;
    if expected != prefix.flattened_size {
        return Err(MessageError::bad_data(format!(
            "declared size {} does not match header + table + data = {}",
            prefix.flattened_size, expected
        )));
    }

    let table_start = header_len;
    let data_start = table_start + field_count * FIELD_DESCRIPTOR_SIZE;
    let data = &bytes[data_start..data_start + data_size];

    let mut fields = Vec::new();
    fields
        .try_reserve_exact(field_count)
        .map_err(|_| MessageError::OutOfMemory)?;
    let mut names = HashSet::with_capacity(field_count);
    let mut next_offset = 0usize;

    for index in 0..field_count {
        let field = read_descriptor(&mut reader, data, swapped, next_offset)
            .map_err(|err| annotate(err, index))?;

        let name = &data[field.offset..field.offset + field.name_length - 1];
        if !names.insert(name) {
            return Err(MessageError::bad_data(format!(
                "field {}: duplicate name",
                index
            )));
        }

        next_offset = field.end_offset();
        fields.push(field);
    }

    if next_offset != data_size {
        return Err(MessageError::bad_data(format!(
            "data region has {} bytes, fields cover {}",
            data_size, next_offset
        )));
    }

    let mut arena = DataArena::from_bytes(data, config.max_data_prealloc)?;
    if swapped {
        swap_field_data(&mut arena, &fields);
    }

    let table = FieldTable::from_parts(fields, arena, config);
    Ok(MessageStore::from_parts(
        prefix.what,
        prefix.header,
        table,
        *config,
    ))
}

fn annotate(err: MessageError, index: usize) -> MessageError {
    match err {
        MessageError::BadData(reason) => {
            MessageError::BadData(format!("field {}: {}", index, reason))
        }
        other => other,
    }
}

/// Baca dan validasi satu descriptor terhadap data region
fn read_descriptor(
    reader: &mut ByteReader<'_>,
    data: &[u8],
    swapped: bool,
    expected_offset: usize,
) -> Result<FieldHeader> {
    let flags = reader.u16()?;
    let name_length = reader.u16()? as usize;
    let type_code = TypeCode(reader.u32()?);
    let count = reader.u32()? as usize;
    let data_size = reader.u32()? as usize;
    let offset = reader.u32()? as usize;

    if flags & FIELD_FLAG_VALID == 0 || flags & !(FIELD_FLAG_VALID | FIELD_FLAG_FIXED_SIZE) != 0 {
        return Err(MessageError::bad_data(format!("invalid field flags {:#06x}", flags)));
    }
    if offset != expected_offset {
        return Err(MessageError::bad_data(format!(
            "offset {} breaks packing, expected {}",
            offset, expected_offset
        )));
    }
    if name_length < 2 || name_length > MAX_NAME_LENGTH + 1 {
        return Err(MessageError::bad_data(format!("bad name length {}", name_length)));
    }
    if count == 0 {
        return Err(MessageError::bad_data("field without items"));
    }
    // ANY hanya untuk query, tidak pernah tipe field yang tersimpan
    if type_code == TypeCode::ANY {
        return Err(MessageError::bad_data("field stored with wildcard type"));
    }

    let end = offset
        .checked_add(name_length)
        .and_then(|start| start.checked_add(data_size))
        .filter(|&end| end <= data.len())
        .ok_or_else(|| MessageError::bad_data("field data past end of data region"))?;

    let name = &data[offset..offset + name_length];
    if name[name_length - 1] != 0 || name[..name_length - 1].contains(&0) {
        return Err(MessageError::bad_data("name is not NUL-terminated"));
    }
    if std::str::from_utf8(&name[..name_length - 1]).is_err() {
        return Err(MessageError::bad_data("name is not valid UTF-8"));
    }

    let layout = ItemLayout::from_fixed(flags & FIELD_FLAG_FIXED_SIZE != 0);
    let items = &data[offset + name_length..end];
    match layout {
        ItemLayout::Fixed => {
            if data_size == 0 || data_size % count != 0 {
                return Err(MessageError::bad_data(format!(
                    "fixed data size {} not divisible by count {}",
                    data_size, count
                )));
            }
        }
        ItemLayout::Variable => check_variable_frames(items, count, swapped)?,
    }

    Ok(FieldHeader {
        name_length,
        type_code,
        layout,
        count,
        data_size,
        offset,
        next_field: None,
    })
}

/// Frame variable items harus tepat menutupi data field
fn check_variable_frames(items: &[u8], count: usize, swapped: bool) -> Result<()> {
    let mut reader = ByteReader::new(items, swapped);
    for item in 0..count {
        let start = reader.position();
        let len = reader.u32()? as usize;
        if len == 0 {
            return Err(MessageError::bad_data(format!("item {} has zero length", item)));
        }
        reader.seek(start)?;
        reader.skip(framed_size(len))?;
    }
    if reader.remaining() != 0 {
        return Err(MessageError::bad_data(format!(
            "{} trailing bytes after {} items",
            reader.remaining(),
            count
        )));
    }
    Ok(())
}

/// Byte-swap length prefix dan item fixed-width dari input big-endian
fn swap_field_data(arena: &mut DataArena, fields: &[FieldHeader]) {
    for field in fields {
        let width = field.type_code.swap_width();
        match field.layout {
            ItemLayout::Fixed => {
                if let Some(width) = width.filter(|w| field.item_size().is_some_and(|s| s % w == 0)) {
                    swap_items(arena.slice_mut(field.data_offset(), field.data_size), width);
                }
            }
            ItemLayout::Variable => {
                let mut record = field.data_offset();
                for _ in 0..field.count {
                    let prefix = arena.slice_mut(record, ITEM_LENGTH_PREFIX);
                    prefix.reverse();
                    let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
                    if let Some(width) = width.filter(|w| len % w == 0) {
                        swap_items(arena.slice_mut(record + ITEM_LENGTH_PREFIX, len), width);
                    }
                    record += framed_size(len);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MessageStore {
        let mut msg = MessageStore::new(u32::from_be_bytes(*b"TEST"));
        msg.add_value("count", 3i32).unwrap();
        msg.add_value("count", 4i32).unwrap();
        msg.add_string("label", "hello").unwrap();
        msg
    }

    fn flatten(msg: &MessageStore) -> Vec<u8> {
        let mut out = vec![0u8; flattened_size(msg)];
        flatten_to_slice(msg, &mut out).unwrap();
        out
    }

    #[test]
    fn test_magic_bytes_on_disk() {
        let bytes = flatten(&MessageStore::new(0));
        assert_eq!(&bytes[..4], b"MSG4");
        assert_eq!(bytes.len(), MIN_HEADER_SIZE + 8);
    }

    #[test]
    fn test_roundtrip_preserves_fields() {
        let msg = sample();
        let bytes = flatten(&msg);
        let back = unflatten(&bytes, false, &StoreConfig::default()).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.find_string("label", 0).unwrap(), "hello");
    }

    #[test]
    fn test_header_sections_change_size() {
        let mut msg = sample();
        let base = flattened_size(&msg);

        msg.set_target(Some(9), false);
        assert_eq!(flattened_size(&msg), base + TARGET_SECTION_SIZE);

        msg.set_reply_to(Some(ReplyAddress::new(1, 2, 3)));
        msg.set_reply_required(true);
        assert_eq!(flattened_size(&msg), base + TARGET_SECTION_SIZE + REPLY_SECTION_SIZE);

        let bytes = flatten(&msg);
        let back = unflatten(&bytes, false, &StoreConfig::default()).unwrap();
        assert_eq!(back.target(), Some(9));
        assert_eq!(back.reply_to(), Some(ReplyAddress::new(1, 2, 3)));
        assert!(back.was_delivered());
        assert!(back.is_source_waiting());
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut bytes = flatten(&sample());
        bytes[12] ^= 0xFF; // what
        let result = unflatten(&bytes, false, &StoreConfig::default());
        assert!(matches!(result, Err(MessageError::BadData(_))));
    }

    #[test]
    fn test_declared_size_too_large() {
        let bytes = flatten(&sample());
        let result = unflatten(&bytes[..bytes.len() - 1], false, &StoreConfig::default());
        assert!(matches!(result, Err(MessageError::BadData(_))));
    }

    #[test]
    fn test_broken_offset_rejected() {
        let msg = sample();
        let mut bytes = flatten(&msg);
        // offset descriptor kedua (field "label")
        let at = header_size(&msg) + FIELD_DESCRIPTOR_SIZE + 16;
        bytes[at] = bytes[at].wrapping_add(8);
        let result = unflatten(&bytes, false, &StoreConfig::default());
        assert!(matches!(result, Err(MessageError::BadData(_))));
    }

    #[test]
    fn test_small_output_buffer() {
        let msg = sample();
        let mut out = vec![0u8; flattened_size(&msg) - 1];
        assert!(matches!(
            flatten_to_slice(&msg, &mut out),
            Err(MessageError::BadValue(_))
        ));
    }
}
