//! Field Table: descriptors + hash-chained name index di atas DataArena
//!
//! Layout:
//! ┌────────────────────────────────────────────────────────┐
//! │ buckets[h] ──► field i ──next──► field j ──next──► ∅   │
//! ├────────────────────────────────────────────────────────┤
//! │ fields: [FieldHeader; n]   (urutan = urutan insert)     │
//! ├────────────────────────────────────────────────────────┤
//! │ arena:  name0\0 data0 | name1\0 data1 | ...            │
//! └────────────────────────────────────────────────────────┘
//!
//! Semua link memakai index, bukan pointer, jadi relocate arena tidak
//! pernah meng-invalidasi apa pun. Urutan field di arena selalu sama
//! dengan urutan descriptor, tanpa gap.
//!
//! Item framing:
//! - Fixed: item di-pack rapat, `item_size = data_size / count`
//! - Variable: `[len u32][payload][pad ke 8 byte]` per item

use super::arena::DataArena;
use crate::config::StoreConfig;
use crate::error::{MessageError, Result};
use crate::message::TypeCode;

pub const FIELD_FLAG_VALID: u16 = 0x0001;
pub const FIELD_FLAG_FIXED_SIZE: u16 = 0x0002;

/// Panjang nama maksimum (tanpa NUL terminator)
pub const MAX_NAME_LENGTH: usize = 255;
/// Length prefix untuk variable-size item
pub const ITEM_LENGTH_PREFIX: usize = 4;
/// Alignment record variable-size item
pub const ITEM_ALIGNMENT: usize = 8;
/// Semua offset harus muat di u32 di wire format
pub const MAX_DATA_SIZE: usize = u32::MAX as usize;

/// Panjang record variable item setelah padding
#[inline(always)]
pub fn framed_size(payload_len: usize) -> usize {
    (ITEM_LENGTH_PREFIX + payload_len + ITEM_ALIGNMENT - 1) & !(ITEM_ALIGNMENT - 1)
}

#[inline(always)]
pub(crate) fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

/// Cara item disimpan dalam satu field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemLayout {
    /// Semua item punya panjang sama, di-pack tanpa prefix
    Fixed,
    /// Setiap item punya length prefix dan padding
    Variable,
}

impl ItemLayout {
    #[inline(always)]
    pub fn from_fixed(fixed_size: bool) -> Self {
        if fixed_size {
            Self::Fixed
        } else {
            Self::Variable
        }
    }

    #[inline(always)]
    pub fn is_fixed(self) -> bool {
        self == Self::Fixed
    }
}

/// Descriptor satu field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldHeader {
    /// Panjang nama termasuk NUL terminator
    pub name_length: usize,
    pub type_code: TypeCode,
    pub layout: ItemLayout,
    pub count: usize,
    /// Total bytes data (termasuk framing untuk variable items)
    pub data_size: usize,
    /// Offset nama di arena; data dimulai tepat setelah nama
    pub offset: usize,
    /// Successor di hash chain
    pub(crate) next_field: Option<usize>,
}

impl FieldHeader {
    /// Wire flags (valid + fixed-size)
    #[inline(always)]
    pub fn flags(&self) -> u16 {
        let mut flags = FIELD_FLAG_VALID;
        if self.layout.is_fixed() {
            flags |= FIELD_FLAG_FIXED_SIZE;
        }
        flags
    }

    #[inline(always)]
    pub fn data_offset(&self) -> usize {
        self.offset + self.name_length
    }

    #[inline(always)]
    pub fn end_offset(&self) -> usize {
        self.data_offset() + self.data_size
    }

    /// Ukuran per item untuk fixed field (None untuk variable / kosong)
    #[inline(always)]
    pub fn item_size(&self) -> Option<usize> {
        match self.layout {
            ItemLayout::Fixed if self.count > 0 => Some(self.data_size / self.count),
            _ => None,
        }
    }
}

/// Rotate/xor fold atas bytes nama
#[inline]
pub fn hash_name(name: &[u8]) -> u32 {
    let mut result: u32 = 0;
    for &byte in name {
        result = (result << 7) ^ (result >> 24);
        result ^= byte as u32;
    }
    result ^= result << 12;
    result
}

/// Validasi nama field
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MessageError::BadValue("empty field name"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(MessageError::BadValue("field name longer than 255 bytes"));
    }
    if name.as_bytes().contains(&0) {
        return Err(MessageError::BadValue("field name contains NUL"));
    }
    Ok(())
}

/// Named-field index di atas satu DataArena
#[derive(Debug, Clone)]
pub struct FieldTable {
    fields: Vec<FieldHeader>,
    buckets: Vec<Option<usize>>,
    arena: DataArena,
    max_field_prealloc: usize,
}

impl FieldTable {
    /// Membuat table kosong
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            fields: Vec::new(),
            buckets: vec![None; config.hash_table_size.max(1)],
            arena: DataArena::new(config.max_data_prealloc),
            max_field_prealloc: config.max_field_prealloc,
        }
    }

    /// Rakit table dari descriptor + arena yang sudah divalidasi,
    /// lalu bangun ulang hash chains.
    pub(crate) fn from_parts(
        fields: Vec<FieldHeader>,
        arena: DataArena,
        config: &StoreConfig,
    ) -> Self {
        let mut table = Self {
            fields,
            buckets: vec![None; config.hash_table_size.max(1)],
            arena,
            max_field_prealloc: config.max_field_prealloc,
        };
        for index in 0..table.fields.len() {
            table.fields[index].next_field = None;
            table.thread(index);
        }
        table
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[inline(always)]
    pub fn headers(&self) -> &[FieldHeader] {
        &self.fields
    }

    #[inline(always)]
    pub fn header(&self, index: usize) -> &FieldHeader {
        &self.fields[index]
    }

    #[inline(always)]
    pub fn arena(&self) -> &DataArena {
        &self.arena
    }

    /// Nama field tanpa NUL terminator
    pub fn name(&self, index: usize) -> &str {
        std::str::from_utf8(self.name_bytes(index)).unwrap_or_default()
    }

    fn name_bytes(&self, index: usize) -> &[u8] {
        let field = &self.fields[index];
        self.arena.slice(field.offset, field.name_length - 1)
    }

    /// Seluruh data region satu field
    pub fn data(&self, index: usize) -> &[u8] {
        let field = &self.fields[index];
        self.arena.slice(field.data_offset(), field.data_size)
    }

    #[inline(always)]
    fn bucket_of(&self, name: &[u8]) -> usize {
        hash_name(name) as usize % self.buckets.len()
    }

    /// Cari field berdasarkan nama; `TypeCode::ANY` cocok dengan semua type
    pub fn find(&self, name: &str, type_code: TypeCode) -> Result<usize> {
        validate_name(name)?;

        let mut next = self.buckets[self.bucket_of(name.as_bytes())];
        while let Some(index) = next {
            if self.name_bytes(index) == name.as_bytes() {
                let field = &self.fields[index];
                if type_code != TypeCode::ANY && field.type_code != type_code {
                    return Err(MessageError::TypeMismatch);
                }
                return Ok(index);
            }
            next = self.fields[index].next_field;
        }

        Err(MessageError::NameNotFound)
    }

    /// Return field yang sudah ada (type harus cocok) atau buat field baru
    ///
    /// Returns `(index, created)`.
    pub fn add(
        &mut self,
        name: &str,
        type_code: TypeCode,
        layout: ItemLayout,
    ) -> Result<(usize, bool)> {
        if type_code == TypeCode::ANY {
            return Err(MessageError::BadValue("cannot add data of type ANY"));
        }

        match self.find(name, type_code) {
            Ok(index) => return Ok((index, false)),
            Err(MessageError::NameNotFound) => {}
            Err(err) => return Err(err),
        }

        self.reserve_descriptor()?;

        let offset = self.arena.len();
        let name_length = name.len() + 1;
        self.resize_data(offset, name_length as isize)?;
        self.arena.write_at(offset, name.as_bytes());
        // byte terakhir sudah 0 dari resize

        let index = self.fields.len();
        self.fields.push(FieldHeader {
            name_length,
            type_code,
            layout,
            count: 0,
            data_size: 0,
            offset,
            next_field: None,
        });
        self.thread(index);
        Ok((index, true))
    }

    /// Hapus field: unthread, renumber semua link, hapus bytes di arena
    pub fn remove(&mut self, index: usize) -> Result<()> {
        if index >= self.fields.len() {
            return Err(MessageError::BadIndex);
        }

        let successor = self.fields[index]
            .next_field
            .map(|next| if next > index { next - 1 } else { next });

        let renumber = |link: &mut Option<usize>| match *link {
            Some(value) if value > index => *link = Some(value - 1),
            Some(value) if value == index => *link = successor,
            _ => {}
        };

        for bucket in self.buckets.iter_mut() {
            renumber(bucket);
        }
        for (other, field) in self.fields.iter_mut().enumerate() {
            if other != index {
                renumber(&mut field.next_field);
            }
        }

        let removed = self.fields.remove(index);
        let size = removed.name_length + removed.data_size;
        self.resize_data(removed.offset, -(size as isize))?;
        self.shrink_descriptors();
        Ok(())
    }

    /// Ganti nama field; field pindah ke bucket nama baru
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        validate_name(new_name)?;
        let index = self.find(old_name, TypeCode::ANY)?;
        if old_name == new_name {
            return Ok(());
        }
        match self.find(new_name, TypeCode::ANY) {
            Err(MessageError::NameNotFound) => {}
            Ok(_) => return Err(MessageError::BadValue("target name already in use")),
            Err(err) => return Err(err),
        }

        let old_bucket = self.bucket_of(old_name.as_bytes());
        let old_length = self.fields[index].name_length;
        let new_length = new_name.len() + 1;
        let offset = self.fields[index].offset;

        // Resize dulu supaya kegagalan alokasi tidak merusak hash chain
        if new_length > old_length {
            self.resize_data(offset + old_length, (new_length - old_length) as isize)?;
        } else if new_length < old_length {
            self.resize_data(offset + new_length, -((old_length - new_length) as isize))?;
        }

        self.unthread(old_bucket, index);
        self.fields[index].name_length = new_length;
        self.arena.write_at(offset, new_name.as_bytes());
        self.arena.write_at(offset + new_length - 1, &[0]);
        self.thread(index);
        Ok(())
    }

    /// Kosongkan semua field dan data
    pub fn clear(&mut self) {
        self.fields = Vec::new();
        self.buckets.iter_mut().for_each(|bucket| *bucket = None);
        self.arena.clear();
    }

    /// Resize arena + fix offset semua field yang terdampak, satu transaksi
    ///
    /// Untuk delta negatif, tidak boleh ada field yang mulai di dalam
    /// region yang dihapus (field yang dihapus harus sudah dilepas).
    pub(crate) fn resize_data(&mut self, offset: usize, delta: isize) -> Result<()> {
        if delta > 0 && self.arena.len() + delta as usize > MAX_DATA_SIZE {
            return Err(MessageError::OutOfMemory);
        }

        let old_len = self.arena.len();
        self.arena.resize(offset, delta)?;

        if delta > 0 {
            if offset < old_len {
                let change = delta as usize;
                for field in self.fields.iter_mut() {
                    if field.offset >= offset {
                        field.offset += change;
                    }
                }
            }
        } else if delta < 0 {
            let change = delta.unsigned_abs();
            for field in self.fields.iter_mut() {
                debug_assert!(field.offset < offset || field.offset >= offset + change);
                if field.offset >= offset + change {
                    field.offset -= change;
                }
            }
        }
        Ok(())
    }

    /// Append index di ujung chain bucket-nya
    fn thread(&mut self, index: usize) {
        let bucket = self.bucket_of(self.name_bytes(index));
        match self.buckets[bucket] {
            None => self.buckets[bucket] = Some(index),
            Some(mut current) => {
                while let Some(next) = self.fields[current].next_field {
                    current = next;
                }
                self.fields[current].next_field = Some(index);
            }
        }
        self.fields[index].next_field = None;
    }

    /// Lepas index dari chain (patch bucket head atau predecessor)
    fn unthread(&mut self, bucket: usize, index: usize) {
        let successor = self.fields[index].next_field;

        if self.buckets[bucket] == Some(index) {
            self.buckets[bucket] = successor;
        } else {
            let mut current = self.buckets[bucket];
            while let Some(at) = current {
                if self.fields[at].next_field == Some(index) {
                    self.fields[at].next_field = successor;
                    break;
                }
                current = self.fields[at].next_field;
            }
        }
        self.fields[index].next_field = None;
    }

    fn reserve_descriptor(&mut self) -> Result<()> {
        let len = self.fields.len();
        if len < self.fields.capacity() {
            return Ok(());
        }
        let wanted = (len * 2 + 1).min(len + self.max_field_prealloc.max(1));
        self.fields
            .try_reserve_exact(wanted - len)
            .map_err(|_| MessageError::OutOfMemory)
    }

    fn shrink_descriptors(&mut self) {
        let len = self.fields.len();
        if self.fields.capacity() - len > self.max_field_prealloc {
            self.fields.shrink_to(len + self.max_field_prealloc / 2);
        }
    }
}

/// Item-level operations. Semua offset item dihitung di sini saja.
impl FieldTable {
    /// Offset payload + panjang item ke-`item`
    pub fn item_range(&self, index: usize, item: usize) -> Result<(usize, usize)> {
        let field = &self.fields[index];
        if item >= field.count {
            return Err(MessageError::BadIndex);
        }

        match field.layout {
            ItemLayout::Fixed => {
                let size = field.data_size / field.count;
                Ok((field.data_offset() + item * size, size))
            }
            ItemLayout::Variable => {
                let (record, len) = self.record_at(index, item);
                Ok((record + ITEM_LENGTH_PREFIX, len))
            }
        }
    }

    /// Slice item ke-`item`
    pub fn item(&self, index: usize, item: usize) -> Result<&[u8]> {
        let (offset, len) = self.item_range(index, item)?;
        Ok(self.arena.slice(offset, len))
    }

    /// Walk record variable item; returns (record offset, payload len)
    fn record_at(&self, index: usize, item: usize) -> (usize, usize) {
        let bytes = self.arena.as_bytes();
        let mut record = self.fields[index].data_offset();
        for _ in 0..item {
            let len = read_u32_le(bytes, record) as usize;
            record += framed_size(len);
        }
        (record, read_u32_le(bytes, record) as usize)
    }

    /// Sisipkan item baru (zeroed) di akhir field; returns payload offset
    ///
    /// Fixed field menolak panjang yang berbeda dari item size yang sudah ada.
    pub fn append_item(&mut self, index: usize, len: usize) -> Result<usize> {
        if len == 0 {
            return Err(MessageError::BadValue("item length must be positive"));
        }
        if len > MAX_DATA_SIZE - ITEM_ALIGNMENT {
            return Err(MessageError::BadValue("item too large"));
        }

        let field = &self.fields[index];
        let end = field.end_offset();
        match field.layout {
            ItemLayout::Fixed => {
                if let Some(size) = field.item_size() {
                    if size != len {
                        return Err(MessageError::BadValue("item size differs from fixed size"));
                    }
                }
                self.resize_data(end, len as isize)?;
                let field = &mut self.fields[index];
                field.data_size += len;
                field.count += 1;
                Ok(end)
            }
            ItemLayout::Variable => {
                let record = framed_size(len);
                self.resize_data(end, record as isize)?;
                self.arena.write_at(end, &(len as u32).to_le_bytes());
                let field = &mut self.fields[index];
                field.data_size += record;
                field.count += 1;
                Ok(end + ITEM_LENGTH_PREFIX)
            }
        }
    }

    /// Resize item ke `len` bytes; returns payload offset
    ///
    /// Variable item yang berubah panjang menggeser semua item dan field
    /// sesudahnya.
    pub fn resize_item(&mut self, index: usize, item: usize, len: usize) -> Result<usize> {
        if len == 0 {
            return Err(MessageError::BadValue("item length must be positive"));
        }
        if len > MAX_DATA_SIZE - ITEM_ALIGNMENT {
            return Err(MessageError::BadValue("item too large"));
        }
        let field = &self.fields[index];
        if item >= field.count {
            return Err(MessageError::BadIndex);
        }

        match field.layout {
            ItemLayout::Fixed => {
                let size = field.data_size / field.count;
                if size != len {
                    return Err(MessageError::BadValue("item size differs from fixed size"));
                }
                Ok(field.data_offset() + item * size)
            }
            ItemLayout::Variable => {
                let (record, old_len) = self.record_at(index, item);
                let old_size = framed_size(old_len);
                let new_size = framed_size(len);

                if new_size > old_size {
                    self.resize_data(record + old_size, (new_size - old_size) as isize)?;
                } else if new_size < old_size {
                    self.resize_data(record + new_size, -((old_size - new_size) as isize))?;
                }

                self.arena.write_at(record, &(len as u32).to_le_bytes());
                // padding harus selalu nol
                let payload_end = record + ITEM_LENGTH_PREFIX + len;
                self.arena
                    .slice_mut(payload_end, record + new_size - payload_end)
                    .fill(0);

                let field = &mut self.fields[index];
                field.data_size = field.data_size + new_size - old_size;
                Ok(record + ITEM_LENGTH_PREFIX)
            }
        }
    }

    /// Hapus satu item; item terakhir menghapus seluruh field
    ///
    /// Returns `true` kalau field ikut terhapus.
    pub fn remove_item(&mut self, index: usize, item: usize) -> Result<bool> {
        let field = &self.fields[index];
        if item >= field.count {
            return Err(MessageError::BadIndex);
        }
        if field.count == 1 {
            self.remove(index)?;
            return Ok(true);
        }

        let (offset, size) = match field.layout {
            ItemLayout::Fixed => {
                let size = field.data_size / field.count;
                (field.data_offset() + item * size, size)
            }
            ItemLayout::Variable => {
                let (record, len) = self.record_at(index, item);
                (record, framed_size(len))
            }
        };

        self.resize_data(offset, -(size as isize))?;
        let field = &mut self.fields[index];
        field.data_size -= size;
        field.count -= 1;
        Ok(false)
    }

    /// Payload region yang bisa ditulis caller
    #[inline(always)]
    pub(crate) fn payload_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        self.arena.slice_mut(offset, len)
    }
}

/// Iterator atas item satu field, urut index
#[derive(Debug, Clone)]
pub struct Items<'a> {
    bytes: &'a [u8],
    layout: ItemLayout,
    item_size: usize,
    cursor: usize,
    remaining: usize,
}

impl FieldTable {
    pub fn items(&self, index: usize) -> Items<'_> {
        let field = &self.fields[index];
        Items {
            bytes: self.data(index),
            layout: field.layout,
            item_size: field.item_size().unwrap_or(0),
            cursor: 0,
            remaining: field.count,
        }
    }
}

impl<'a> Iterator for Items<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let start = self.cursor;
        match self.layout {
            ItemLayout::Fixed => {
                self.cursor += self.item_size;
                Some(&self.bytes[start..self.cursor])
            }
            ItemLayout::Variable => {
                let len = read_u32_le(self.bytes, start) as usize;
                self.cursor += framed_size(len);
                let payload = start + ITEM_LENGTH_PREFIX;
                Some(&self.bytes[payload..payload + len])
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Items<'_> {}
