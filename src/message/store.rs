//! MessageStore: public value API di atas FieldTable + DataArena
//!
//! State machine per field:
//! absent ─(add)─► present(count=1) ─(add/remove)─► present(k≥1)
//!        ◄────────────(remove item terakhir)─────────┘
//!
//! Semua slice yang dikembalikan meminjam `&self` (atau `&mut self`
//! untuk buffer add), jadi borrow checker menjamin slice tidak hidup
//! melewati mutasi berikutnya yang bisa me-relocate arena.

use std::fmt;

use super::header::{DeliveryFlags, MessageHeader, ReplyAddress};
use super::types::{FlatValue, Flattenable, TypeCode};
use crate::config::StoreConfig;
use crate::core::{FieldTable, ItemLayout, Items};
use crate::error::{MessageError, Result};

/// Info satu field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    pub type_code: TypeCode,
    pub count: usize,
    pub fixed_size: bool,
}

/// Tagged view atas data satu field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldData<'a> {
    Fixed { item_size: usize, bytes: &'a [u8] },
    Variable(Vec<&'a [u8]>),
}

/// Borrowed handle ke satu field
#[derive(Clone, Copy)]
pub struct FieldRef<'a> {
    table: &'a FieldTable,
    index: usize,
}

impl<'a> FieldRef<'a> {
    pub fn name(&self) -> &'a str {
        self.table.name(self.index)
    }

    pub fn type_code(&self) -> TypeCode {
        self.table.header(self.index).type_code
    }

    pub fn count(&self) -> usize {
        self.table.header(self.index).count
    }

    pub fn is_fixed_size(&self) -> bool {
        self.table.header(self.index).layout.is_fixed()
    }

    pub fn info(&self) -> FieldInfo {
        FieldInfo {
            type_code: self.type_code(),
            count: self.count(),
            fixed_size: self.is_fixed_size(),
        }
    }

    pub fn item(&self, index: usize) -> Result<&'a [u8]> {
        self.table.item(self.index, index)
    }

    pub fn items(&self) -> Items<'a> {
        self.table.items(self.index)
    }

    pub fn data(&self) -> FieldData<'a> {
        let header = self.table.header(self.index);
        match header.layout {
            ItemLayout::Fixed => FieldData::Fixed {
                item_size: header.item_size().unwrap_or(0),
                bytes: self.table.data(self.index),
            },
            ItemLayout::Variable => FieldData::Variable(self.items().collect()),
        }
    }
}

impl fmt::Debug for FieldRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRef")
            .field("name", &self.name())
            .field("type_code", &self.type_code())
            .field("count", &self.count())
            .field("fixed_size", &self.is_fixed_size())
            .finish()
    }
}

/// Iterator field dalam urutan insert
pub struct Fields<'a> {
    table: &'a FieldTable,
    next: usize,
}

impl<'a> Iterator for Fields<'a> {
    type Item = FieldRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.table.len() {
            return None;
        }
        let field = FieldRef {
            table: self.table,
            index: self.next,
        };
        self.next += 1;
        Some(field)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.table.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Fields<'_> {}

/// Named, typed field store (the in-memory message)
#[derive(Clone)]
pub struct MessageStore {
    /// Command code
    pub what: u32,
    header: MessageHeader,
    fields: FieldTable,
    config: StoreConfig,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(0)
    }
}

impl MessageStore {
    /// Membuat store kosong dengan config default
    pub fn new(what: u32) -> Self {
        let config = StoreConfig::default();
        Self {
            what,
            header: MessageHeader::default(),
            fields: FieldTable::new(&config),
            config,
        }
    }

    pub fn with_config(what: u32, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            what,
            header: MessageHeader::default(),
            fields: FieldTable::new(&config),
            config,
        })
    }

    pub(crate) fn from_parts(
        what: u32,
        header: MessageHeader,
        fields: FieldTable,
        config: StoreConfig,
    ) -> Self {
        Self {
            what,
            header,
            fields,
            config,
        }
    }

    #[inline(always)]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[inline(always)]
    pub(crate) fn table(&self) -> &FieldTable {
        &self.fields
    }

    #[inline(always)]
    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub(crate) fn set_header(&mut self, header: MessageHeader) {
        self.header = header;
    }

    // ── header / delivery state ─────────────────────────────────────

    pub fn target(&self) -> Option<i32> {
        self.header.target
    }

    /// Set target token; `None` menghapus target section dari wire
    pub fn set_target(&mut self, token: Option<i32>, preferred: bool) {
        self.header.target = token;
        self.header.delivery.preferred = preferred;
    }

    pub fn reply_to(&self) -> Option<ReplyAddress> {
        self.header.reply_to
    }

    pub fn set_reply_to(&mut self, address: Option<ReplyAddress>) {
        self.header.reply_to = address;
    }

    pub fn delivery(&self) -> DeliveryFlags {
        self.header.delivery
    }

    /// Dipakai oleh transport saat mengirim / menerima
    pub fn set_delivery(&mut self, flags: DeliveryFlags) {
        self.header.delivery = flags;
    }

    pub fn mark_delivered(&mut self) {
        self.header.delivery.was_delivered = true;
    }

    pub fn set_reply_required(&mut self, required: bool) {
        self.header.delivery.reply_required = required;
    }

    pub fn set_reply_done(&mut self, done: bool) {
        self.header.delivery.reply_done = done;
    }

    pub fn set_is_reply(&mut self, is_reply: bool) {
        self.header.delivery.is_reply = is_reply;
    }

    pub fn is_reply(&self) -> bool {
        self.header.delivery.is_reply
    }

    pub fn was_delivered(&self) -> bool {
        self.header.delivery.was_delivered
    }

    /// Sender menunggu reply yang belum dikirim
    pub fn is_source_waiting(&self) -> bool {
        let delivery = self.header.delivery;
        delivery.was_delivered && delivery.reply_required && !delivery.reply_done
    }

    /// System message: what code berbentuk `_XYZ`
    pub fn is_system(&self) -> bool {
        let [a, b, c, d] = self.what.to_be_bytes();
        a == b'_' && b.is_ascii_uppercase() && c.is_ascii_uppercase() && d.is_ascii_uppercase()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    // ── field operations ────────────────────────────────────────────

    /// Tambah satu item ke field `name` (dibuat kalau belum ada)
    ///
    /// Field fixed-size yang sudah ada menolak item dengan panjang berbeda
    /// (`BadValue`) tanpa mengubah apa pun.
    pub fn add_data(
        &mut self,
        name: &str,
        type_code: TypeCode,
        bytes: &[u8],
        fixed_size: bool,
    ) -> Result<()> {
        let buffer = self.add_data_buffer(name, type_code, bytes.len(), fixed_size)?;
        buffer.copy_from_slice(bytes);
        Ok(())
    }

    /// Seperti `add_data`, tapi mengembalikan buffer (zeroed) untuk diisi
    /// caller langsung di arena.
    ///
    /// Buffer meminjam store secara mutable, jadi harus selesai ditulis
    /// sebelum operasi lain dipanggil.
    pub fn add_data_buffer(
        &mut self,
        name: &str,
        type_code: TypeCode,
        len: usize,
        fixed_size: bool,
    ) -> Result<&mut [u8]> {
        if len == 0 {
            return Err(MessageError::BadValue("item length must be positive"));
        }

        let layout = ItemLayout::from_fixed(fixed_size);
        let (index, created) = self.fields.add(name, type_code, layout)?;
        match self.fields.append_item(index, len) {
            Ok(offset) => Ok(self.fields.payload_mut(offset, len)),
            Err(err) => {
                if created {
                    // Field kosong tidak boleh tertinggal
                    let removed = self.fields.remove(index);
                    debug_assert!(removed.is_ok(), "rollback of empty field failed");
                }
                Err(err)
            }
        }
    }

    /// Tambah item lalu isi lewat `fill`; kalau `fill` gagal, item
    /// (dan field yang baru dibuat) di-rollback
    fn add_with<F>(
        &mut self,
        name: &str,
        type_code: TypeCode,
        len: usize,
        fixed_size: bool,
        fill: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut [u8]) -> Result<()>,
    {
        let buffer = self.add_data_buffer(name, type_code, len, fixed_size)?;
        if let Err(err) = fill(buffer) {
            let field = self.fields.find(name, type_code)?;
            let last = self.fields.header(field).count - 1;
            self.fields.remove_item(field, last)?;
            return Err(err);
        }
        Ok(())
    }

    /// Ganti item ke-`index`
    pub fn replace_data(
        &mut self,
        name: &str,
        type_code: TypeCode,
        index: usize,
        bytes: &[u8],
    ) -> Result<()> {
        let buffer = self.replace_data_buffer(name, type_code, index, bytes.len())?;
        buffer.copy_from_slice(bytes);
        Ok(())
    }

    /// Resize item ke-`index` dan kembalikan buffernya untuk ditulis ulang
    pub fn replace_data_buffer(
        &mut self,
        name: &str,
        type_code: TypeCode,
        index: usize,
        len: usize,
    ) -> Result<&mut [u8]> {
        let field = self.fields.find(name, type_code)?;
        if index >= self.fields.header(field).count {
            return Err(MessageError::BadIndex);
        }
        let offset = self.fields.resize_item(field, index, len)?;
        Ok(self.fields.payload_mut(offset, len))
    }

    /// Bytes item ke-`index`; valid sampai mutasi berikutnya
    pub fn find_data(&self, name: &str, type_code: TypeCode, index: usize) -> Result<&[u8]> {
        let field = self.fields.find(name, type_code)?;
        self.fields.item(field, index)
    }

    /// Semua item satu field
    pub fn items(&self, name: &str, type_code: TypeCode) -> Result<Items<'_>> {
        let field = self.fields.find(name, type_code)?;
        Ok(self.fields.items(field))
    }

    pub fn has_data(&self, name: &str, type_code: TypeCode, index: usize) -> bool {
        match self.fields.find(name, type_code) {
            Ok(field) => index < self.fields.header(field).count,
            Err(_) => false,
        }
    }

    /// Hapus satu item; item terakhir ikut menghapus field
    pub fn remove_data(&mut self, name: &str, index: usize) -> Result<()> {
        let field = self.fields.find(name, TypeCode::ANY)?;
        self.fields.remove_item(field, index)?;
        Ok(())
    }

    /// Hapus seluruh field
    pub fn remove_name(&mut self, name: &str) -> Result<()> {
        let field = self.fields.find(name, TypeCode::ANY)?;
        self.fields.remove(field)
    }

    pub fn rename(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        self.fields.rename(old_name, new_name)
    }

    /// Hapus semua field dan data; `what` dan header tetap
    pub fn make_empty(&mut self) {
        self.fields.clear();
    }

    /// Jumlah field dengan type tertentu (`ANY` = semua)
    pub fn count_names(&self, type_code: TypeCode) -> usize {
        if type_code == TypeCode::ANY {
            return self.fields.len();
        }
        self.fields
            .headers()
            .iter()
            .filter(|field| field.type_code == type_code)
            .count()
    }

    pub fn get_info(&self, name: &str) -> Result<FieldInfo> {
        let field = self.fields.find(name, TypeCode::ANY)?;
        Ok(FieldRef {
            table: &self.fields,
            index: field,
        }
        .info())
    }

    /// Field ke-`index` dengan type `type_code`, urut insert
    ///
    /// `TypeMismatch` kalau tidak ada field dengan type itu sama sekali,
    /// `BadIndex` kalau jumlahnya kurang.
    pub fn get_info_at(&self, type_code: TypeCode, index: usize) -> Result<(&str, FieldInfo)> {
        let mut matching = self
            .fields()
            .filter(|field| type_code == TypeCode::ANY || field.type_code() == type_code)
            .peekable();

        if matching.peek().is_none() {
            return Err(if type_code == TypeCode::ANY {
                MessageError::BadIndex
            } else {
                MessageError::TypeMismatch
            });
        }

        matching
            .nth(index)
            .map(|field| (field.name(), field.info()))
            .ok_or(MessageError::BadIndex)
    }

    /// Field dalam urutan insert
    pub fn fields(&self) -> Fields<'_> {
        Fields {
            table: &self.fields,
            next: 0,
        }
    }

    pub fn field(&self, name: &str) -> Result<FieldRef<'_>> {
        let index = self.fields.find(name, TypeCode::ANY)?;
        Ok(FieldRef {
            table: &self.fields,
            index,
        })
    }

    // ── typed helpers ───────────────────────────────────────────────

    pub fn add_value<T: FlatValue>(&mut self, name: &str, value: T) -> Result<()> {
        let buffer = self.add_data_buffer(name, T::TYPE_CODE, T::SIZE, true)?;
        value.write_le(buffer);
        Ok(())
    }

    pub fn find_value<T: FlatValue>(&self, name: &str, index: usize) -> Result<T> {
        let bytes = self.find_data(name, T::TYPE_CODE, index)?;
        if bytes.len() != T::SIZE {
            return Err(MessageError::bad_data("item size does not match value type"));
        }
        Ok(T::read_le(bytes))
    }

    pub fn replace_value<T: FlatValue>(&mut self, name: &str, index: usize, value: T) -> Result<()> {
        let buffer = self.replace_data_buffer(name, T::TYPE_CODE, index, T::SIZE)?;
        value.write_le(buffer);
        Ok(())
    }

    /// String disimpan dengan NUL terminator
    pub fn add_string(&mut self, name: &str, value: &str) -> Result<()> {
        let buffer = self.add_data_buffer(name, TypeCode::STRING, value.len() + 1, false)?;
        buffer[..value.len()].copy_from_slice(value.as_bytes());
        Ok(())
    }

    pub fn find_string(&self, name: &str, index: usize) -> Result<&str> {
        let bytes = self.find_data(name, TypeCode::STRING, index)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        std::str::from_utf8(&bytes[..end])
            .map_err(|_| MessageError::bad_data("string item is not valid UTF-8"))
    }

    pub fn replace_string(&mut self, name: &str, index: usize, value: &str) -> Result<()> {
        let buffer =
            self.replace_data_buffer(name, TypeCode::STRING, index, value.len() + 1)?;
        buffer[..value.len()].copy_from_slice(value.as_bytes());
        buffer[value.len()] = 0;
        Ok(())
    }

    /// Nested message, disimpan dalam native flattened form
    pub fn add_message(&mut self, name: &str, message: &MessageStore) -> Result<()> {
        let size = message.flattened_size();
        self.add_with(name, TypeCode::MESSAGE, size, false, |buffer| {
            message.flatten_to_slice(buffer)
        })
    }

    pub fn find_message(&self, name: &str, index: usize) -> Result<MessageStore> {
        let bytes = self.find_data(name, TypeCode::MESSAGE, index)?;
        MessageStore::unflatten(bytes)
    }

    pub fn replace_message(
        &mut self,
        name: &str,
        index: usize,
        message: &MessageStore,
    ) -> Result<()> {
        let bytes = message.flatten()?;
        self.replace_data(name, TypeCode::MESSAGE, index, &bytes)
    }

    // ── flattenable objects ─────────────────────────────────────────

    pub fn add_flat<T: Flattenable + ?Sized>(&mut self, name: &str, object: &T) -> Result<()> {
        let size = object.flattened_size();
        self.add_with(name, object.type_code(), size, object.is_fixed_size(), |buffer| {
            object.flatten_into(buffer)
        })
    }

    /// Isi `object` dari item ke-`index`; type code diambil dari `object`
    pub fn find_flat<T: Flattenable + ?Sized>(
        &self,
        name: &str,
        index: usize,
        object: &mut T,
    ) -> Result<()> {
        let bytes = self.find_data(name, object.type_code(), index)?;
        object.unflatten(bytes)
    }

    /// Flatten dulu ke buffer sementara, item lama utuh kalau gagal
    pub fn replace_flat<T: Flattenable + ?Sized>(
        &mut self,
        name: &str,
        index: usize,
        object: &T,
    ) -> Result<()> {
        let mut bytes = vec![0u8; object.flattened_size()];
        object.flatten_into(&mut bytes)?;
        self.replace_data(name, object.type_code(), index, &bytes)
    }

    pub fn has_flat<T: Flattenable + ?Sized>(&self, name: &str, index: usize, object: &T) -> bool {
        self.has_data(name, object.type_code(), index)
    }
}

impl PartialEq for MessageStore {
    /// Sama kalau `what`, urutan field, type, layout, count dan bytes sama
    fn eq(&self, other: &Self) -> bool {
        if self.what != other.what || self.fields.len() != other.fields.len() {
            return false;
        }
        let same_fields = self
            .fields
            .headers()
            .iter()
            .zip(other.fields.headers())
            .all(|(a, b)| {
                a.name_length == b.name_length
                    && a.type_code == b.type_code
                    && a.layout == b.layout
                    && a.count == b.count
                    && a.data_size == b.data_size
            });
        same_fields && self.fields.arena().as_bytes() == other.fields.arena().as_bytes()
    }
}

impl fmt::Debug for MessageStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageStore")
            .field("what", &TypeCode(self.what))
            .field("header", &self.header)
            .field("fields", &self.fields().collect::<Vec<_>>())
            .finish()
    }
}
