//! KMessage format (`'kMsG'`), decode only
//!
//! Format kernel-side yang ringan, native byte order saja:
//! ┌──────────────────────────────────────────────────────────────┐
//! │ magic │ size │ what │ sender │ target │ reply_port │ reply_tok│  28 bytes
//! ├──────────────────────────────────────────────────────────────┤
//! │ type u32 │ element_size i32 │ element_count i32 │            │
//! │ field_size i32 │ header_size i16 │ name\0 │ pad ke 4         │  per field
//! │ elements: fixed = packed, variable = size i32 + data + pad 4 │
//! └──────────────────────────────────────────────────────────────┘
//!
//! Konversi ke MessageStore berjalan lewat trait `KMessageSource`
//! supaya sumber lain (mis. view in-memory) bisa dipakai juga.

use super::io::ByteReader;
use crate::config::StoreConfig;
use crate::error::{MessageError, Result};
use crate::message::{MessageStore, TypeCode};

pub const MAGIC_KMESSAGE: u32 = u32::from_be_bytes(*b"kMsG");
pub const KMESSAGE_HEADER_SIZE: usize = 28;
pub const KMESSAGE_ALIGNMENT: usize = 4;
/// element_size untuk field dengan element berukuran variabel
pub const VARIABLE_ELEMENT_SIZE: i32 = -1;
/// type + element_size + element_count + field_size + header_size + "\0"
const MIN_FIELD_HEADER_SIZE: usize = 19;
/// Batas rekursi nested KMessage
pub const MAX_NESTING_DEPTH: usize = 64;

#[inline(always)]
pub fn align4(value: usize) -> usize {
    (value + KMESSAGE_ALIGNMENT - 1) & !(KMESSAGE_ALIGNMENT - 1)
}

/// Satu field KMessage
pub trait KMessageField {
    fn name(&self) -> &str;
    fn type_code(&self) -> TypeCode;
    fn has_fixed_element_size(&self) -> bool;
    fn count_elements(&self) -> usize;
    fn element_at(&self, index: usize) -> Option<&[u8]>;
}

/// Sumber KMessage yang bisa dikonversi ke MessageStore
pub trait KMessageSource {
    type Field: KMessageField;

    fn what(&self) -> u32;
    fn fields(&self) -> &[Self::Field];
}

/// Field hasil parse; element meminjam buffer asal
#[derive(Debug, Clone)]
pub struct KMessageFieldView<'a> {
    name: &'a str,
    type_code: TypeCode,
    fixed: bool,
    elements: Vec<&'a [u8]>,
}

impl KMessageField for KMessageFieldView<'_> {
    fn name(&self) -> &str {
        self.name
    }

    fn type_code(&self) -> TypeCode {
        self.type_code
    }

    fn has_fixed_element_size(&self) -> bool {
        self.fixed
    }

    fn count_elements(&self) -> usize {
        self.elements.len()
    }

    fn element_at(&self, index: usize) -> Option<&[u8]> {
        self.elements.get(index).copied()
    }
}

/// KMessage yang sudah di-parse (zero-copy atas buffer asal)
#[derive(Debug, Clone)]
pub struct KMessage<'a> {
    pub what: u32,
    pub sender: i32,
    pub target_token: i32,
    pub reply_port: i32,
    pub reply_token: i32,
    fields: Vec<KMessageFieldView<'a>>,
}

impl<'a> KMessageSource for KMessage<'a> {
    type Field = KMessageFieldView<'a>;

    fn what(&self) -> u32 {
        self.what
    }

    fn fields(&self) -> &[Self::Field] {
        &self.fields
    }
}

impl<'a> KMessage<'a> {
    /// Parse header + field list dan validasi semua batas
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes, false);
        if reader.u32()? != MAGIC_KMESSAGE {
            return Err(MessageError::NotAMessage);
        }
        let size = reader.size_i32()?;
        if size > bytes.len() {
            return Err(MessageError::bad_data(format!(
                "declared size {} exceeds available {} bytes",
                size,
                bytes.len()
            )));
        }
        if size < KMESSAGE_HEADER_SIZE {
            return Err(MessageError::bad_data("declared size smaller than header"));
        }

        let mut message = Self {
            what: reader.u32()?,
            sender: reader.i32()?,
            target_token: reader.i32()?,
            reply_port: reader.i32()?,
            reply_token: reader.i32()?,
            fields: Vec::new(),
        };

        let mut reader = ByteReader::new(&bytes[..size], false);
        reader.seek(KMESSAGE_HEADER_SIZE)?;
        while reader.remaining() > 0 {
            let start = reader.position();
            let field = parse_field(&mut reader).map_err(|err| match err {
                MessageError::BadData(reason) => {
                    MessageError::BadData(format!("kmessage field at {}: {}", start, reason))
                }
                other => other,
            })?;
            message.fields.push(field);
        }
        Ok(message)
    }
}

fn parse_field<'a>(reader: &mut ByteReader<'a>) -> Result<KMessageFieldView<'a>> {
    let start = reader.position();
    let type_code = TypeCode(reader.u32()?);
    let element_size = reader.i32()?;
    let element_count = reader.size_i32()?;
    let field_size = reader.size_i32()?;
    let header_size = usize::try_from(reader.i16()?)
        .map_err(|_| MessageError::bad_data("negative header size"))?;

    if header_size < MIN_FIELD_HEADER_SIZE || field_size < header_size {
        return Err(MessageError::bad_data(format!(
            "header size {} / field size {} inconsistent",
            header_size, field_size
        )));
    }

    let name_bytes = reader.take(header_size - (MIN_FIELD_HEADER_SIZE - 1))?;
    let name_end = name_bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| MessageError::bad_data("name is not NUL-terminated"))?;
    let name = std::str::from_utf8(&name_bytes[..name_end])
        .map_err(|_| MessageError::bad_data("name is not valid UTF-8"))?;

    let mut elements_reader = ByteReader::new(reader.take(field_size - header_size)?, false);
    let mut elements = Vec::new();
    let fixed = match element_size {
        VARIABLE_ELEMENT_SIZE => {
            for _ in 0..element_count {
                let len = elements_reader.size_i32()?;
                elements.push(elements_reader.take(len)?);
                let pad = align4(len) - len;
                elements_reader.skip(pad.min(elements_reader.remaining()))?;
            }
            false
        }
        size if size > 0 => {
            let size = size as usize;
            let total = size
                .checked_mul(element_count)
                .ok_or_else(|| MessageError::bad_data("element size overflow"))?;
            elements.extend(elements_reader.take(total)?.chunks_exact(size));
            true
        }
        other => {
            return Err(MessageError::bad_data(format!("bad element size {}", other)));
        }
    };

    debug_assert_eq!(reader.position(), start + field_size);
    Ok(KMessageFieldView {
        name,
        type_code,
        fixed,
        elements,
    })
}

/// Declared total size: i32 tepat setelah magic
pub(crate) fn declared_size(prefix: &[u8], _swapped: bool) -> Result<usize> {
    let mut reader = ByteReader::new(prefix, false);
    reader.seek(4)?;
    reader.size_i32()
}

/// Konversi sumber KMessage apa pun ke MessageStore baru
///
/// Element `MESSAGE` yang berisi KMessage valid dikonversi rekursif dan
/// disimpan sebagai native flattened message. Terlalu dalam tetap error.
pub fn convert<S: KMessageSource>(source: &S, config: &StoreConfig) -> Result<MessageStore> {
    convert_nested(source, config, 0)
}

fn convert_nested<S: KMessageSource>(
    source: &S,
    config: &StoreConfig,
    depth: usize,
) -> Result<MessageStore> {
    if depth > MAX_NESTING_DEPTH {
        return Err(MessageError::bad_data("nested messages too deep"));
    }
    let mut store = MessageStore::with_config(source.what(), *config)?;

    for field in source.fields() {
        let type_code = field.type_code();
        let fixed = field.has_fixed_element_size();

        for index in 0..field.count_elements() {
            let element = field.element_at(index).ok_or(MessageError::BadIndex)?;

            // Element yang gagal di-parse disimpan apa adanya
            let nested = if type_code == TypeCode::MESSAGE && is_kmessage(element) {
                KMessage::parse(element).ok()
            } else {
                None
            };
            let result = match nested {
                Some(nested) => {
                    let nested = convert_nested(&nested, config, depth + 1)?;
                    store.add_message(field.name(), &nested)
                }
                None => store.add_data(field.name(), type_code, element, fixed),
            };
            result.map_err(super::wire_error)?;
        }
    }
    Ok(store)
}

#[inline(always)]
fn is_kmessage(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[..4] == MAGIC_KMESSAGE.to_le_bytes()
}

pub(crate) fn unflatten(bytes: &[u8], _swapped: bool, config: &StoreConfig) -> Result<MessageStore> {
    let message = KMessage::parse(bytes)?;
    convert(&message, config)
}
