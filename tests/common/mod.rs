//! Fixture builders untuk format legacy (R5, Dano, KMessage)
//!
//! Library hanya menulis native, jadi bytes legacy dirakit di sini,
//! dalam little-endian atau big-endian.

#![allow(dead_code)]

use flatmsg::protocol::header_checksum;
use flatmsg::TypeCode;

/// Item sebuah field fixture
pub struct Field<'a> {
    pub name: &'a str,
    pub type_code: TypeCode,
    pub items: Vec<&'a [u8]>,
    pub fixed: bool,
}

impl<'a> Field<'a> {
    pub fn fixed(name: &'a str, type_code: TypeCode, items: &[&'a [u8]]) -> Self {
        Self {
            name,
            type_code,
            items: items.to_vec(),
            fixed: true,
        }
    }

    pub fn variable(name: &'a str, type_code: TypeCode, items: &[&'a [u8]]) -> Self {
        Self {
            name,
            type_code,
            items: items.to_vec(),
            fixed: false,
        }
    }
}

/// Writer kecil dengan pilihan byte order
pub struct Out {
    pub bytes: Vec<u8>,
    pub big_endian: bool,
}

impl Out {
    pub fn new(big_endian: bool) -> Self {
        Self {
            bytes: Vec::new(),
            big_endian,
        }
    }

    pub fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn u16(&mut self, value: u16) {
        let raw = if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        self.bytes.extend_from_slice(&raw);
    }

    pub fn u32(&mut self, value: u32) {
        let raw = if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        self.bytes.extend_from_slice(&raw);
    }

    pub fn i32(&mut self, value: i32) {
        self.u32(value as u32);
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn pad_to(&mut self, alignment: usize) {
        while self.bytes.len() % alignment != 0 {
            self.bytes.push(0);
        }
    }

    pub fn patch_u32(&mut self, at: usize, value: u32) {
        let raw = if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        self.bytes[at..at + 4].copy_from_slice(&raw);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// Item fixed-width dalam byte order target (input selalu little-endian)
pub fn order_item(item: &[u8], type_code: TypeCode, big_endian: bool) -> Vec<u8> {
    let mut owned = item.to_vec();
    if big_endian {
        if let Some(width) = type_code.swap_width() {
            if width > 1 && owned.len() % width == 0 {
                for chunk in owned.chunks_exact_mut(width) {
                    chunk.reverse();
                }
            }
        }
    }
    owned
}

// ── R5 ──────────────────────────────────────────────────────────────

pub const R5_MAGIC: u32 = u32::from_be_bytes(*b"FOB1");

/// R5 message; header memakai flags 0 (tanpa target/reply)
pub fn r5_message(what: u32, fields: &[Field<'_>], big_endian: bool) -> Vec<u8> {
    r5_message_with_target(what, None, fields, big_endian)
}

pub fn r5_message_with_target(
    what: u32,
    target: Option<i32>,
    fields: &[Field<'_>],
    big_endian: bool,
) -> Vec<u8> {
    let mut out = Out::new(big_endian);
    out.u32(R5_MAGIC);
    out.u32(0); // checksum
    out.u32(0); // size
    out.u32(what);
    out.u8(if target.is_some() { 0x02 } else { 0 });
    if let Some(token) = target {
        out.i32(token);
    }
    let header_len = out.len();

    for field in fields {
        let mut data = Out::new(big_endian);
        for item in &field.items {
            let ordered = order_item(item, field.type_code, big_endian);
            if field.fixed {
                data.raw(&ordered);
            } else {
                data.u32(ordered.len() as u32);
                data.raw(&ordered);
                data.pad_to(8);
            }
        }

        let count = field.items.len();
        let single = count == 1;
        let mini = count < 256 && data.len() < 256;

        let mut flags = 0x01;
        if mini {
            flags |= 0x02;
        }
        if field.fixed {
            flags |= 0x04;
        }
        if single {
            flags |= 0x08;
        }

        out.u8(flags);
        out.u32(field.type_code.0);
        if !single {
            if mini {
                out.u8(count as u8);
            } else {
                out.u32(count as u32);
            }
        }
        if mini {
            out.u8(data.len() as u8);
        } else {
            out.u32(data.len() as u32);
        }
        out.u8(field.name.len() as u8);
        out.raw(field.name.as_bytes());
        out.raw(&data.bytes);
    }
    out.u8(0); // terminator

    let total = out.len() as u32;
    out.patch_u32(8, total);
    let checksum = header_checksum(&out.bytes[8..header_len]);
    out.patch_u32(4, checksum);
    out.bytes
}

// ── Dano ────────────────────────────────────────────────────────────

pub const DANO_MAGIC: u32 = u32::from_be_bytes(*b"FOB2");

pub fn tag(code: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*code)
}

/// Satu section Dano, payload di-pad ke 8
pub fn dano_section(out: &mut Out, code: u32, payload: &[u8]) {
    let padded = (payload.len() + 7) & !7;
    out.u32(code);
    out.i32((8 + padded) as i32);
    out.raw(payload);
    for _ in payload.len()..padded {
        out.u8(0);
    }
}

/// Dano message: field single -> SGDa, fixed -> FADa, variable -> VADa.
/// `extra` disisipkan sebelum data sections (mis. section yang harus dilewati).
pub fn dano_message(
    what: u32,
    fields: &[Field<'_>],
    extra: &[(u32, Vec<u8>)],
    big_endian: bool,
) -> Vec<u8> {
    let mut out = Out::new(big_endian);
    out.u32(DANO_MAGIC);
    out.i32(0);
    out.u32(what);
    out.u32(0);

    for (code, payload) in extra {
        dano_section(&mut out, *code, payload);
    }

    for field in fields {
        let mut payload = Out::new(big_endian);
        payload.u32(field.type_code.0);
        let items: Vec<Vec<u8>> = field
            .items
            .iter()
            .map(|item| order_item(item, field.type_code, big_endian))
            .collect();

        let code = if items.len() == 1 {
            payload.i32(items[0].len() as i32);
            payload.u8(field.name.len() as u8);
            payload.raw(field.name.as_bytes());
            payload.raw(&items[0]);
            tag(b"SGDa")
        } else if field.fixed {
            payload.i32(items[0].len() as i32);
            payload.i32(items.len() as i32);
            payload.u8(field.name.len() as u8);
            payload.raw(field.name.as_bytes());
            for item in &items {
                payload.raw(item);
            }
            tag(b"FADa")
        } else {
            payload.i32(items.len() as i32);
            payload.u8(field.name.len() as u8);
            payload.raw(field.name.as_bytes());
            let mut end = 0;
            for item in &items {
                end += item.len();
                payload.i32(end as i32);
            }
            for item in &items {
                payload.raw(item);
            }
            tag(b"VADa")
        };
        dano_section(&mut out, code, &payload.bytes);
    }

    dano_section(&mut out, tag(b"DDEn"), &[]);
    let total = out.len() as u32;
    out.patch_u32(4, total);
    out.bytes
}

// ── KMessage ────────────────────────────────────────────────────────

pub const KMESSAGE_MAGIC: u32 = u32::from_be_bytes(*b"kMsG");

/// KMessage little-endian; field `fixed` memakai element size item pertama
pub fn kmessage(what: u32, fields: &[Field<'_>]) -> Vec<u8> {
    let mut out = Out::new(false);
    out.u32(KMESSAGE_MAGIC);
    out.i32(0);
    out.u32(what);
    out.i32(-1); // sender
    out.i32(-1); // target token
    out.i32(-1); // reply port
    out.i32(-1); // reply token

    for field in fields {
        let header_size = (18 + field.name.len() + 1 + 3) & !3;
        let mut body = Out::new(false);
        let element_size = if field.fixed {
            for item in &field.items {
                body.raw(item);
            }
            field.items[0].len() as i32
        } else {
            for item in &field.items {
                body.i32(item.len() as i32);
                body.raw(item);
                body.pad_to(4);
            }
            -1
        };

        let start = out.len();
        out.u32(field.type_code.0);
        out.i32(element_size);
        out.i32(field.items.len() as i32);
        out.i32((header_size + body.len()) as i32);
        out.u16(header_size as u16);
        out.raw(field.name.as_bytes());
        out.u8(0);
        while out.len() < start + header_size {
            out.u8(0);
        }
        out.raw(&body.bytes);
    }

    let total = out.len() as u32;
    out.patch_u32(4, total);
    out.bytes
}

// ── Native big-endian ───────────────────────────────────────────────

fn reverse(bytes: &mut [u8], at: usize, width: usize) {
    bytes[at..at + width].reverse();
}

fn le_u32(bytes: &[u8], at: usize) -> usize {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize
}

fn le_u16(bytes: &[u8], at: usize) -> usize {
    u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize
}

/// Tulis ulang output `flatten()` sebagai native big-endian
pub fn native_to_big_endian(native: &[u8]) -> Vec<u8> {
    let mut out = native.to_vec();
    for at in [0, 4, 8, 12] {
        reverse(&mut out, at, 4);
    }

    let flags = native[16];
    let mut pos = 17;
    if flags & 0x02 != 0 {
        reverse(&mut out, pos, 4);
        pos += 4;
    }
    if flags & 0x04 != 0 {
        for at in [pos, pos + 4, pos + 8] {
            reverse(&mut out, at, 4);
        }
        pos += 16;
    }

    let field_count = le_u32(native, pos);
    reverse(&mut out, pos, 4);
    reverse(&mut out, pos + 4, 4);
    pos += 8;
    let header_len = pos;

    let data_start = pos + field_count * 20;
    for _ in 0..field_count {
        let field_flags = le_u16(native, pos);
        let name_length = le_u16(native, pos + 2);
        let type_code = TypeCode(le_u32(native, pos + 4) as u32);
        let count = le_u32(native, pos + 8);
        let data_size = le_u32(native, pos + 12);
        let offset = le_u32(native, pos + 16);

        reverse(&mut out, pos, 2);
        reverse(&mut out, pos + 2, 2);
        for at in [pos + 4, pos + 8, pos + 12, pos + 16] {
            reverse(&mut out, at, 4);
        }
        pos += 20;

        let items_start = data_start + offset + name_length;
        let width = type_code.swap_width().filter(|&w| w > 1);
        if field_flags & 0x02 != 0 {
            if let Some(width) = width {
                for chunk in out[items_start..items_start + data_size].chunks_exact_mut(width) {
                    chunk.reverse();
                }
            }
        } else {
            let mut record = items_start;
            for _ in 0..count {
                let len = le_u32(native, record);
                reverse(&mut out, record, 4);
                if let Some(width) = width.filter(|w| len % w == 0) {
                    for chunk in out[record + 4..record + 4 + len].chunks_exact_mut(width) {
                        chunk.reverse();
                    }
                }
                record += (4 + len + 7) & !7;
            }
        }
    }

    let checksum = header_checksum(&out[8..header_len]);
    out[4..8].copy_from_slice(&checksum.to_be_bytes());
    out
}
