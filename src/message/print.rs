//! Human-readable dump (`Display`)
//!
//! Satu baris per field, satu baris per item di bawahnya. Nested
//! message di-dump rekursif dengan indent tambahan, maksimal
//! `MAX_NESTING_DEPTH` level.

use std::fmt::{self, Write};

use super::store::{FieldRef, MessageStore};
use super::types::{FlatValue, Point, Rect, TypeCode};
use crate::protocol::kmessage::MAX_NESTING_DEPTH;

const INDENT: &str = "    ";

impl fmt::Display for MessageStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_message(f, self, 0, 0)
    }
}

fn pad(f: &mut dyn Write, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        f.write_str(INDENT)?;
    }
    Ok(())
}

fn write_message(
    f: &mut dyn Write,
    store: &MessageStore,
    depth: usize,
    nesting: usize,
) -> fmt::Result {
    writeln!(
        f,
        "BMessage: what = {} (0x{:x}, or {})",
        TypeCode(store.what),
        store.what,
        store.what as i32
    )?;

    for field in store.fields() {
        pad(f, depth + 1)?;
        write!(
            f,
            "entry {}, type='{}', c={}",
            field.name(),
            field.type_code(),
            field.count()
        )?;
        if field.is_fixed_size() {
            let size = field.item(0).map(<[u8]>::len).unwrap_or(0);
            write!(f, ", size={:2}", size)?;
        }
        writeln!(f)?;
        write_items(f, &field, depth + 2, nesting)?;
    }
    Ok(())
}

fn write_items(
    f: &mut dyn Write,
    field: &FieldRef<'_>,
    depth: usize,
    nesting: usize,
) -> fmt::Result {
    for (index, item) in field.items().enumerate() {
        pad(f, depth)?;
        write!(f, "data[{}]: ", index)?;
        write_item(f, field.type_code(), item, depth, nesting)?;
    }
    Ok(())
}

/// Decode item untuk type yang dikenal, sisanya hex
fn write_item(
    f: &mut dyn Write,
    type_code: TypeCode,
    item: &[u8],
    depth: usize,
    nesting: usize,
) -> fmt::Result {
    macro_rules! int {
        ($ty:ty) => {{
            let value = <$ty>::read_le(item);
            writeln!(f, "0x{:x} ({})", value, value)
        }};
    }

    let known = type_code.swap_width().is_some() && matches_size(type_code, item.len());
    match type_code {
        TypeCode::INT8 if known => int!(i8),
        TypeCode::INT16 if known => int!(i16),
        TypeCode::INT32 if known => int!(i32),
        TypeCode::INT64 if known => int!(i64),
        TypeCode::UINT8 if known => int!(u8),
        TypeCode::UINT16 if known => int!(u16),
        TypeCode::UINT32 if known => int!(u32),
        TypeCode::UINT64 if known => int!(u64),
        TypeCode::BOOL if known => writeln!(f, "{}", bool::read_le(item)),
        TypeCode::FLOAT if known => writeln!(f, "{:.4}", f32::read_le(item)),
        TypeCode::DOUBLE if known => writeln!(f, "{:.8}", f64::read_le(item)),
        TypeCode::POINT if known => {
            let point = Point::read_le(item);
            writeln!(f, "BPoint(x:{:.1}, y:{:.1})", point.x, point.y)
        }
        TypeCode::RECT if known => {
            let rect = Rect::read_le(item);
            writeln!(
                f,
                "BRect(l:{:.1}, t:{:.1}, r:{:.1}, b:{:.1})",
                rect.left, rect.top, rect.right, rect.bottom
            )
        }
        TypeCode::STRING => {
            let end = item.iter().position(|&b| b == 0).unwrap_or(item.len());
            writeln!(
                f,
                "size={}, \"{}\"",
                item.len(),
                String::from_utf8_lossy(&item[..end])
            )
        }
        TypeCode::MESSAGE if nesting >= MAX_NESTING_DEPTH => {
            writeln!(f, "size={}, <nested message, depth limit>", item.len())
        }
        TypeCode::MESSAGE => match MessageStore::unflatten(item) {
            Ok(nested) => write_message(f, &nested, depth, nesting + 1),
            Err(err) => writeln!(f, "size={}, <undecodable: {}>", item.len(), err),
        },
        _ => write_hex(f, item),
    }
}

fn matches_size(type_code: TypeCode, len: usize) -> bool {
    let expected = match type_code {
        TypeCode::BOOL | TypeCode::INT8 | TypeCode::UINT8 => 1,
        TypeCode::INT16 | TypeCode::UINT16 => 2,
        TypeCode::INT32 | TypeCode::UINT32 | TypeCode::FLOAT => 4,
        TypeCode::POINT => Point::SIZE,
        TypeCode::RECT => Rect::SIZE,
        _ => 8,
    };
    expected == len
}

/// Raw bytes, dipotong setelah 32 byte
fn write_hex(f: &mut dyn Write, item: &[u8]) -> fmt::Result {
    const LIMIT: usize = 32;
    write!(f, "size={}, ", item.len())?;
    for byte in item.iter().take(LIMIT) {
        write!(f, "{:02x}", byte)?;
    }
    if item.len() > LIMIT {
        f.write_str("...")?;
    }
    writeln!(f)
}
