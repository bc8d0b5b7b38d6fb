//! Type codes dan typed item values
//!
//! Type code adalah tag 4 karakter (multi-char constant), misalnya
//! `'LONG'` untuk int32. Store sendiri tidak menginterpretasi bytes;
//! type code hanya dipakai untuk matching dan byte-swap saat decode.

use std::fmt;

use crate::error::Result;

/// 4-byte type tag
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeCode(pub u32);

const fn tag(code: &[u8; 4]) -> TypeCode {
    TypeCode(u32::from_be_bytes(*code))
}

impl TypeCode {
    pub const ANY: Self = tag(b"ANYT");
    pub const BOOL: Self = tag(b"BOOL");
    pub const INT8: Self = tag(b"BYTE");
    pub const INT16: Self = tag(b"SHRT");
    pub const INT32: Self = tag(b"LONG");
    pub const INT64: Self = tag(b"LLNG");
    pub const UINT8: Self = tag(b"UBYT");
    pub const UINT16: Self = tag(b"USHT");
    pub const UINT32: Self = tag(b"ULNG");
    pub const UINT64: Self = tag(b"ULLG");
    pub const FLOAT: Self = tag(b"FLOT");
    pub const DOUBLE: Self = tag(b"DBLE");
    pub const POINT: Self = tag(b"BPNT");
    pub const RECT: Self = tag(b"RECT");
    pub const SIZE_T: Self = tag(b"SIZT");
    pub const SSIZE_T: Self = tag(b"SSZT");
    pub const OFF_T: Self = tag(b"OFFT");
    pub const TIME: Self = tag(b"TIME");
    pub const POINTER: Self = tag(b"PNTR");
    pub const STRING: Self = tag(b"CSTR");
    pub const MESSAGE: Self = tag(b"MSGG");
    pub const MESSENGER: Self = tag(b"MSNG");
    pub const REF: Self = tag(b"RREF");
    pub const RAW: Self = tag(b"RAWT");
    pub const MIME: Self = tag(b"MIME");

    /// Type code dari 4 karakter ASCII
    pub const fn from_tag(code: &[u8; 4]) -> Self {
        tag(code)
    }

    /// 4 karakter tag (big-endian order, seperti multi-char constant)
    pub const fn to_tag(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Type yang item-nya selalu satu ukuran
    pub fn is_fixed_size(self) -> bool {
        self.swap_width().is_some()
    }

    /// Unit byte-swap untuk decode data dari mesin dengan endianness lain
    ///
    /// `Some(1)` berarti fixed-size tapi tidak perlu swap.
    pub fn swap_width(self) -> Option<usize> {
        match self {
            Self::BOOL | Self::INT8 | Self::UINT8 => Some(1),
            Self::INT16 | Self::UINT16 => Some(2),
            Self::INT32 | Self::UINT32 | Self::FLOAT | Self::POINT | Self::RECT => Some(4),
            Self::INT64
            | Self::UINT64
            | Self::DOUBLE
            | Self::SIZE_T
            | Self::SSIZE_T
            | Self::OFF_T
            | Self::TIME
            | Self::POINTER => Some(8),
            _ => None,
        }
    }
}

impl From<u32> for TypeCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = self.to_tag();
        if raw.iter().all(|c| c.is_ascii_graphic() || *c == b' ') {
            for &c in &raw {
                write!(f, "{}", c as char)?;
            }
            Ok(())
        } else {
            write!(f, "0x{:08x}", self.0)
        }
    }
}

impl fmt::Debug for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeCode('{}')", self)
    }
}

/// Byte-swap `bytes` in place dengan unit `width`
pub fn swap_items(bytes: &mut [u8], width: usize) {
    if width > 1 {
        for chunk in bytes.chunks_exact_mut(width) {
            chunk.reverse();
        }
    }
}

/// 2D point (`BPNT`)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Rectangle (`RECT`) - left, top, right, bottom
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// Value yang disimpan sebagai satu fixed-size item
pub trait FlatValue: Sized {
    const TYPE_CODE: TypeCode;
    const SIZE: usize;

    /// Tulis little-endian ke `out` (panjang = SIZE)
    fn write_le(&self, out: &mut [u8]);

    /// Baca little-endian dari `bytes` (panjang = SIZE)
    fn read_le(bytes: &[u8]) -> Self;
}

/// Object yang bisa di-flatten ke satu item dengan type code sendiri
///
/// `unflatten` mengisi ulang object yang sudah ada, jadi type code bisa
/// diambil dari instance sebelum item dicari.
pub trait Flattenable {
    fn type_code(&self) -> TypeCode;

    fn is_fixed_size(&self) -> bool;

    fn flattened_size(&self) -> usize;

    /// `buffer.len()` selalu sama dengan `flattened_size()`
    fn flatten_into(&self, buffer: &mut [u8]) -> Result<()>;

    fn unflatten(&mut self, bytes: &[u8]) -> Result<()>;
}

macro_rules! impl_flat_number {
    ($ty:ty, $code:expr) => {
        impl FlatValue for $ty {
            const TYPE_CODE: TypeCode = $code;
            const SIZE: usize = std::mem::size_of::<$ty>();

            #[inline(always)]
            fn write_le(&self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }

            #[inline(always)]
            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_le_bytes(raw)
            }
        }
    };
}

impl_flat_number!(i8, TypeCode::INT8);
impl_flat_number!(i16, TypeCode::INT16);
impl_flat_number!(i32, TypeCode::INT32);
impl_flat_number!(i64, TypeCode::INT64);
impl_flat_number!(u8, TypeCode::UINT8);
impl_flat_number!(u16, TypeCode::UINT16);
impl_flat_number!(u32, TypeCode::UINT32);
impl_flat_number!(u64, TypeCode::UINT64);
impl_flat_number!(f32, TypeCode::FLOAT);
impl_flat_number!(f64, TypeCode::DOUBLE);

impl FlatValue for bool {
    const TYPE_CODE: TypeCode = TypeCode::BOOL;
    const SIZE: usize = 1;

    fn write_le(&self, out: &mut [u8]) {
        out[0] = u8::from(*self);
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

impl FlatValue for Point {
    const TYPE_CODE: TypeCode = TypeCode::POINT;
    const SIZE: usize = 8;

    fn write_le(&self, out: &mut [u8]) {
        self.x.write_le(&mut out[0..4]);
        self.y.write_le(&mut out[4..8]);
    }

    fn read_le(bytes: &[u8]) -> Self {
        Self {
            x: f32::read_le(&bytes[0..4]),
            y: f32::read_le(&bytes[4..8]),
        }
    }
}

impl FlatValue for Rect {
    const TYPE_CODE: TypeCode = TypeCode::RECT;
    const SIZE: usize = 16;

    fn write_le(&self, out: &mut [u8]) {
        self.left.write_le(&mut out[0..4]);
        self.top.write_le(&mut out[4..8]);
        self.right.write_le(&mut out[8..12]);
        self.bottom.write_le(&mut out[12..16]);
    }

    fn read_le(bytes: &[u8]) -> Self {
        Self {
            left: f32::read_le(&bytes[0..4]),
            top: f32::read_le(&bytes[4..8]),
            right: f32::read_le(&bytes[8..12]),
            bottom: f32::read_le(&bytes[12..16]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        assert_eq!(TypeCode::INT32.0, 0x4C4F_4E47);
        assert_eq!(&TypeCode::STRING.to_tag(), b"CSTR");
        assert_eq!(TypeCode::from_tag(b"LONG"), TypeCode::INT32);
        assert_eq!(TypeCode::MESSAGE.to_string(), "MSGG");
        assert_eq!(TypeCode(1).to_string(), "0x00000001");
    }

    #[test]
    fn test_fixed_size_types() {
        assert!(TypeCode::INT64.is_fixed_size());
        assert!(TypeCode::BOOL.is_fixed_size());
        assert!(!TypeCode::STRING.is_fixed_size());
        assert!(!TypeCode::MESSAGE.is_fixed_size());
        assert_eq!(TypeCode::RECT.swap_width(), Some(4));
    }

    #[test]
    fn test_swap_items() {
        let mut bytes = [1, 2, 3, 4, 5, 6, 7, 8];
        swap_items(&mut bytes, 4);
        assert_eq!(bytes, [4, 3, 2, 1, 8, 7, 6, 5]);
        swap_items(&mut bytes, 1);
        assert_eq!(bytes, [4, 3, 2, 1, 8, 7, 6, 5]);
    }

    #[test]
    fn test_flat_values() {
        let mut buf = [0u8; 16];
        (-2i32).write_le(&mut buf[..4]);
        assert_eq!(i32::read_le(&buf[..4]), -2);

        let rect = Rect {
            left: 1.0,
            top: 2.0,
            right: 3.5,
            bottom: 4.25,
        };
        rect.write_le(&mut buf);
        assert_eq!(Rect::read_le(&buf), rect);

        true.write_le(&mut buf[..1]);
        assert!(bool::read_le(&buf[..1]));
    }
}
