//! Core module: storage engine di bawah MessageStore
//!
//! Prinsip desain:
//! - Satu arena: semua name + data dalam satu buffer kontigu
//! - Index, bukan pointer: relocate arena tidak meng-invalidasi apa pun
//! - Gagal alokasi = error, state tetap seperti sebelum call

mod arena;
mod field_table;
mod mapped_file;

pub use arena::DataArena;
pub use field_table::{
    framed_size, hash_name, validate_name, FieldHeader, FieldTable, ItemLayout, Items,
    FIELD_FLAG_FIXED_SIZE, FIELD_FLAG_VALID, ITEM_ALIGNMENT, ITEM_LENGTH_PREFIX, MAX_DATA_SIZE,
    MAX_NAME_LENGTH,
};
pub use mapped_file::MessageFile;
