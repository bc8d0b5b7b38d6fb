//! Store tuning knobs.

use crate::error::{MessageError, Result};

/// Bucket count untuk name hash table.
pub const DEFAULT_HASH_TABLE_SIZE: usize = 5;
/// Max slack yang di-preallocate di data arena (10 pages).
pub const MAX_DATA_PREALLOCATION: usize = 4096 * 10;
/// Max slack descriptor slots di field table.
pub const MAX_FIELD_PREALLOCATION: usize = 50;

/// Store configuration
///
/// Semua nilai hanya mempengaruhi performa, tidak pernah format wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Jumlah bucket hash table (harus > 0)
    pub hash_table_size: usize,
    /// Cap untuk pertumbuhan arena per realloc, juga batas shrink hysteresis
    pub max_data_prealloc: usize,
    /// Cap untuk slack descriptor array
    pub max_field_prealloc: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            hash_table_size: DEFAULT_HASH_TABLE_SIZE,
            max_data_prealloc: MAX_DATA_PREALLOCATION,
            max_field_prealloc: MAX_FIELD_PREALLOCATION,
        }
    }
}

impl StoreConfig {
    pub fn with_hash_table_size(mut self, buckets: usize) -> Self {
        self.hash_table_size = buckets;
        self
    }

    pub fn with_max_data_prealloc(mut self, bytes: usize) -> Self {
        self.max_data_prealloc = bytes;
        self
    }

    pub fn with_max_field_prealloc(mut self, slots: usize) -> Self {
        self.max_field_prealloc = slots;
        self
    }

    /// Validasi config sebelum dipakai store
    pub fn validate(&self) -> Result<()> {
        if self.hash_table_size == 0 {
            return Err(MessageError::BadValue("hash table needs at least one bucket"));
        }
        if self.hash_table_size > i32::MAX as usize {
            return Err(MessageError::BadValue("hash table too large"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hash_table_size, 5);
    }

    #[test]
    fn test_zero_buckets_rejected() {
        let config = StoreConfig::default().with_hash_table_size(0);
        assert!(matches!(config.validate(), Err(MessageError::BadValue(_))));
    }
}
