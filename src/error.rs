//! Error kinds untuk semua operasi store dan codec.
//!
//! Semua error dikembalikan ke caller langsung; engine tidak pernah
//! abort dan tidak pernah diam-diam membuang data.

use std::io;

/// Errors returned by the message store and the wire codecs.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MessageError {
    /// Leading magic number is not one of the supported wire formats.
    #[error("not a flattened message")]
    NotAMessage,

    /// Checksum failure, truncated section, size overflow or any other
    /// structurally inconsistent wire content.
    #[error("bad message data: {0}")]
    BadData(String),

    /// The name exists under a different type code.
    #[error("field type mismatch")]
    TypeMismatch,

    #[error("index out of range")]
    BadIndex,

    /// Invalid argument (empty name, zero-length item, inconsistent fixed size, ...).
    #[error("bad value: {0}")]
    BadValue(&'static str),

    #[error("out of memory")]
    OutOfMemory,

    #[error("name not found")]
    NameNotFound,

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl MessageError {
    /// Convenience constructor for `BadData`.
    pub fn bad_data(reason: impl Into<String>) -> Self {
        Self::BadData(reason.into())
    }

    /// `true` kalau error berasal dari isi wire bytes (bukan dari API misuse).
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::NotAMessage | Self::BadData(_))
    }
}

pub type Result<T> = std::result::Result<T, MessageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_data_message() {
        let err = MessageError::bad_data("truncated field table");
        assert_eq!(err.to_string(), "bad message data: truncated field table");
        assert!(err.is_decode_error());
        assert!(!MessageError::BadIndex.is_decode_error());
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        let err: MessageError = io_err.into();
        assert!(matches!(err, MessageError::Io(_)));
    }
}
