//! flatmsg - Named-field message store dengan wire codecs
//!
//! Arsitektur:
//! - Core: DataArena (satu buffer relocatable) + FieldTable (descriptor + hash index)
//! - Message: MessageStore value API, typed helpers, dump
//! - Protocol: native flatten/unflatten + decoder R5, Dano, KMessage
//!
//! ```
//! use flatmsg::{MessageStore, TypeCode};
//!
//! let mut msg = MessageStore::new(u32::from_be_bytes(*b"PING"));
//! msg.add_value("seq", 7i32)?;
//! msg.add_string("from", "kernel")?;
//!
//! let bytes = msg.flatten()?;
//! let back = MessageStore::unflatten(&bytes)?;
//! assert_eq!(back.find_value::<i32>("seq", 0)?, 7);
//! assert_eq!(back.get_info("from")?.type_code, TypeCode::STRING);
//! # Ok::<(), flatmsg::MessageError>(())
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod message;
pub mod protocol;

pub use crate::config::StoreConfig;
pub use crate::core::MessageFile;
pub use crate::error::{MessageError, Result};
pub use crate::message::{
    DeliveryFlags, FieldData, FieldInfo, FieldRef, FlatValue, Flattenable, MessageHeader,
    MessageStore, Point, Rect, ReplyAddress, TypeCode,
};
