//! Message Layer: value API di atas core engine
//!
//! - `types`: type codes dan typed item values
//! - `header`: target / reply / delivery state
//! - `store`: MessageStore (add / find / replace / remove / rename)
//! - `print`: dump seperti PrintToStream

mod header;
mod print;
mod store;
mod types;

pub use header::{DeliveryFlags, MessageHeader, ReplyAddress, NULL_TOKEN, PREFERRED_TOKEN};
pub use store::{FieldData, FieldInfo, FieldRef, Fields, MessageStore};
pub use types::{swap_items, FlatValue, Flattenable, Point, Rect, TypeCode};
