//! Typed, durable views over a [`Storage`](crate::Storage) tree.
//!
//! A record is a directory; each of its properties is a file holding the
//! encoded value. Nothing here caches: reading a field always goes to the
//! backend.

mod error;
mod field;
mod list;
mod map;

pub use error::StoredError;
pub use field::{
  FieldCodec, IntField, JsonCodec, JsonField, StoredField, StringField, TextCodec, TextField,
};
pub use list::StoredOrderedNamedObjectList;
pub use map::{StoredNamedObjectMap, StoredObject};
