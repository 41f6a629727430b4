//! Dahlia Value
//!
//! The tagged union used to move data between steps, workers and storage:
//! strings, URLs, binary resources, tar-like archives and JSON trees.
//!
//! Resources and archives are lazy. A value built from a URL reads nothing
//! until its bytes are asked for, then keeps them for its lifetime. The
//! [`ResourceSource`] and [`ArchiveSource`] traits are the seams where new
//! backends plug in; memory, file, HTTP, `data:` URL and storage-backed
//! implementations are provided.

mod archive;
mod error;
mod kind;
mod persist;
mod resource;
mod value;

pub use archive::{
  ArchiveEntry, ArchiveSource, ArchiveValue, DirectoryArchive, MemoryArchive, TarArchive, pack,
  unpack,
};
pub use error::ValueError;
pub use kind::ValueKind;
pub use persist::{load_value, store_value};
pub use resource::{
  DataUrlResource, FileResource, HttpResource, MemoryResource, ResourceSource, ResourceValue,
  StorageResource, ValueStream,
};
pub use value::Value;
