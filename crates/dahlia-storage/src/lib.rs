//! Dahlia Storage
//!
//! This crate provides the hierarchical key/value storage that backs every
//! piece of durable Dahlia state, and the stored-object views built on top
//! of it.
//!
//! The [`StorageBackend`] trait defines the platform layer (filesystem,
//! in-memory, read-only HTTP mirror). The [`Storage`] handle wraps a backend
//! together with a path prefix so that every record can be handed its own
//! sub-tree without knowing where that tree lives.
//!
//! The [`stored`] module layers typed fields, named maps and ordered lists on
//! top of a [`Storage`]. They are views, not caches: every read goes back to
//! the backend, so state written by one process is visible to the next one
//! after a restart.

mod backend;
mod error;
mod fs;
mod http;
mod memory;
mod path;
mod storage;
pub mod stored;

pub use backend::{ByteStream, StorageBackend};
pub use error::StorageError;
pub use fs::FsBackend;
pub use http::HttpBackend;
pub use memory::MemoryBackend;
pub use path::join;
pub use storage::Storage;
