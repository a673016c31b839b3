//! # tuplog storage
//!
//! Byte-store and directory backends for tuplog.
//!
//! This crate is the lowest layer of tuplog. It knows nothing about log
//! segments, snapshots or tuples:
//!
//! - a [`StorageBackend`] is an opaque, append-only byte store
//! - a [`Directory`] is a flat namespace of such byte stores
//!
//! The file system implementations are what a running engine uses. The
//! in-memory implementations let recovery be driven from fabricated
//! segments without touching disk.
//!
//! ## Available backends
//!
//! - [`InMemoryBackend`] / [`InMemoryDirectory`] - tests and ephemeral data
//! - [`FileBackend`] / [`FileDirectory`] - persistent storage via OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use tuplog_storage::{Directory, InMemoryDirectory, StorageBackend};
//!
//! let dir = InMemoryDirectory::new();
//! let mut file = dir.create("00000000000000000001.xlog").unwrap();
//! file.append(b"hello").unwrap();
//!
//! let reopened = dir.open("00000000000000000001.xlog").unwrap();
//! assert_eq!(reopened.read_at(0, 5).unwrap(), b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod directory;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use directory::{Directory, FileDirectory, InMemoryDirectory};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
