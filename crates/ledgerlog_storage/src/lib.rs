//! # Ledgerlog Storage
//!
//! Buffered byte-store primitives for the ledgerlog entry log store.
//!
//! This crate provides the lowest-level storage abstraction: a
//! write-behind [`BufferedChannel`] over a random-access file. The channel
//! is an **opaque byte store** - it does not interpret segment headers,
//! entry frames, or any other file format. The core crate owns all format
//! interpretation.
//!
//! ## Design Principles
//!
//! - Channels are simple byte streams (write, read-at, flush)
//! - No knowledge of segment or entry layouts
//! - Must be `Send + Sync` for concurrent access
//! - Reads served consistently even for bytes still in the write buffer

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod error;

pub use channel::BufferedChannel;
pub use error::{StorageError, StorageResult};
