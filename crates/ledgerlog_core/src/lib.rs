//! # Ledgerlog Core
//!
//! Append-only entry log store for a ledger storage node.
//!
//! Entries from many logical ledgers are multiplexed into a small number
//! of large, rolling segment files; an external ledger index records,
//! for each `(ledger, entry)`, an opaque 64-bit location pointing back
//! into this store. This crate provides:
//!
//! - The append path producing stable locations
//! - The random-access read path resolving locations to payloads
//! - Segment rollover at a configured size threshold
//! - Startup recovery scanning sealed segments
//! - Background garbage collection of segments no live ledger references

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dir;
pub mod error;
pub mod gc;
pub mod ledgers;
pub mod log;
pub mod types;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use gc::GcStats;
pub use ledgers::{ActiveLedgerManager, Collaborators, CoordinationClient, LedgerIndex};
pub use log::store::EntryLogStore;
pub use types::{EntryId, LedgerId, Location, SegmentId};
