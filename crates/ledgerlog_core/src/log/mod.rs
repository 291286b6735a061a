//! The entry log segment family.
//!
//! A segment file starts with a fixed 1024-byte header whose first four
//! bytes are the ASCII magic `BKLO`; the rest of the header is reserved.
//! The body is a packed sequence of entry frames:
//!
//! ```text
//! 4 bytes  : big-endian u32 frame length L (excludes these 4 bytes)
//! L bytes  : payload; first 8 bytes = big-endian ledger ID,
//!            next 8 bytes = big-endian entry ID, rest = opaque
//! ```
//!
//! There is no footer and no per-segment index; locations handed out at
//! append time are the only way back into a segment.

pub mod ledger_map;
pub mod registry;
pub mod scan;
pub mod store;

use crate::types::{EntryId, LedgerId};

/// Size of the fixed header at the start of every segment file.
pub const SEGMENT_HEADER_SIZE: u64 = 1024;

/// Magic bytes at the start of the segment header.
pub const SEGMENT_MAGIC: [u8; 4] = *b"BKLO";

/// Frame lengths above this are reported as corruption suspects, but
/// reads and scans still proceed.
pub const MAX_SANE_ENTRY_SIZE: u32 = 1024 * 1024;

/// Number of leading payload bytes carrying the entry identity.
pub const ENTRY_IDENTITY_SIZE: usize = 16;

/// Buffer capacity for the active write channel.
pub const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Buffer capacity for channels opened on behalf of readers.
pub const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Builds the fixed segment header: the magic followed by zeros.
#[must_use]
pub fn segment_header() -> [u8; SEGMENT_HEADER_SIZE as usize] {
    let mut header = [0u8; SEGMENT_HEADER_SIZE as usize];
    header[..4].copy_from_slice(&SEGMENT_MAGIC);
    header
}

/// Builds an entry payload: the 16-byte identity prefix followed by the
/// opaque body.
///
/// The writer trusts callers to encode the identity themselves; this
/// helper is the canonical way to do so.
#[must_use]
pub fn encode_entry(ledger_id: LedgerId, entry_id: EntryId, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(ENTRY_IDENTITY_SIZE + body.len());
    payload.extend_from_slice(&ledger_id.as_u64().to_be_bytes());
    payload.extend_from_slice(&entry_id.as_u64().to_be_bytes());
    payload.extend_from_slice(body);
    payload
}

/// Decodes the identity prefix of an entry payload.
///
/// Returns `None` when the payload is too short to carry one.
#[must_use]
pub fn decode_identity(payload: &[u8]) -> Option<(LedgerId, EntryId)> {
    if payload.len() < ENTRY_IDENTITY_SIZE {
        return None;
    }
    let ledger = u64::from_be_bytes(payload[0..8].try_into().ok()?);
    let entry = u64::from_be_bytes(payload[8..16].try_into().ok()?);
    Some((LedgerId::new(ledger), EntryId::new(entry)))
}
