//! Core type definitions for the entry log store.

use std::fmt;

/// Unique identifier for a logical ledger.
///
/// Many ledgers multiplex their entries into shared segment files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LedgerId(pub u64);

impl LedgerId {
    /// Creates a new ledger ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ledger:{}", self.0)
    }
}

/// Identifier of an entry within a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub u64);

impl EntryId {
    /// Creates a new entry ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry:{}", self.0)
    }
}

/// Unique identifier for a segment file.
///
/// Segment IDs are monotonically increasing and assigned at creation.
/// The segment file is named by the hex rendering of the ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub u64);

impl SegmentId {
    /// Creates a new segment ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next segment ID.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Generates the filename for this segment.
    #[must_use]
    pub fn filename(self) -> String {
        format!("{:x}.log", self.0)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment:{:x}", self.0)
    }
}

/// Opaque 64-bit handle to an entry in the store.
///
/// Returned by append and consumed by read. Packs the segment ID into the
/// high 32 bits and the file offset of the first payload byte into the low
/// 32 bits, which caps both halves at 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location(pub u64);

impl Location {
    /// Packs a segment ID and a payload offset into a location.
    #[must_use]
    pub const fn new(segment_id: SegmentId, offset: u64) -> Self {
        Self((segment_id.as_u64() << 32) | (offset & 0xffff_ffff))
    }

    /// Returns the segment half of the location.
    #[must_use]
    pub const fn segment_id(self) -> SegmentId {
        SegmentId::new(self.0 >> 32)
    }

    /// Returns the file offset of the first payload byte.
    #[must_use]
    pub const fn offset(self) -> u64 {
        self.0 & 0xffff_ffff
    }

    /// Returns the raw packed value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.segment_id(), self.offset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_filename_is_hex() {
        assert_eq!(SegmentId::new(0).filename(), "0.log");
        assert_eq!(SegmentId::new(10).filename(), "a.log");
        assert_eq!(SegmentId::new(255).filename(), "ff.log");
    }

    #[test]
    fn segment_next() {
        assert_eq!(SegmentId::new(41).next(), SegmentId::new(42));
    }

    #[test]
    fn location_round_trip() {
        let location = Location::new(SegmentId::new(7), 1049);
        assert_eq!(location.segment_id(), SegmentId::new(7));
        assert_eq!(location.offset(), 1049);
        assert_eq!(location.as_u64(), (7u64 << 32) | 1049);
    }

    #[test]
    fn location_zero_segment() {
        let location = Location::new(SegmentId::new(0), 1028);
        assert_eq!(location.segment_id(), SegmentId::new(0));
        assert_eq!(location.offset(), 1028);
    }
}
