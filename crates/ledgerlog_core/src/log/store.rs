//! The entry log store.
//!
//! Entries from many ledgers are multiplexed into a small number of
//! large, rolling segment files. Appends go to the single active
//! segment and hand back a [`Location`]; reads resolve a location back
//! to the entry payload through the channel registry. An external
//! ledger index persists the locations; this store never remembers
//! where an individual entry went.

use crate::config::Config;
use crate::dir::LedgerDirs;
use crate::error::{CoreError, CoreResult};
use crate::gc::{GarbageCollector, GcContext, GcStats};
use crate::ledgers::Collaborators;
use crate::log::ledger_map::SegmentLedgerMap;
use crate::log::registry::SegmentRegistry;
use crate::log::{decode_identity, scan, segment_header, MAX_SANE_ENTRY_SIZE, WRITE_BUFFER_SIZE};
use crate::types::{EntryId, LedgerId, Location, SegmentId};
use ledgerlog_storage::BufferedChannel;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, trace};

/// Append-only store for ledger entries, backed by rolling segments.
///
/// # Concurrency
///
/// A single writer lock serializes [`add_entry`](Self::add_entry),
/// [`flush`](Self::flush), rollover, and the dirty-flag exchange.
/// Readers never take it: they resolve channels through the registry and
/// rely on the buffered channel to serve bytes that are still in the
/// write buffer, so a location returned by an append is readable
/// immediately.
///
/// # Example
///
/// ```no_run
/// use ledgerlog_core::log::encode_entry;
/// use ledgerlog_core::{Config, EntryLogStore, EntryId, LedgerId};
///
/// let store = EntryLogStore::open(Config::new().ledger_dir("/data/ledgers")).unwrap();
/// let payload = encode_entry(LedgerId::new(7), EntryId::new(0), b"hello");
/// let location = store.add_entry(LedgerId::new(7), &payload).unwrap();
/// let read = store
///     .read_entry(LedgerId::new(7), EntryId::new(0), location)
///     .unwrap();
/// assert_eq!(read, payload);
/// ```
pub struct EntryLogStore {
    entry_log_size_limit: u64,
    dirs: Arc<LedgerDirs>,
    registry: Arc<SegmentRegistry>,
    map: Arc<SegmentLedgerMap>,
    collaborators: Arc<RwLock<Option<Collaborators>>>,
    writer: Mutex<Writer>,
    gc_context: GcContext,
    gc: Mutex<Option<GarbageCollector>>,
}

/// State guarded by the writer lock.
struct Writer {
    active_id: SegmentId,
    active: Arc<BufferedChannel>,
    /// Set by appends, cleared by the dirty-flag exchange; an external
    /// sync thread uses it to decide whether an fsync is due.
    something_written: bool,
}

impl EntryLogStore {
    /// Opens the store, creating a fresh active segment.
    ///
    /// The first segment ID is one past the highest `lastId` marker found
    /// in any storage directory. Every sealed segment discovered on disk
    /// is scanned into the segment to ledger-set index, and the garbage
    /// collector thread is started.
    ///
    /// # Errors
    ///
    /// Returns an error if no storage directory is configured, or if the
    /// active segment cannot be created.
    pub fn open(config: Config) -> CoreResult<Self> {
        let dirs = Arc::new(LedgerDirs::open(config.ledger_dirs)?);
        let registry = Arc::new(SegmentRegistry::new(Arc::clone(&dirs)));
        let map = Arc::new(SegmentLedgerMap::new());
        let collaborators = Arc::new(RwLock::new(None));

        let active_id = dirs
            .highest_marked_id()
            .map_or(SegmentId::new(0), SegmentId::next);
        let active = create_segment(&dirs, &registry, &map, active_id)?;

        let gc_context = GcContext::new(
            Arc::clone(&dirs),
            Arc::clone(&registry),
            Arc::clone(&map),
            Arc::clone(&collaborators),
        );
        let gc = GarbageCollector::spawn(gc_context.clone(), config.gc_wait_time)?;

        Ok(Self {
            entry_log_size_limit: config.entry_log_size_limit,
            dirs,
            registry,
            map,
            collaborators,
            writer: Mutex::new(Writer {
                active_id,
                active,
                something_written: false,
            }),
            gc_context,
            gc: Mutex::new(Some(gc)),
        })
    }

    /// Appends an entry payload and returns its location.
    ///
    /// The payload's first 16 bytes must carry the big-endian ledger and
    /// entry IDs (see [`encode_entry`](crate::log::encode_entry)); the
    /// writer trusts the caller's encoding and does not re-encode. When
    /// the append would push the active segment past the size limit, the
    /// segment is rolled first.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or a rollover fails; a failed
    /// rollover may leave a partially created segment on disk, which is
    /// rediscovered on the next startup.
    pub fn add_entry(&self, ledger_id: LedgerId, payload: &[u8]) -> CoreResult<Location> {
        let mut writer = self.writer.lock();

        if writer.active.position()? + 4 + payload.len() as u64 > self.entry_log_size_limit {
            self.roll(&mut writer)?;
        }

        let channel = Arc::clone(&writer.active);
        channel.write(&(payload.len() as u32).to_be_bytes())?;
        let offset = channel.position()?;
        channel.write(payload)?;
        writer.something_written = true;

        let location = Location::new(writer.active_id, offset);
        trace!(%ledger_id, %location, len = payload.len(), "appended entry");
        Ok(location)
    }

    /// Reads the entry payload at a location.
    ///
    /// The frame's identity prefix is checked against the caller's
    /// request before the payload is returned.
    ///
    /// # Errors
    ///
    /// - [`CoreError::SegmentNotFound`] if the segment's file is absent
    ///   from every storage directory.
    /// - [`CoreError::ShortRead`] if the frame extends past the segment.
    /// - [`CoreError::IdentityMismatch`] if the frame belongs to a
    ///   different `(ledger, entry)` than requested.
    pub fn read_entry(
        &self,
        ledger_id: LedgerId,
        entry_id: EntryId,
        location: Location,
    ) -> CoreResult<Vec<u8>> {
        let segment_id = location.segment_id();
        let channel = self
            .registry
            .channel_for(segment_id)?
            .ok_or(CoreError::SegmentNotFound {
                segment_id,
                ledger_id,
                location,
            })?;

        // The location points at the first payload byte; the length
        // prefix sits just before it.
        let len_pos = location.offset().checked_sub(4).ok_or_else(|| {
            CoreError::segment_corruption(format!("location {location} has no room for a length"))
        })?;
        let mut len_buf = [0u8; 4];
        let got = channel.read_at(&mut len_buf, len_pos)?;
        if got != len_buf.len() {
            return Err(CoreError::ShortRead {
                segment_id,
                pos: len_pos,
                wanted: len_buf.len(),
                got,
            });
        }

        let entry_size = u32::from_be_bytes(len_buf);
        if entry_size > MAX_SANE_ENTRY_SIZE {
            error!(%segment_id, %location, entry_size, "sanity check failed for entry size");
        }

        let mut payload = vec![0u8; entry_size as usize];
        let got = channel.read_at(&mut payload, location.offset())?;
        if got != payload.len() {
            return Err(CoreError::ShortRead {
                segment_id,
                pos: location.offset(),
                wanted: payload.len(),
                got,
            });
        }

        let (found_ledger, found_entry) = decode_identity(&payload).ok_or_else(|| {
            CoreError::segment_corruption(format!(
                "entry at {location} is too short to carry an identity"
            ))
        })?;
        if found_ledger != ledger_id || found_entry != entry_id {
            return Err(CoreError::IdentityMismatch {
                location,
                expected_ledger: ledger_id,
                expected_entry: entry_id,
                found_ledger,
                found_entry,
            });
        }

        Ok(payload)
    }

    /// Forces all buffered writes of the active segment to durable
    /// storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or fsync fails.
    pub fn flush(&self) -> CoreResult<()> {
        let writer = self.writer.lock();
        writer.active.flush(true)?;
        Ok(())
    }

    /// Returns and resets the "dirty since last flush" flag.
    pub fn test_and_clear_something_written(&self) -> bool {
        let mut writer = self.writer.lock();
        std::mem::take(&mut writer.something_written)
    }

    /// Installs the collaborator set; until then the garbage collector
    /// skips every cycle.
    pub fn set_collaborators(&self, collaborators: Collaborators) {
        *self.collaborators.write() = Some(collaborators);
    }

    /// Runs one garbage collection cycle synchronously.
    ///
    /// Returns `None` when the cycle was skipped (collaborators missing,
    /// coordination service not ready, or nothing scanned yet). The
    /// background thread runs the same cycle on its own interval.
    pub fn collect_garbage(&self) -> Option<GcStats> {
        self.gc_context.run_cycle()
    }

    /// Returns the ID of the segment currently open for appends.
    #[must_use]
    pub fn active_segment_id(&self) -> SegmentId {
        self.writer.lock().active_id
    }

    /// Returns the scanned segment IDs, in ascending order.
    ///
    /// The active segment is absent until it rolls.
    #[must_use]
    pub fn indexed_segments(&self) -> Vec<SegmentId> {
        self.map.segment_ids()
    }

    /// Returns a snapshot of the ledgers known to appear in a segment.
    #[must_use]
    pub fn ledgers_in(&self, segment_id: SegmentId) -> Option<HashSet<LedgerId>> {
        self.map.ledgers(segment_id)
    }

    /// Stops the garbage collector and flushes the active segment.
    ///
    /// Flush errors during shutdown are logged and swallowed.
    pub fn shutdown(&self) {
        if let Some(gc) = self.gc.lock().take() {
            gc.stop();
        }
        let writer = self.writer.lock();
        if let Err(err) = writer.active.flush(true) {
            error!(%err, "failed to flush active segment during shutdown");
        }
    }

    /// Seals the active segment and switches appends to a fresh one.
    fn roll(&self, writer: &mut Writer) -> CoreResult<()> {
        writer.active.flush(true)?;
        let next = writer.active_id.next();
        writer.active = create_segment(&self.dirs, &self.registry, &self.map, next)?;
        writer.active_id = next;
        Ok(())
    }
}

/// Creates the segment file for `segment_id`, registers its channel, and
/// folds any not-yet-scanned sealed segments into the index.
fn create_segment(
    dirs: &LedgerDirs,
    registry: &SegmentRegistry,
    map: &SegmentLedgerMap,
    segment_id: SegmentId,
) -> CoreResult<Arc<BufferedChannel>> {
    let path = dirs.pick().join(segment_id.filename());
    let channel = Arc::new(BufferedChannel::create(&path, WRITE_BUFFER_SIZE)?);
    channel.write(&segment_header())?;
    registry.insert(segment_id, Arc::clone(&channel));
    dirs.record_last_id(segment_id)?;
    scan::extract_ledgers(registry, map, segment_id)?;
    Ok(channel)
}

impl std::fmt::Debug for EntryLogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryLogStore")
            .field("entry_log_size_limit", &self.entry_log_size_limit)
            .field("active_segment_id", &self.active_segment_id())
            .field("indexed_segments", &self.map.segment_ids().len())
            .finish_non_exhaustive()
    }
}
