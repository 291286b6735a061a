//! Registry of open segment channels.

use crate::dir::LedgerDirs;
use crate::error::CoreResult;
use crate::log::READ_BUFFER_SIZE;
use crate::types::SegmentId;
use ledgerlog_storage::BufferedChannel;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Concurrent map from segment ID to open channel.
///
/// The registry exclusively owns open channels. Lookups that miss open
/// the segment file on demand; double-checked insertion under the map
/// lock guarantees a single channel per segment even when readers race.
pub struct SegmentRegistry {
    dirs: Arc<LedgerDirs>,
    channels: Mutex<HashMap<SegmentId, Arc<BufferedChannel>>>,
}

impl SegmentRegistry {
    /// Creates an empty registry over the given directory set.
    #[must_use]
    pub fn new(dirs: Arc<LedgerDirs>) -> Self {
        Self {
            dirs,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the channel for a segment, opening it if necessary.
    ///
    /// Returns `Ok(None)` when no file for the segment exists in any
    /// storage directory - callers decide whether that is an error (a
    /// read) or expected (a scan racing the garbage collector).
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be opened.
    pub fn channel_for(&self, segment_id: SegmentId) -> CoreResult<Option<Arc<BufferedChannel>>> {
        if let Some(channel) = self.channels.lock().get(&segment_id) {
            return Ok(Some(Arc::clone(channel)));
        }

        let Some(path) = self.dirs.find_segment_file(segment_id) else {
            return Ok(None);
        };

        // Open outside the map lock; the logical position of a reopened
        // file starts at its size.
        let opened = Arc::new(BufferedChannel::open(&path, READ_BUFFER_SIZE)?);

        let mut channels = self.channels.lock();
        if let Some(existing) = channels.get(&segment_id) {
            // Lost the race; release the extra handle.
            let winner = Arc::clone(existing);
            drop(channels);
            let _ = opened.close();
            return Ok(Some(winner));
        }
        channels.insert(segment_id, Arc::clone(&opened));
        Ok(Some(opened))
    }

    /// Installs a channel the writer just created for a new segment.
    pub fn insert(&self, segment_id: SegmentId, channel: Arc<BufferedChannel>) {
        self.channels.lock().insert(segment_id, channel);
    }

    /// Evicts a segment's channel, returning it for the caller to close.
    pub fn remove(&self, segment_id: SegmentId) -> Option<Arc<BufferedChannel>> {
        self.channels.lock().remove(&segment_id)
    }

    /// Returns the number of open channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    /// Returns whether no channel is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.lock().is_empty()
    }
}

impl std::fmt::Debug for SegmentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentRegistry")
            .field("open_channels", &self.len())
            .finish_non_exhaustive()
    }
}
