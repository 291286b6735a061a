//! Recovery scanner: rebuilds the segment to ledger-set index.

use crate::error::{CoreError, CoreResult};
use crate::log::ledger_map::SegmentLedgerMap;
use crate::log::registry::SegmentRegistry;
use crate::log::{MAX_SANE_ENTRY_SIZE, SEGMENT_HEADER_SIZE};
use crate::types::{LedgerId, SegmentId};
use ledgerlog_storage::BufferedChannel;
use std::collections::HashSet;
use tracing::{error, info, warn};

/// Folds every sealed segment below `active` into the index.
///
/// Runs at startup and after each rollover. Segments already installed
/// are skipped, as is the active segment itself - it is picked up on the
/// scan that follows its own rollover. A segment whose file is gone was
/// garbage collected; it is skipped with a warning.
pub fn extract_ledgers(
    registry: &SegmentRegistry,
    map: &SegmentLedgerMap,
    active: SegmentId,
) -> CoreResult<()> {
    for id in 0..active.as_u64() {
        let segment_id = SegmentId::new(id);
        if map.contains(segment_id) {
            continue;
        }
        info!(%segment_id, "extracting ledgers from segment");
        let Some(channel) = registry.channel_for(segment_id)? else {
            warn!(%segment_id, "segment file not found in any ledger directory");
            continue;
        };
        map.install(segment_id, scan_segment(segment_id, &channel));
    }
    Ok(())
}

/// Collects the ledger IDs appearing in one segment.
///
/// An I/O error or torn frame mid-scan stops the walk; whatever was
/// collected up to that point is still the answer, since the final frame
/// of a crashed writer may legitimately be incomplete.
pub fn scan_segment(segment_id: SegmentId, channel: &BufferedChannel) -> HashSet<LedgerId> {
    let mut ledgers = HashSet::new();
    if let Err(err) = walk_frames(segment_id, channel, &mut ledgers) {
        info!(%segment_id, %err, "stopped scanning segment early");
    }
    ledgers
}

fn walk_frames(
    segment_id: SegmentId,
    channel: &BufferedChannel,
    ledgers: &mut HashSet<LedgerId>,
) -> CoreResult<()> {
    let size = channel.size()?;
    let mut pos = SEGMENT_HEADER_SIZE;
    let mut len_buf = [0u8; 4];

    while pos < size {
        let got = channel.read_at(&mut len_buf, pos)?;
        if got != len_buf.len() {
            return Err(CoreError::ShortRead {
                segment_id,
                pos,
                wanted: len_buf.len(),
                got,
            });
        }
        pos += 4;

        let frame_len = u32::from_be_bytes(len_buf);
        if frame_len > MAX_SANE_ENTRY_SIZE {
            error!(%segment_id, pos, frame_len, "sanity check failed for frame length");
        }

        let mut frame = vec![0u8; frame_len as usize];
        let got = channel.read_at(&mut frame, pos)?;
        if got != frame.len() {
            return Err(CoreError::ShortRead {
                segment_id,
                pos,
                wanted: frame.len(),
                got,
            });
        }
        if frame.len() < 8 {
            return Err(CoreError::segment_corruption(format!(
                "frame of {} bytes at {pos} in {segment_id} cannot carry a ledger ID",
                frame.len()
            )));
        }
        let ledger = u64::from_be_bytes(
            frame[..8]
                .try_into()
                .map_err(|_| CoreError::segment_corruption("invalid ledger ID prefix"))?,
        );
        ledgers.insert(LedgerId::new(ledger));
        pos += u64::from(frame_len);
    }
    Ok(())
}
