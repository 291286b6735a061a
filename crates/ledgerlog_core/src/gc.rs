//! Background garbage collection of dead ledgers and segments.
//!
//! The collector is a plain OS thread driven by a timer: it waits out the
//! configured interval (or a shutdown signal) and then runs one cycle.
//! A cycle first reclaims per-ledger index state for ledgers the
//! [`ActiveLedgerManager`](crate::ledgers::ActiveLedgerManager) reports
//! dead, then prunes dead ledgers from every scanned segment's ledger set
//! and deletes segments whose set has emptied. The active segment is
//! never in the index, so it is never a deletion candidate.

use crate::dir::LedgerDirs;
use crate::ledgers::Collaborators;
use crate::log::ledger_map::SegmentLedgerMap;
use crate::log::registry::SegmentRegistry;
use crate::types::SegmentId;
use parking_lot::RwLock;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Summary of one garbage collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcStats {
    /// Ledgers whose index state was reclaimed this cycle.
    pub ledgers_reclaimed: usize,
    /// Segments deleted this cycle.
    pub segments_deleted: usize,
}

/// Everything a garbage collection cycle needs a reference to.
///
/// The collector owns no state of its own beyond these shared handles,
/// so a cycle can equally be driven by the background thread or invoked
/// synchronously.
#[derive(Clone)]
pub(crate) struct GcContext {
    dirs: Arc<LedgerDirs>,
    registry: Arc<SegmentRegistry>,
    map: Arc<SegmentLedgerMap>,
    collaborators: Arc<RwLock<Option<Collaborators>>>,
}

impl GcContext {
    pub(crate) fn new(
        dirs: Arc<LedgerDirs>,
        registry: Arc<SegmentRegistry>,
        map: Arc<SegmentLedgerMap>,
        collaborators: Arc<RwLock<Option<Collaborators>>>,
    ) -> Self {
        Self {
            dirs,
            registry,
            map,
            collaborators,
        }
    }

    /// Runs one garbage collection cycle.
    ///
    /// Returns `None` when the cycle was skipped: collaborators are not
    /// installed yet, the coordination service is not ready, or nothing
    /// has been scanned into the index.
    pub(crate) fn run_cycle(&self) -> Option<GcStats> {
        let collaborators = self.collaborators.read().clone()?;
        if !collaborators.coordination.is_ready() || self.map.is_empty() {
            return None;
        }

        let stats = GcStats {
            ledgers_reclaimed: self.gc_ledgers(&collaborators),
            segments_deleted: self.gc_segments(&collaborators),
        };
        debug!(?stats, "garbage collection cycle finished");
        Some(stats)
    }

    /// Reclaims per-ledger index state for dead ledgers.
    fn gc_ledgers(&self, collaborators: &Collaborators) -> usize {
        let mut reclaimed = 0;
        let index = Arc::clone(&collaborators.ledger_index);
        collaborators
            .active_ledgers
            .garbage_collect_ledgers(&mut |ledger_id| match index.delete_ledger(ledger_id) {
                Ok(()) => reclaimed += 1,
                Err(err) => error!(%ledger_id, %err, "failed to delete ledger index state"),
            });
        reclaimed
    }

    /// Prunes dead ledgers from every segment's set and deletes segments
    /// whose set has emptied.
    fn gc_segments(&self, collaborators: &Collaborators) -> usize {
        let mut deleted = 0;
        for segment_id in self.map.segment_ids() {
            let remaining = self.map.retain_ledgers(segment_id, |ledger| {
                collaborators.active_ledgers.contains_active_ledger(ledger)
            });
            if remaining != Some(0) {
                continue;
            }
            if self.delete_segment(segment_id) {
                deleted += 1;
            }
        }
        deleted
    }

    /// Closes, unlinks, and unindexes one dead segment.
    fn delete_segment(&self, segment_id: SegmentId) -> bool {
        info!(%segment_id, "deleting segment with no active ledgers");

        // The handle must be released before the unlink; some hosts lock
        // open files.
        if let Some(channel) = self.registry.remove(segment_id) {
            if let Err(err) = channel.close() {
                warn!(%segment_id, %err, "failed to close collected segment's channel");
            }
        }

        let Some(path) = self.dirs.find_segment_file(segment_id) else {
            error!(%segment_id, "segment file slated for deletion was not found");
            return false;
        };
        if let Err(err) = fs::remove_file(&path) {
            warn!(%segment_id, %err, "failed to unlink collected segment");
            return false;
        }
        self.map.remove(segment_id);
        true
    }
}

impl std::fmt::Debug for GcContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcContext").finish_non_exhaustive()
    }
}

/// Handle to the background collector thread.
pub(crate) struct GarbageCollector {
    running: Arc<AtomicBool>,
    wakeup: Sender<()>,
    handle: JoinHandle<()>,
}

impl GarbageCollector {
    /// Spawns the collector thread.
    pub(crate) fn spawn(context: GcContext, interval: Duration) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let (wakeup, signal) = mpsc::channel();
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("entry-log-gc".into())
            .spawn(move || gc_loop(&context, &signal, &flag, interval))?;
        Ok(Self {
            running,
            wakeup,
            handle,
        })
    }

    /// Stops the collector and joins its thread.
    pub(crate) fn stop(self) {
        self.running.store(false, Ordering::Release);
        let _ = self.wakeup.send(());
        if self.handle.join().is_err() {
            error!("garbage collector thread panicked");
        }
    }
}

impl std::fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("running", &self.running.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

fn gc_loop(context: &GcContext, signal: &Receiver<()>, running: &AtomicBool, interval: Duration) {
    loop {
        match signal.recv_timeout(interval) {
            Ok(()) => {
                // A wakeup with the flag still set is spurious.
                if running.load(Ordering::Acquire) {
                    continue;
                }
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        if !running.load(Ordering::Acquire) {
            break;
        }
        context.run_cycle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, CoreResult};
    use crate::ledgers::{ActiveLedgerManager, CoordinationClient, LedgerIndex};
    use crate::types::LedgerId;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use tempfile::tempdir;

    struct StaticCoordination(bool);

    impl CoordinationClient for StaticCoordination {
        fn is_ready(&self) -> bool {
            self.0
        }
    }

    #[derive(Default)]
    struct RecordingIndex {
        deleted: Mutex<Vec<LedgerId>>,
        fail_for: Option<LedgerId>,
    }

    impl LedgerIndex for RecordingIndex {
        fn delete_ledger(&self, ledger_id: LedgerId) -> CoreResult<()> {
            if self.fail_for == Some(ledger_id) {
                return Err(CoreError::segment_corruption("injected failure"));
            }
            self.deleted.lock().push(ledger_id);
            Ok(())
        }
    }

    struct FixedLedgers {
        active: HashSet<LedgerId>,
        dead: Vec<LedgerId>,
    }

    impl FixedLedgers {
        fn new(active: &[u64], dead: &[u64]) -> Self {
            Self {
                active: active.iter().map(|&id| LedgerId::new(id)).collect(),
                dead: dead.iter().map(|&id| LedgerId::new(id)).collect(),
            }
        }
    }

    impl ActiveLedgerManager for FixedLedgers {
        fn garbage_collect_ledgers(&self, reclaim: &mut dyn FnMut(LedgerId)) {
            for &ledger in &self.dead {
                reclaim(ledger);
            }
        }

        fn contains_active_ledger(&self, ledger_id: LedgerId) -> bool {
            self.active.contains(&ledger_id)
        }
    }

    struct Fixture {
        _temp: tempfile::TempDir,
        context: GcContext,
        index: Arc<RecordingIndex>,
        dir: std::path::PathBuf,
    }

    fn fixture(active: &[u64], dead: &[u64], ready: bool) -> Fixture {
        let temp = tempdir().unwrap();
        let dir = temp.path().to_path_buf();
        let dirs = Arc::new(LedgerDirs::open(vec![dir.clone()]).unwrap());
        let registry = Arc::new(SegmentRegistry::new(Arc::clone(&dirs)));
        let map = Arc::new(SegmentLedgerMap::new());
        let index = Arc::new(RecordingIndex::default());

        let collaborators = Collaborators {
            coordination: Arc::new(StaticCoordination(ready)),
            ledger_index: Arc::clone(&index) as Arc<dyn LedgerIndex>,
            active_ledgers: Arc::new(FixedLedgers::new(active, dead)),
        };
        let slot = Arc::new(RwLock::new(Some(collaborators)));

        Fixture {
            context: GcContext::new(dirs, registry, map, slot),
            index,
            dir,
            _temp: temp,
        }
    }

    fn install_segment(fixture: &Fixture, segment: u64, ledgers: &[u64]) {
        std::fs::write(
            fixture.dir.join(SegmentId::new(segment).filename()),
            b"segment",
        )
        .unwrap();
        fixture.context.map.install(
            SegmentId::new(segment),
            ledgers.iter().map(|&id| LedgerId::new(id)).collect(),
        );
    }

    #[test]
    fn skips_without_collaborators() {
        let temp = tempdir().unwrap();
        let dirs = Arc::new(LedgerDirs::open(vec![temp.path().to_path_buf()]).unwrap());
        let registry = Arc::new(SegmentRegistry::new(Arc::clone(&dirs)));
        let map = Arc::new(SegmentLedgerMap::new());
        map.install(SegmentId::new(0), HashSet::new());

        let context = GcContext::new(dirs, registry, map, Arc::new(RwLock::new(None)));
        assert!(context.run_cycle().is_none());
    }

    #[test]
    fn skips_when_coordination_not_ready() {
        let fx = fixture(&[], &[1], false);
        install_segment(&fx, 0, &[1]);
        assert!(fx.context.run_cycle().is_none());
        assert!(fx.index.deleted.lock().is_empty());
    }

    #[test]
    fn skips_when_index_empty() {
        let fx = fixture(&[], &[1], true);
        assert!(fx.context.run_cycle().is_none());
    }

    #[test]
    fn reclaims_dead_ledgers() {
        let fx = fixture(&[1], &[7, 8], true);
        install_segment(&fx, 0, &[1]);

        let stats = fx.context.run_cycle().unwrap();
        assert_eq!(stats.ledgers_reclaimed, 2);
        assert_eq!(
            *fx.index.deleted.lock(),
            vec![LedgerId::new(7), LedgerId::new(8)]
        );
    }

    #[test]
    fn ledger_deletion_failure_skips_to_next() {
        let mut fx = fixture(&[1], &[7, 8], true);
        fx.index = Arc::new(RecordingIndex {
            deleted: Mutex::new(Vec::new()),
            fail_for: Some(LedgerId::new(7)),
        });
        let collaborators = Collaborators {
            coordination: Arc::new(StaticCoordination(true)),
            ledger_index: Arc::clone(&fx.index) as Arc<dyn LedgerIndex>,
            active_ledgers: Arc::new(FixedLedgers::new(&[1], &[7, 8])),
        };
        *fx.context.collaborators.write() = Some(collaborators);
        install_segment(&fx, 0, &[1]);

        let stats = fx.context.run_cycle().unwrap();
        assert_eq!(stats.ledgers_reclaimed, 1);
        assert_eq!(*fx.index.deleted.lock(), vec![LedgerId::new(8)]);
    }

    #[test]
    fn deletes_segment_with_no_active_ledgers() {
        let fx = fixture(&[], &[], true);
        install_segment(&fx, 0, &[99]);
        let path = fx.dir.join("0.log");
        assert!(path.exists());

        let stats = fx.context.run_cycle().unwrap();
        assert_eq!(stats.segments_deleted, 1);
        assert!(!path.exists());
        assert!(!fx.context.map.contains(SegmentId::new(0)));
    }

    #[test]
    fn keeps_segment_with_active_ledger() {
        let fx = fixture(&[5], &[], true);
        install_segment(&fx, 0, &[5, 99]);

        let stats = fx.context.run_cycle().unwrap();
        assert_eq!(stats.segments_deleted, 0);
        assert!(fx.dir.join("0.log").exists());
        // The dead ledger is pruned from the set even when the segment
        // survives.
        assert_eq!(
            fx.context.map.ledgers(SegmentId::new(0)),
            Some([LedgerId::new(5)].into())
        );
    }

    #[test]
    fn missing_file_keeps_index_entry() {
        let fx = fixture(&[], &[], true);
        fx.context
            .map
            .install(SegmentId::new(0), [LedgerId::new(1)].into());

        let stats = fx.context.run_cycle().unwrap();
        assert_eq!(stats.segments_deleted, 0);
        assert!(fx.context.map.contains(SegmentId::new(0)));
    }

    #[test]
    fn evicts_channel_before_unlink() {
        let fx = fixture(&[], &[], true);
        install_segment(&fx, 0, &[99]);
        fx.context
            .registry
            .channel_for(SegmentId::new(0))
            .unwrap()
            .unwrap();
        assert_eq!(fx.context.registry.len(), 1);

        fx.context.run_cycle().unwrap();
        assert!(fx.context.registry.is_empty());
    }

    #[test]
    fn collector_thread_stops_cleanly() {
        let fx = fixture(&[], &[], true);
        let collector =
            GarbageCollector::spawn(fx.context.clone(), Duration::from_millis(10)).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        collector.stop();
    }
}
