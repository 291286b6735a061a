//! Collaborator interfaces consumed by the store.
//!
//! The store needs to ask an external authority which ledgers are still
//! live, and to trigger per-ledger index cleanup when one dies. Those
//! collaborators may in turn need the store for reads, so they are
//! injected as trait objects after construction rather than owned: the
//! host owns both sides and there is no ownership cycle.

use crate::error::CoreResult;
use crate::types::LedgerId;
use std::sync::Arc;

/// Persistent per-ledger index, able to drop a ledger's index state.
pub trait LedgerIndex: Send + Sync {
    /// Deletes the index state for a ledger.
    ///
    /// Best-effort ledger-local cleanup, invoked by the garbage collector
    /// for each ledger the [`ActiveLedgerManager`] reports dead.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails; the collector logs the
    /// failure and moves on to the next ledger.
    fn delete_ledger(&self, ledger_id: LedgerId) -> CoreResult<()>;
}

/// External authority on ledger liveness.
pub trait ActiveLedgerManager: Send + Sync {
    /// Iterates ledgers no longer considered live, invoking `reclaim`
    /// for each.
    fn garbage_collect_ledgers(&self, reclaim: &mut dyn FnMut(LedgerId));

    /// Returns whether the ledger is still considered live.
    fn contains_active_ledger(&self, ledger_id: LedgerId) -> bool;
}

/// Coordination-service client whose readiness gates garbage collection.
pub trait CoordinationClient: Send + Sync {
    /// Returns whether the coordination service is connected and usable.
    fn is_ready(&self) -> bool;
}

/// The collaborator set installed on a store once the host has built it.
///
/// Until this is installed the garbage collector skips every cycle.
#[derive(Clone)]
pub struct Collaborators {
    /// Readiness gate for garbage collection.
    pub coordination: Arc<dyn CoordinationClient>,
    /// Per-ledger index cleanup target.
    pub ledger_index: Arc<dyn LedgerIndex>,
    /// Ledger liveness authority.
    pub active_ledgers: Arc<dyn ActiveLedgerManager>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
