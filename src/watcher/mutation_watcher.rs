use tracing::trace;

use crate::dom::dom_model::{Document, MutationRecord};
use crate::overlay::overlay_manager::OverlayManager;
use crate::schedule::debounce::Debounce;

pub const DEFAULT_RECONCILE_DELAY_MS: u64 = 300;
pub const MIN_RECONCILE_DELAY_MS: u64 = 200;
pub const MAX_RECONCILE_DELAY_MS: u64 = 500;

/// Coalesces child-list mutation batches into debounced reconciliation passes.
///
/// Only structural changes are observed; attribute and style writes (which
/// the overlay manager performs constantly) never reach the watcher. Records
/// caused by the overlay's own control insertions and removals are dropped so
/// a reconciliation pass cannot re-trigger itself.
#[derive(Debug)]
pub struct MutationWatcher {
    debounce: Debounce,
    observing: bool,
    batches_seen: u64,
    batches_ignored: u64,
}

impl MutationWatcher {
    pub fn new(delay_ms: u64) -> Self {
        MutationWatcher {
            debounce: Debounce::new(delay_ms.clamp(MIN_RECONCILE_DELAY_MS, MAX_RECONCILE_DELAY_MS)),
            observing: false,
            batches_seen: 0,
            batches_ignored: 0,
        }
    }

    pub fn start(&mut self) {
        self.observing = true;
    }

    pub fn stop(&mut self) {
        self.observing = false;
        self.debounce.cancel();
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    pub fn delay_ms(&self) -> u64 {
        self.debounce.delay_ms()
    }

    pub fn is_pending(&self) -> bool {
        self.debounce.is_pending()
    }

    /// Feed one observer batch. Returns true when it (re)scheduled a pass.
    pub fn observe(
        &mut self,
        doc: &Document,
        overlays: &OverlayManager,
        records: &[MutationRecord],
        now_ms: u64,
    ) -> bool {
        if !self.observing || records.is_empty() {
            return false;
        }
        self.batches_seen += 1;

        let relevant = records
            .iter()
            .any(|record| !is_overlay_record(doc, overlays, record));
        if !relevant {
            self.batches_ignored += 1;
            trace!(records = records.len(), "ignoring overlay-only mutations");
            return false;
        }

        self.debounce.schedule(now_ms);
        true
    }

    /// Consume the pending pass if its window has elapsed.
    pub fn take_due(&mut self, now_ms: u64) -> bool {
        self.observing && self.debounce.fire_if_due(now_ms)
    }

    pub fn batches_seen(&self) -> u64 {
        self.batches_seen
    }

    pub fn batches_ignored(&self) -> u64 {
        self.batches_ignored
    }
}

impl Default for MutationWatcher {
    fn default() -> Self {
        MutationWatcher::new(DEFAULT_RECONCILE_DELAY_MS)
    }
}

/// A record belongs to the overlay when its target is (inside) a control, or
/// every node it added or removed is one.
fn is_overlay_record(doc: &Document, overlays: &OverlayManager, record: &MutationRecord) -> bool {
    if overlays.owns_node(doc, record.target) {
        return true;
    }
    let mut nodes = record.added.iter().chain(record.removed.iter()).peekable();
    if nodes.peek().is_none() {
        return false;
    }
    nodes.all(|node| overlays.owns_node(doc, *node))
}
