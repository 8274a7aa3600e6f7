use page_assist::overlay::overlay_manager::OverlayManager;
use page_assist::watcher::mutation_watcher::{
    DEFAULT_RECONCILE_DELAY_MS, MAX_RECONCILE_DELAY_MS, MIN_RECONCILE_DELAY_MS, MutationWatcher,
};

mod common;

use crate::common::utils::{element, page, textarea};

#[test]
fn delay_is_clamped_to_the_supported_window() {
    assert_eq!(MutationWatcher::default().delay_ms(), DEFAULT_RECONCILE_DELAY_MS);
    assert_eq!(MutationWatcher::new(10).delay_ms(), MIN_RECONCILE_DELAY_MS);
    assert_eq!(MutationWatcher::new(10_000).delay_ms(), MAX_RECONCILE_DELAY_MS);
}

#[test]
fn nothing_is_scheduled_before_start_or_after_stop() {
    let mut doc = page();
    let overlays = OverlayManager::default();
    let mut watcher = MutationWatcher::default();
    textarea(&mut doc, "a");

    let records = doc.take_mutations();
    assert!(!watcher.observe(&doc, &overlays, &records, 0));

    watcher.start();
    assert!(watcher.observe(&doc, &overlays, &records, 0));
    watcher.stop();
    assert!(!watcher.is_pending());
    assert!(!watcher.take_due(1_000));
}

#[test]
fn bursts_collapse_into_one_pass() {
    let mut doc = page();
    let overlays = OverlayManager::default();
    let mut watcher = MutationWatcher::new(300);
    watcher.start();
    let body = doc.body();

    for (i, now) in [0u64, 100, 250].into_iter().enumerate() {
        let index = i.to_string();
        element(&mut doc, body, "p", &[("data-i", index.as_str())]);
        let records = doc.take_mutations();
        assert!(watcher.observe(&doc, &overlays, &records, now));
    }

    assert!(!watcher.take_due(500));
    assert!(watcher.take_due(550));
    assert!(!watcher.take_due(2_000), "one pass per burst");
    assert_eq!(watcher.batches_seen(), 3);
}

#[test]
fn overlay_insertions_and_removals_do_not_retrigger() {
    let mut doc = page();
    let area = textarea(&mut doc, "a");
    let mut overlays = OverlayManager::default();
    let mut watcher = MutationWatcher::default();
    watcher.start();
    doc.take_mutations();

    let id = overlays.ensure_control(&mut doc, area, true, None).unwrap();
    overlays.set_busy(&mut doc, id, true);
    let records = doc.take_mutations();
    assert!(!records.is_empty());
    assert!(!watcher.observe(&doc, &overlays, &records, 0));

    overlays.remove_all(&mut doc);
    let records = doc.take_mutations();
    assert!(!watcher.observe(&doc, &overlays, &records, 10));
    overlays.forget_retired();

    assert!(!watcher.is_pending());
    assert_eq!(watcher.batches_ignored(), 2);
}

#[test]
fn mixed_batch_with_page_changes_is_relevant() {
    let mut doc = page();
    let area = textarea(&mut doc, "a");
    let mut overlays = OverlayManager::default();
    let mut watcher = MutationWatcher::default();
    watcher.start();
    doc.take_mutations();

    overlays.ensure_control(&mut doc, area, true, None).unwrap();
    let body = doc.body();
    element(&mut doc, body, "div", &[]);
    let records = doc.take_mutations();

    assert!(watcher.observe(&doc, &overlays, &records, 0));
}

#[test]
fn empty_batches_are_ignored() {
    let doc = page();
    let overlays = OverlayManager::default();
    let mut watcher = MutationWatcher::default();
    watcher.start();

    assert!(!watcher.observe(&doc, &overlays, &[], 0));
    assert_eq!(watcher.batches_seen(), 0);
}
