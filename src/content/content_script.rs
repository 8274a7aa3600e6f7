use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::completion::client::CompletionBackend;
use crate::content::messages::{ContentMessage, CountResponse, UiMessage};
use crate::content::notice::{Notice, NoticeKind};
use crate::dom::dom_model::{Document, EventKind, EventTarget, NodeId};
use crate::overlay::overlay_manager::{DEFAULT_REPOSITION_DELAY_MS, OverlayManager};
use crate::overlay::registry::TrackId;
use crate::render::stream_renderer::{RenderError, render};
use crate::selector_mode::controller::{SelectionOutcome, SelectorModeController, SelectorModeState};
use crate::settings::cache::SettingsCache;
use crate::settings::domain_selectors::{add_selector, prune_selectors};
use crate::settings::error::StoreError;
use crate::settings::settings_model::SelectorRecord;
use crate::settings::store::SettingsStore;
use crate::trace::logger::TraceLogger;
use crate::trace::trace::{SessionOutcome, TraceEvent};
use crate::watcher::mutation_watcher::{DEFAULT_RECONCILE_DELAY_MS, MutationWatcher};

pub const CONFIG_NOTICE: &str = "Please configure your API key and model in the extension popup.";

// ============================================================================
// Configuration & results
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ContentConfig {
    pub reposition_delay_ms: u64,
    /// Clamped to 200..=500 by the watcher
    pub reconcile_delay_ms: u64,
    pub prune_stale_selectors: bool,
    /// Consecutive reconciliation misses before a record is pruned
    pub stale_after_passes: u32,
}

impl Default for ContentConfig {
    fn default() -> Self {
        ContentConfig {
            reposition_delay_ms: DEFAULT_REPOSITION_DELAY_MS,
            reconcile_delay_ms: DEFAULT_RECONCILE_DELAY_MS,
            prune_stale_selectors: true,
            stale_after_passes: 5,
        }
    }
}

/// Page events the host forwards to the content script.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageEvent {
    Scroll,
    Resize,
    MouseOver(NodeId),
    MouseOut(NodeId),
    /// Click target; `None` when the click landed outside any element
    Click(Option<NodeId>),
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Ignored,
    RepositionScheduled,
    Hover,
    Selection(SelectionOutcome),
    Session(Result<String, SessionError>),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub removed: usize,
    pub attached: usize,
    pub missing: usize,
    pub pruned: usize,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no control is registered as {0}")]
    UnknownControl(TrackId),

    #[error("{0} is still streaming a reply")]
    Busy(TrackId),

    #[error("the element behind {0} is no longer on the page")]
    Detached(TrackId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

// ============================================================================
// Content script
// ============================================================================

/// Page-side orchestration: ties settings, overlays, the mutation watcher,
/// selector mode and completion sessions to one document.
pub struct ContentScript {
    store: Rc<dyn SettingsStore>,
    cache: SettingsCache,
    backend: Box<dyn CompletionBackend>,
    overlays: OverlayManager,
    watcher: MutationWatcher,
    selector_mode: SelectorModeController,
    config: ContentConfig,
    misses: HashMap<(String, String), u32>,
    notices: Vec<Notice>,
    outbox: Vec<UiMessage>,
    tracer: TraceLogger,
    sessions: u64,
}

impl ContentScript {
    pub fn new(store: Rc<dyn SettingsStore>, backend: Box<dyn CompletionBackend>, config: ContentConfig) -> Self {
        ContentScript {
            cache: SettingsCache::new(Rc::clone(&store)),
            store,
            backend,
            overlays: OverlayManager::new(config.reposition_delay_ms),
            watcher: MutationWatcher::new(config.reconcile_delay_ms),
            selector_mode: SelectorModeController::new(),
            config,
            misses: HashMap::new(),
            notices: Vec::new(),
            outbox: Vec::new(),
            tracer: TraceLogger::disabled(),
            sessions: 0,
        }
    }

    pub fn with_tracer(mut self, tracer: TraceLogger) -> Self {
        self.tracer = tracer;
        self
    }

    // ---- accessors ----

    pub fn overlays(&self) -> &OverlayManager {
        &self.overlays
    }

    pub fn watcher(&self) -> &MutationWatcher {
        &self.watcher
    }

    pub fn selector_state(&self) -> SelectorModeState {
        self.selector_mode.state()
    }

    pub fn settings_cache(&self) -> &SettingsCache {
        &self.cache
    }

    pub fn sessions_started(&self) -> u64 {
        self.sessions
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn take_outbox(&mut self) -> Vec<UiMessage> {
        std::mem::take(&mut self.outbox)
    }

    // ---- lifecycle ----

    /// Initial run: attach controls for this page's records and start observing.
    pub fn init(&mut self, doc: &mut Document) -> ReconcileReport {
        self.watcher.start();
        let report = self.reconcile(doc);
        info!(url = doc.url(), controls = self.overlays.len(), "content script ready");
        report
    }

    /// Deliver the pending observer batch.
    pub fn on_mutations(&mut self, doc: &mut Document, now_ms: u64) -> bool {
        let records = doc.take_mutations();
        let scheduled = self.watcher.observe(doc, &self.overlays, &records, now_ms);
        self.overlays.forget_retired();
        scheduled
    }

    /// Timer callback: run whichever debounced work is due.
    pub fn tick(&mut self, doc: &mut Document, now_ms: u64) {
        if self.watcher.take_due(now_ms) {
            self.reconcile(doc);
        }
        self.overlays.tick(doc, now_ms);
    }

    /// Drop controls of detached elements, then attach controls for every
    /// persisted record of this page that resolves to an untracked element.
    pub fn reconcile(&mut self, doc: &mut Document) -> ReconcileReport {
        let mut report = ReconcileReport {
            removed: self.overlays.sweep_detached(doc).len(),
            ..Default::default()
        };

        let settings = match self.cache.get() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "settings unavailable, skipping reconciliation");
                return report;
            }
        };
        let page_url = doc.url().to_string();
        if settings.is_ignored(&page_url) {
            debug!(url = %page_url, "page is on the ignore list");
            return report;
        }
        let Some(domain) = doc.domain() else {
            return report;
        };

        let mut stale: Vec<SelectorRecord> = Vec::new();
        for record in settings.selectors_for_page(&domain, &page_url) {
            let found = match doc.query_selector(&record.selector) {
                Ok(found) => found,
                Err(e) => {
                    debug!(selector = %record.selector, error = %e, "unparseable stored selector");
                    None
                }
            };

            let Some(node) = found else {
                report.missing += 1;
                self.note_miss(record, &page_url, &mut stale);
                continue;
            };
            self.misses.remove(&miss_key(record));
            if self.overlays.is_tracked(node) {
                continue;
            }
            match self.overlays.ensure_control(doc, node, true, record.custom_prompt.clone()) {
                Ok(_) => report.attached += 1,
                Err(e) => debug!(selector = %record.selector, error = %e, "selector matched an element that cannot be tracked"),
            }
        }

        self.overlays.reposition_all(doc);

        if !stale.is_empty() {
            match prune_selectors(self.store.as_ref(), &domain, &stale) {
                Ok(n) => {
                    report.pruned = n;
                    info!(domain = %domain, pruned = n, "pruned stale selectors");
                }
                Err(e) => warn!(error = %e, "could not prune stale selectors"),
            }
        }

        report
    }

    /// Only records bound to this exact page can go stale here; domain-wide
    /// records may still match on other pages of the domain.
    fn note_miss(&mut self, record: &SelectorRecord, page_url: &str, stale: &mut Vec<SelectorRecord>) {
        if record.url.is_empty() || record.url != page_url {
            debug!(selector = %record.selector, "domain-wide selector matched nothing on this page");
            return;
        }
        let key = miss_key(record);
        let count = self.misses.entry(key.clone()).or_insert(0);
        *count += 1;
        debug!(selector = %record.selector, misses = *count, "stored selector matched nothing");

        if self.config.prune_stale_selectors && *count >= self.config.stale_after_passes {
            self.misses.remove(&key);
            stale.push(record.clone());
        }
    }

    // ---- messaging ----

    pub fn handle_message(&mut self, doc: &mut Document, message: ContentMessage) -> Option<CountResponse> {
        match message {
            ContentMessage::EnableSelector => {
                self.selector_mode.enable(doc);
                None
            }
            ContentMessage::DisableSelector => {
                if self.selector_mode.disable(doc).is_some() {
                    self.outbox.push(UiMessage::UpdateToggleButton { active: false });
                }
                None
            }
            ContentMessage::RefreshSelectors => {
                self.cache.invalidate();
                self.overlays.remove_all(doc);
                self.reconcile(doc);
                None
            }
            ContentMessage::GetCount => Some(CountResponse {
                count: self.overlays.len(),
            }),
        }
    }

    // ---- events ----

    pub fn dispatch(&mut self, doc: &mut Document, event: PageEvent, now_ms: u64) -> DispatchOutcome {
        match event {
            PageEvent::Scroll | PageEvent::Resize => {
                let kind = if event == PageEvent::Scroll {
                    EventKind::Scroll
                } else {
                    EventKind::Resize
                };
                if !self.overlays.listens_to(doc, kind) {
                    return DispatchOutcome::Ignored;
                }
                self.overlays.request_reposition(now_ms);
                DispatchOutcome::RepositionScheduled
            }
            PageEvent::MouseOver(target) => {
                if !self.selector_listens(doc, EventKind::MouseOver) {
                    return DispatchOutcome::Ignored;
                }
                let tracked = self.overlays.is_tracked(target);
                self.selector_mode.hover(doc, target, tracked);
                DispatchOutcome::Hover
            }
            PageEvent::MouseOut(target) => {
                if !self.selector_listens(doc, EventKind::MouseOut) {
                    return DispatchOutcome::Ignored;
                }
                self.selector_mode.hover_out(doc, target);
                DispatchOutcome::Hover
            }
            PageEvent::Click(target) => {
                // Capturing listener: selector mode sees the click before the page does
                if self.selector_listens(doc, EventKind::Click) {
                    let tracked = target.is_some_and(|t| self.overlays.is_tracked(t));
                    if let Some(outcome) = self.selector_mode.click(doc, target, tracked) {
                        self.finish_selection(doc, &outcome);
                        return DispatchOutcome::Selection(outcome);
                    }
                }
                let Some(target) = target else {
                    return DispatchOutcome::Ignored;
                };
                match self.overlays.control_for_event(doc, target) {
                    Some(id) => DispatchOutcome::Session(self.activate(doc, id)),
                    None => DispatchOutcome::Ignored,
                }
            }
        }
    }

    fn selector_listens(&self, doc: &Document, kind: EventKind) -> bool {
        doc.listeners_for(EventTarget::Document, kind)
            .into_iter()
            .any(|l| self.selector_mode.owns_listener(l))
    }

    fn finish_selection(&mut self, doc: &mut Document, outcome: &SelectionOutcome) {
        match outcome {
            SelectionOutcome::Registered { element, selector } => {
                self.register_selection(doc, *element, selector);
            }
            SelectionOutcome::Rejected { notice, .. } => {
                self.notices.push(Notice::new(NoticeKind::Rejected, notice.clone()));
            }
            SelectionOutcome::Cancelled => {}
        }
        self.outbox.push(UiMessage::UpdateToggleButton { active: false });
    }

    fn register_selection(&mut self, doc: &mut Document, element: NodeId, selector: &str) {
        let Some(domain) = doc.domain() else {
            self.notices.push(Notice::new(
                NoticeKind::Storage,
                "Selectors can only be saved on pages with a domain.",
            ));
            return;
        };

        let record = SelectorRecord::new(selector, doc.url());
        match add_selector(self.store.as_ref(), &domain, record) {
            Ok(added) => {
                info!(domain = %domain, selector, added, "selector registered");
                self.outbox.push(UiMessage::RefreshPopup);
            }
            Err(e) => {
                warn!(error = %e, "could not save selector");
                self.notices.push(Notice::new(NoticeKind::Storage, format!("Could not save selector: {}", e)));
            }
        }

        if let Err(e) = self.overlays.ensure_control(doc, element, true, None) {
            warn!(selector, error = %e, "could not attach control to selected element");
        }
    }

    // ---- completion sessions ----

    /// Run one completion for the element behind control `id` and stream the
    /// reply into it. The control shows as busy for the whole session.
    pub fn activate(&mut self, doc: &mut Document, id: TrackId) -> Result<String, SessionError> {
        let (busy, attached) = match self.overlays.registry().get(id) {
            None => return Err(SessionError::UnknownControl(id)),
            Some(entry) => (entry.busy, doc.is_attached(entry.element)),
        };
        if busy {
            return Err(SessionError::Busy(id));
        }
        if !attached {
            debug!(track_id = %id, "element left the page before activation");
            self.overlays.teardown(doc, id);
            return Err(SessionError::Detached(id));
        }

        let settings = match self.cache.get() {
            Ok(s) => s,
            Err(e) => {
                self.notices.push(Notice::new(NoticeKind::Storage, format!("Could not read settings: {}", e)));
                return Err(e.into());
            }
        };

        self.sessions += 1;
        let session = self.sessions;
        let mut fragments = 0usize;
        self.overlays.set_busy(doc, id, true);

        let (original, result) = {
            let Some(entry) = self.overlays.registry().get(id) else {
                return Err(SessionError::UnknownControl(id));
            };
            let carrier = entry.carrier.as_ref();
            let original = carrier.read(doc);
            let prompt = settings.compose_prompt(entry.custom_prompt.as_deref(), &original);

            let result = match self.backend.stream_completion(&settings.api_key, &settings.model, &prompt) {
                Ok(stream) => {
                    let counted = stream.inspect(|f| {
                        if matches!(f, Ok(text) if !text.is_empty()) {
                            fragments += 1;
                        }
                    });
                    render(counted, doc, carrier)
                }
                Err(e) => Err(e.into()),
            };
            (original, result)
        };

        self.overlays.set_busy(doc, id, false);

        let event = match &result {
            Ok(reply) => {
                info!(track_id = %id, session, fragments, "completion streamed");
                TraceEvent::now(session, id, doc.url(), SessionOutcome::Completed)
                    .with_reply(fragments, reply)
            }
            Err(RenderError::Completion(e)) if e.is_config() => {
                self.notices.push(Notice::new(NoticeKind::Config, CONFIG_NOTICE));
                TraceEvent::now(session, id, doc.url(), SessionOutcome::Refused).with_error(e)
            }
            Err(e) => {
                warn!(track_id = %id, session, error = %e, "completion failed, original text restored");
                self.notices.push(Notice::new(
                    NoticeKind::Transport,
                    format!("Error making API request: {}", e),
                ));
                TraceEvent::now(session, id, doc.url(), SessionOutcome::RolledBack)
                    .with_original(&original)
                    .with_error(e)
            }
        };
        self.tracer.log(&event);

        result.map_err(SessionError::from)
    }
}

fn miss_key(record: &SelectorRecord) -> (String, String) {
    (record.selector.clone(), record.url.clone())
}
