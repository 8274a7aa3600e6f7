use std::collections::HashSet;

use tracing::{debug, warn};

use crate::dom::dom_model::{Document, EventKind, EventTarget, NodeId};
use crate::dom::error::DomError;
use crate::dom::text_carrier::carrier_for;
use crate::overlay::registry::{OverlayRegistry, TrackId, TrackedElement};
use crate::schedule::debounce::Debounce;

/// Marks injected controls; value is the owning element's track id.
pub const CONTROL_ATTR: &str = "data-page-assist-control";
/// Back-reference written onto the tracked element.
pub const TRACK_ATTR: &str = "data-page-assist-id";
/// Present on elements registered through a persisted selector.
pub const MANUAL_ATTR: &str = "data-page-assist-manual";

pub const CONTROL_GLYPH: &str = "🗿";
pub const BUSY_GLYPH: &str = "⏳";

/// Control is inset this many pixels from the element's bottom-right corner.
pub const CONTROL_INSET: f64 = 30.0;
pub const DEFAULT_REPOSITION_DELAY_MS: u64 = 100;

const CONTROL_STYLE: [(&str, &str); 13] = [
    ("position", "absolute"),
    ("background", "white"),
    ("border", "solid 1px lightgrey"),
    ("width", "32px"),
    ("height", "32px"),
    ("border-radius", "50%"),
    ("display", "flex"),
    ("align-items", "center"),
    ("justify-content", "center"),
    ("cursor", "pointer"),
    ("font-size", "12px"),
    ("z-index", "10000"),
    ("box-shadow", "0 2px 4px rgba(0,0,0,0.2)"),
];

/// Creates, positions and tears down one floating control per tracked element.
#[derive(Debug)]
pub struct OverlayManager {
    registry: OverlayRegistry,
    reposition: Debounce,
    /// Controls removed since the last mutation batch was filtered
    retired_controls: HashSet<NodeId>,
}

impl OverlayManager {
    pub fn new(reposition_delay_ms: u64) -> Self {
        OverlayManager {
            registry: OverlayRegistry::new(),
            reposition: Debounce::new(reposition_delay_ms),
            retired_controls: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &OverlayRegistry {
        &self.registry
    }

    pub fn is_tracked(&self, element: NodeId) -> bool {
        self.registry.is_tracked(element)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Track `element` and give it a control. Idempotent: an element that is
    /// already tracked keeps its id and no second control is created.
    pub fn ensure_control(
        &mut self,
        doc: &mut Document,
        element: NodeId,
        manual: bool,
        custom_prompt: Option<String>,
    ) -> Result<TrackId, DomError> {
        if let Some(id) = self.registry.id_for_element(element) {
            return Ok(id);
        }
        if !doc.is_attached(element) {
            return Err(DomError::NodeGone(element));
        }
        let carrier = carrier_for(doc, element)?;

        let id = self.registry.allocate_id();
        let control = doc.create_element("button");
        doc.set_attribute(control, CONTROL_ATTR, &id.to_string())?;
        doc.set_attribute(control, "type", "button")?;
        doc.set_text_content(control, CONTROL_GLYPH)?;
        for (property, value) in CONTROL_STYLE {
            doc.set_style(control, property, value)?;
        }
        doc.set_attribute(element, TRACK_ATTR, &id.to_string())?;
        if manual {
            doc.set_attribute(element, MANUAL_ATTR, "true")?;
        }
        doc.append_child(doc.body(), control)?;
        position_control(doc, element, control)?;

        let listeners = vec![
            doc.add_event_listener(EventTarget::Window, EventKind::Scroll, false),
            doc.add_event_listener(EventTarget::Window, EventKind::Resize, false),
            doc.add_event_listener(EventTarget::Node(control), EventKind::Click, false),
        ];

        self.registry.insert(TrackedElement {
            id,
            element,
            control,
            manual,
            custom_prompt,
            carrier,
            listeners,
            busy: false,
        });
        debug!(track_id = %id, manual, "control attached");
        Ok(id)
    }

    // ---- positioning ----

    /// Scroll/resize signal; applied on the trailing edge by `tick`.
    pub fn request_reposition(&mut self, now_ms: u64) {
        self.reposition.schedule(now_ms);
    }

    pub fn reposition_pending(&self) -> bool {
        self.reposition.is_pending()
    }

    /// Run the debounced reposition if due; returns whether it ran.
    pub fn tick(&mut self, doc: &mut Document, now_ms: u64) -> bool {
        if !self.reposition.fire_if_due(now_ms) {
            return false;
        }
        self.reposition_all(doc);
        true
    }

    pub fn reposition_all(&self, doc: &mut Document) {
        for entry in self.registry.iter() {
            if !doc.is_attached(entry.element) {
                continue;
            }
            if let Err(e) = position_control(doc, entry.element, entry.control) {
                debug!(track_id = %entry.id, error = %e, "skipping reposition");
            }
        }
    }

    // ---- teardown ----

    /// Liveness pass: tear down every entry whose element left the document.
    pub fn sweep_detached(&mut self, doc: &mut Document) -> Vec<TrackId> {
        let gone: Vec<TrackId> = self
            .registry
            .iter()
            .filter(|entry| !doc.is_attached(entry.element))
            .map(|entry| entry.id)
            .collect();

        for id in &gone {
            self.teardown(doc, *id);
        }
        if !gone.is_empty() {
            debug!(count = gone.len(), "removed controls of detached elements");
        }
        gone
    }

    /// Remove one control, its listeners and the element's tracking attributes.
    pub fn teardown(&mut self, doc: &mut Document, id: TrackId) -> Option<TrackedElement> {
        let entry = self.registry.remove(id)?;

        for listener in &entry.listeners {
            doc.remove_event_listener(*listener);
        }
        if doc.contains(entry.control) {
            self.retired_controls.insert(entry.control);
            if let Err(e) = doc.remove(entry.control) {
                warn!(track_id = %id, error = %e, "failed to remove control");
            }
        }
        doc.remove_attribute(entry.element, TRACK_ATTR);
        doc.remove_attribute(entry.element, MANUAL_ATTR);
        Some(entry)
    }

    /// Strip every control and tracking attribute; returns how many were removed.
    pub fn remove_all(&mut self, doc: &mut Document) -> usize {
        let ids = self.registry.ids();
        for id in &ids {
            self.teardown(doc, *id);
        }
        self.reposition.cancel();
        ids.len()
    }

    // ---- ownership queries used by mutation filtering and event dispatch ----

    /// True if `node` is, or sits inside, a control this manager created.
    pub fn owns_node(&self, doc: &Document, node: NodeId) -> bool {
        if self.registry.is_control(node) || self.retired_controls.contains(&node) {
            return true;
        }
        let mut current = doc.parent(node);
        while let Some(id) = current {
            if self.registry.is_control(id) {
                return true;
            }
            current = doc.parent(id);
        }
        doc.has_attribute(node, CONTROL_ATTR)
    }

    pub fn forget_retired(&mut self) {
        self.retired_controls.clear();
    }

    pub fn control_for_event(&self, doc: &Document, target: NodeId) -> Option<TrackId> {
        let mut current = Some(target);
        while let Some(node) = current {
            for listener in doc.listeners_for(EventTarget::Node(node), EventKind::Click) {
                if let Some(id) = self.registry.id_for_listener(listener) {
                    return Some(id);
                }
            }
            current = doc.parent(node);
        }
        None
    }

    pub fn listens_to(&self, doc: &Document, kind: EventKind) -> bool {
        doc.listeners_for(EventTarget::Window, kind)
            .into_iter()
            .any(|l| self.registry.id_for_listener(l).is_some())
    }

    // ---- session rendering state ----

    pub fn set_busy(&mut self, doc: &mut Document, id: TrackId, busy: bool) {
        let Some(entry) = self.registry.get_mut(id) else {
            return;
        };
        entry.busy = busy;
        let control = entry.control;
        let (glyph, cursor, opacity) = if busy {
            (BUSY_GLYPH, "wait", "0.6")
        } else {
            (CONTROL_GLYPH, "pointer", "1")
        };

        let applied = doc
            .set_text_content(control, glyph)
            .and_then(|_| doc.set_style(control, "cursor", cursor))
            .and_then(|_| doc.set_style(control, "opacity", opacity))
            .and_then(|_| {
                if busy {
                    doc.set_attribute(control, "disabled", "")
                } else {
                    doc.remove_attribute(control, "disabled");
                    Ok(())
                }
            });
        if let Err(e) = applied {
            debug!(track_id = %id, error = %e, "control gone while updating busy state");
        }
    }

    pub fn is_busy(&self, id: TrackId) -> bool {
        self.registry.get(id).is_some_and(|e| e.busy)
    }
}

impl Default for OverlayManager {
    fn default() -> Self {
        OverlayManager::new(DEFAULT_REPOSITION_DELAY_MS)
    }
}

/// Pin the control to the element's bottom-right corner, in document coordinates.
pub fn position_control(doc: &mut Document, element: NodeId, control: NodeId) -> Result<(), DomError> {
    let rect = doc
        .bounding_client_rect(element)
        .ok_or(DomError::NodeGone(element))?;
    let (scroll_x, scroll_y) = doc.scroll_offset();

    let top = rect.bottom() - CONTROL_INSET + scroll_y;
    let left = rect.right() - CONTROL_INSET + scroll_x;
    doc.set_style(control, "top", &format!("{}px", top))?;
    doc.set_style(control, "left", &format!("{}px", left))?;
    Ok(())
}
