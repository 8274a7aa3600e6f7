use tracing::debug;

use crate::dom::dom_model::{Document, EventKind, EventTarget, ListenerId, NodeId};
use crate::selector::selector_engine::generate_selector;

/// `input` types that carry free text and can receive a control.
pub const ELIGIBLE_INPUT_TYPES: [&str; 14] = [
    "text",
    "email",
    "password",
    "number",
    "tel",
    "url",
    "search",
    "color",
    "date",
    "time",
    "datetime-local",
    "week",
    "month",
    "datetime",
];

pub const ELIGIBLE_OUTLINE: &str = "2px solid #34a853";
pub const INELIGIBLE_OUTLINE: &str = "2px solid #ea4335";
pub const SELECTING_CURSOR: &str = "crosshair";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorModeState {
    Idle,
    Active,
}

/// How a selector-mode session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    /// Eligible element picked; caller persists the record and attaches a control
    Registered { element: NodeId, selector: String },
    /// Picked element cannot receive a control
    Rejected { element: NodeId, notice: String },
    /// Background click or explicit disable
    Cancelled,
}

/// Tag is `textarea`, or `input` of a text-like type (missing type means `text`).
pub fn is_eligible_tag(doc: &Document, node: NodeId) -> bool {
    match doc.tag(node) {
        Some("textarea") => true,
        Some("input") => {
            let input_type = doc
                .get_attribute(node, "type")
                .map(|t| t.trim().to_ascii_lowercase())
                .unwrap_or_else(|| "text".to_string());
            ELIGIBLE_INPUT_TYPES.contains(&input_type.as_str())
        }
        _ => false,
    }
}

pub fn is_eligible(doc: &Document, node: NodeId, already_tracked: bool) -> bool {
    !already_tracked && is_eligible_tag(doc, node)
}

#[derive(Debug)]
struct Highlight {
    node: NodeId,
    previous_outline: Option<String>,
}

/// Interactive "click an element to register it" mode.
///
/// Entering installs a crosshair cursor plus hover and capturing click
/// listeners; every exit path goes through `exit`, which restores the
/// cursor, clears the highlight and removes exactly those listeners.
#[derive(Debug)]
pub struct SelectorModeController {
    state: SelectorModeState,
    listeners: Vec<ListenerId>,
    highlight: Option<Highlight>,
    previous_cursor: Option<String>,
}

impl Default for SelectorModeController {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectorModeController {
    pub fn new() -> Self {
        SelectorModeController {
            state: SelectorModeState::Idle,
            listeners: Vec::new(),
            highlight: None,
            previous_cursor: None,
        }
    }

    pub fn state(&self) -> SelectorModeState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SelectorModeState::Active
    }

    pub fn owns_listener(&self, listener: ListenerId) -> bool {
        self.listeners.contains(&listener)
    }

    pub fn highlighted(&self) -> Option<NodeId> {
        self.highlight.as_ref().map(|h| h.node)
    }

    /// Idle -> Active. Returns false if already active.
    pub fn enable(&mut self, doc: &mut Document) -> bool {
        if self.is_active() {
            return false;
        }
        let body = doc.body();
        self.previous_cursor = doc.style(body, "cursor").map(str::to_string);
        if let Err(e) = doc.set_style(body, "cursor", SELECTING_CURSOR) {
            debug!(error = %e, "could not set selecting cursor");
        }

        self.listeners = vec![
            doc.add_event_listener(EventTarget::Document, EventKind::MouseOver, false),
            doc.add_event_listener(EventTarget::Document, EventKind::MouseOut, false),
            doc.add_event_listener(EventTarget::Document, EventKind::Click, true),
        ];
        self.state = SelectorModeState::Active;
        debug!("selector mode enabled");
        true
    }

    /// Active -> Idle without saving.
    pub fn disable(&mut self, doc: &mut Document) -> Option<SelectionOutcome> {
        if !self.is_active() {
            return None;
        }
        self.exit(doc);
        Some(SelectionOutcome::Cancelled)
    }

    pub fn hover(&mut self, doc: &mut Document, target: NodeId, already_tracked: bool) {
        if !self.is_active() || !doc.contains(target) {
            return;
        }
        if self.highlighted() == Some(target) {
            return;
        }
        self.clear_highlight(doc);
        if is_background(doc, target) {
            return;
        }

        let outline = if is_eligible(doc, target, already_tracked) {
            ELIGIBLE_OUTLINE
        } else {
            INELIGIBLE_OUTLINE
        };
        let previous_outline = doc.style(target, "outline").map(str::to_string);
        if doc.set_style(target, "outline", outline).is_ok() {
            self.highlight = Some(Highlight { node: target, previous_outline });
        }
    }

    pub fn hover_out(&mut self, doc: &mut Document, target: NodeId) {
        if self.highlighted() == Some(target) {
            self.clear_highlight(doc);
        }
    }

    /// Handle a click while active; `None` when the controller is idle.
    pub fn click(&mut self, doc: &mut Document, target: Option<NodeId>, already_tracked: bool) -> Option<SelectionOutcome> {
        if !self.is_active() {
            return None;
        }

        let outcome = match target.filter(|t| doc.contains(*t) && !is_background(doc, *t)) {
            None => SelectionOutcome::Cancelled,
            Some(node) if is_eligible(doc, node, already_tracked) => SelectionOutcome::Registered {
                element: node,
                selector: generate_selector(doc, node),
            },
            Some(node) => SelectionOutcome::Rejected {
                element: node,
                notice: rejection_notice(doc, node, already_tracked),
            },
        };

        self.exit(doc);
        Some(outcome)
    }

    fn clear_highlight(&mut self, doc: &mut Document) {
        let Some(highlight) = self.highlight.take() else {
            return;
        };
        match highlight.previous_outline {
            Some(previous) => {
                if let Err(e) = doc.set_style(highlight.node, "outline", &previous) {
                    debug!(error = %e, "highlighted element gone before its outline was restored");
                }
            }
            None => {
                doc.remove_style(highlight.node, "outline");
            }
        }
    }

    fn exit(&mut self, doc: &mut Document) {
        self.clear_highlight(doc);

        let body = doc.body();
        match self.previous_cursor.take() {
            Some(cursor) => {
                if let Err(e) = doc.set_style(body, "cursor", &cursor) {
                    debug!(error = %e, "could not restore page cursor");
                }
            }
            None => {
                doc.remove_style(body, "cursor");
            }
        }
        for listener in self.listeners.drain(..) {
            doc.remove_event_listener(listener);
        }
        self.state = SelectorModeState::Idle;
        debug!("selector mode disabled");
    }
}

fn is_background(doc: &Document, node: NodeId) -> bool {
    node == doc.body() || node == doc.root()
}

fn rejection_notice(doc: &Document, node: NodeId, already_tracked: bool) -> String {
    if already_tracked {
        return "This field already has an assistant button.".to_string();
    }
    match doc.tag(node) {
        Some("input") => format!(
            "Inputs of type \"{}\" are not supported. Please select a text field or textarea.",
            doc.get_attribute(node, "type").unwrap_or("text")
        ),
        Some(tag) => format!(
            "<{}> elements are not supported. Please select a text field or textarea.",
            tag
        ),
        None => "Please select a text field or textarea.".to_string(),
    }
}
