use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::dom::dom_model::{ListenerId, NodeId};
use crate::dom::text_carrier::TextCarrier;

/// Process-unique identifier of a tracked element; assigned once, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pa-{}", self.0)
    }
}

/// A page element with its overlay control and the cleanup path for both.
pub struct TrackedElement {
    pub id: TrackId,
    /// Weak handle; the page decides when the node dies
    pub element: NodeId,
    pub control: NodeId,
    /// Registered through selector mode / persisted record rather than discovered
    pub manual: bool,
    pub custom_prompt: Option<String>,
    pub carrier: Box<dyn TextCarrier>,
    /// Listeners installed for this control, removed together with it
    pub listeners: Vec<ListenerId>,
    pub busy: bool,
}

impl fmt::Debug for TrackedElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedElement")
            .field("id", &self.id)
            .field("element", &self.element)
            .field("control", &self.control)
            .field("manual", &self.manual)
            .field("listeners", &self.listeners.len())
            .field("busy", &self.busy)
            .finish()
    }
}

/// Owned element <-> control mapping.
#[derive(Debug, Default)]
pub struct OverlayRegistry {
    entries: BTreeMap<TrackId, TrackedElement>,
    by_element: HashMap<NodeId, TrackId>,
    by_control: HashMap<NodeId, TrackId>,
    by_listener: HashMap<ListenerId, TrackId>,
    next_id: u64,
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_id(&mut self) -> TrackId {
        self.next_id += 1;
        TrackId(self.next_id)
    }

    pub fn insert(&mut self, entry: TrackedElement) {
        self.by_element.insert(entry.element, entry.id);
        self.by_control.insert(entry.control, entry.id);
        for listener in &entry.listeners {
            self.by_listener.insert(*listener, entry.id);
        }
        self.entries.insert(entry.id, entry);
    }

    pub fn remove(&mut self, id: TrackId) -> Option<TrackedElement> {
        let entry = self.entries.remove(&id)?;
        self.by_element.remove(&entry.element);
        self.by_control.remove(&entry.control);
        for listener in &entry.listeners {
            self.by_listener.remove(listener);
        }
        Some(entry)
    }

    pub fn get(&self, id: TrackId) -> Option<&TrackedElement> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut TrackedElement> {
        self.entries.get_mut(&id)
    }

    pub fn id_for_element(&self, element: NodeId) -> Option<TrackId> {
        self.by_element.get(&element).copied()
    }

    pub fn id_for_control(&self, control: NodeId) -> Option<TrackId> {
        self.by_control.get(&control).copied()
    }

    pub fn id_for_listener(&self, listener: ListenerId) -> Option<TrackId> {
        self.by_listener.get(&listener).copied()
    }

    pub fn is_tracked(&self, element: NodeId) -> bool {
        self.by_element.contains_key(&element)
    }

    pub fn is_control(&self, node: NodeId) -> bool {
        self.by_control.contains_key(&node)
    }

    pub fn ids(&self) -> Vec<TrackId> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedElement> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
