use std::collections::BTreeMap;
use std::fmt;

use crate::dom::error::DomError;
use crate::dom::query::Selector;

/// Approximate rendered line height, used to derive `scroll_height`.
pub const LINE_HEIGHT: f64 = 16.0;

// ============================================================================
// Handles
// ============================================================================

/// Weak handle to a page node.
///
/// A generational index: once the page frees the node, the slot's generation
/// moves on and the handle stops resolving. Holding a `NodeId` never keeps a
/// node alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTarget {
    Window,
    Document,
    Node(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Scroll,
    Resize,
    Click,
    MouseOver,
    MouseOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Listener {
    pub target: EventTarget,
    pub kind: EventKind,
    pub capture: bool,
}

/// One child-list change, as a mutation observer would report it.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

// ============================================================================
// Nodes
// ============================================================================

/// Layout box in document coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Rect { top, left, width, height }
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    pub tag: String,
    attributes: Vec<(String, String)>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Form-control value (`input`, `textarea`)
    value: String,
    /// Own text, excluding descendants
    text: String,
    rect: Rect,
    style: BTreeMap<String, String>,
    scroll_top: f64,
    scroll_height: f64,
}

impl Element {
    fn new(tag: &str) -> Self {
        Element {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            parent: None,
            children: Vec::new(),
            value: String::new(),
            text: String::new(),
            rect: Rect::default(),
            style: BTreeMap::new(),
            scroll_top: 0.0,
            scroll_height: 0.0,
        }
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    element: Option<Element>,
}

// ============================================================================
// Document
// ============================================================================

/// In-process model of the host page.
///
/// Node lifetime belongs to the page: `remove` frees a subtree, `detach`
/// only unlinks it. Child-list edits are queued as `MutationRecord`s until
/// the host drains them with `take_mutations`.
#[derive(Debug)]
pub struct Document {
    url: String,
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    body: NodeId,
    scroll_x: f64,
    scroll_y: f64,
    listeners: BTreeMap<ListenerId, Listener>,
    next_listener: u64,
    mutations: Vec<MutationRecord>,
}

impl Document {
    pub fn new(url: &str) -> Self {
        let mut doc = Document {
            url: url.to_string(),
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId { index: 0, generation: 0 },
            body: NodeId { index: 0, generation: 0 },
            scroll_x: 0.0,
            scroll_y: 0.0,
            listeners: BTreeMap::new(),
            next_listener: 1,
            mutations: Vec::new(),
        };

        let root = doc.create_element("html");
        let body = doc.create_element("body");
        if let Some(el) = doc.element_mut(body) {
            el.parent = Some(root);
        }
        if let Some(el) = doc.element_mut(root) {
            el.children.push(body);
        }
        doc.root = root;
        doc.body = body;
        doc
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: &str) {
        self.url = url.to_string();
    }

    /// Host part of the page URL, used to key persisted selector records.
    pub fn domain(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    // ---- node storage ----

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let element = Element::new(tag);
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.element = Some(element);
                NodeId { index, generation: slot.generation }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot { generation: 0, element: Some(element) });
                NodeId { index, generation: 0 }
            }
        }
    }

    /// True while the handle still refers to a live node (attached or not).
    pub fn contains(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.element.as_ref())
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.element.as_mut())
    }

    fn live_mut(&mut self, id: NodeId) -> Result<&mut Element, DomError> {
        self.element_mut(id).ok_or(DomError::NodeGone(id))
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    // ---- attributes ----

    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.get_attribute(id, name).is_some()
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let el = self.live_mut(id)?;
        match el.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => el.attributes.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> bool {
        match self.element_mut(id) {
            Some(el) => {
                let before = el.attributes.len();
                el.attributes.retain(|(k, _)| k != name);
                el.attributes.len() != before
            }
            None => false,
        }
    }

    pub fn classes(&self, id: NodeId) -> Vec<&str> {
        self.get_attribute(id, "class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    // ---- tree ----

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.element(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.element(id).map(|el| el.children.as_slice()).unwrap_or(&[])
    }

    /// 1-based position among siblings, as used by `:nth-child`.
    pub fn child_position(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent)
            .iter()
            .position(|c| *c == id)
            .map(|p| p + 1)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        if !self.contains(parent) {
            return Err(DomError::NodeGone(parent));
        }
        if !self.contains(child) {
            return Err(DomError::NodeGone(child));
        }
        if child == self.root || self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::Hierarchy {
                node: child,
                reason: "cannot insert a node into itself or its descendants".into(),
            });
        }

        self.unlink(child);
        self.live_mut(child)?.parent = Some(parent);
        self.live_mut(parent)?.children.push(child);
        self.mutations.push(MutationRecord {
            target: parent,
            added: vec![child],
            removed: vec![],
        });
        Ok(())
    }

    /// Unlink a node from its parent; the node stays alive and can be re-attached.
    pub fn detach(&mut self, id: NodeId) -> Result<(), DomError> {
        if !self.contains(id) {
            return Err(DomError::NodeGone(id));
        }
        if id == self.root {
            return Err(DomError::Hierarchy { node: id, reason: "cannot detach the root".into() });
        }
        self.unlink(id);
        Ok(())
    }

    /// Unlink and free a node with its whole subtree.
    pub fn remove(&mut self, id: NodeId) -> Result<(), DomError> {
        self.detach(id)?;
        self.free_subtree(id);
        Ok(())
    }

    fn unlink(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(p) = self.element_mut(parent) {
            p.children.retain(|c| *c != id);
        }
        if let Some(el) = self.element_mut(id) {
            el.parent = None;
        }
        self.mutations.push(MutationRecord {
            target: parent,
            added: vec![],
            removed: vec![id],
        });
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(slot) = self.slots.get_mut(current.index as usize) else {
                continue;
            };
            if slot.generation != current.generation {
                continue;
            }
            if let Some(el) = slot.element.take() {
                stack.extend(el.children);
            }
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(current.index);
        }
    }

    /// Liveness check: the node exists and its ancestor chain reaches the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if !self.contains(current) {
                return false;
            }
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(p) => current = p,
                None => return false,
            }
        }
    }

    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// `from` and its subtree in document order.
    pub fn descendants(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if !self.contains(id) {
                continue;
            }
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    // ---- text ----

    pub fn value(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.value.as_str())
    }

    pub fn set_value(&mut self, id: NodeId, value: &str) -> Result<(), DomError> {
        let el = self.live_mut(id)?;
        el.value = value.to_string();
        el.scroll_height = content_height(value, el.rect.height);
        Ok(())
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let Some(el) = self.element(node) {
                out.push_str(&el.text);
            }
        }
        out
    }

    /// Replace all children with a single run of text.
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> Result<(), DomError> {
        let children = self.live_mut(id)?.children.clone();
        for child in children {
            self.remove(child)?;
        }
        let el = self.live_mut(id)?;
        el.text = text.to_string();
        el.scroll_height = content_height(text, el.rect.height);
        Ok(())
    }

    // ---- layout & style ----

    pub fn rect(&self, id: NodeId) -> Option<Rect> {
        self.element(id).map(|el| el.rect)
    }

    pub fn set_rect(&mut self, id: NodeId, rect: Rect) -> Result<(), DomError> {
        self.live_mut(id)?.rect = rect;
        Ok(())
    }

    /// Viewport-relative box, like `getBoundingClientRect`.
    pub fn bounding_client_rect(&self, id: NodeId) -> Option<Rect> {
        self.rect(id).map(|r| Rect {
            top: r.top - self.scroll_y,
            left: r.left - self.scroll_x,
            ..r
        })
    }

    pub fn scroll_offset(&self) -> (f64, f64) {
        (self.scroll_x, self.scroll_y)
    }

    pub fn scroll_window_to(&mut self, x: f64, y: f64) {
        self.scroll_x = x;
        self.scroll_y = y;
    }

    pub fn style(&self, id: NodeId, property: &str) -> Option<&str> {
        self.element(id)?.style.get(property).map(|s| s.as_str())
    }

    pub fn set_style(&mut self, id: NodeId, property: &str, value: &str) -> Result<(), DomError> {
        self.live_mut(id)?
            .style
            .insert(property.to_string(), value.to_string());
        Ok(())
    }

    pub fn remove_style(&mut self, id: NodeId, property: &str) -> Option<String> {
        self.element_mut(id)?.style.remove(property)
    }

    pub fn scroll_top(&self, id: NodeId) -> f64 {
        self.element(id).map(|el| el.scroll_top).unwrap_or(0.0)
    }

    pub fn scroll_height(&self, id: NodeId) -> f64 {
        self.element(id).map(|el| el.scroll_height).unwrap_or(0.0)
    }

    pub fn set_scroll_top(&mut self, id: NodeId, top: f64) -> Result<(), DomError> {
        let el = self.live_mut(id)?;
        el.scroll_top = top.clamp(0.0, el.scroll_height.max(0.0));
        Ok(())
    }

    // ---- listeners ----

    pub fn add_event_listener(&mut self, target: EventTarget, kind: EventKind, capture: bool) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.insert(id, Listener { target, kind, capture });
        id
    }

    pub fn remove_event_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub fn listener(&self, id: ListenerId) -> Option<&Listener> {
        self.listeners.get(&id)
    }

    /// Listeners for a target and event, capturing listeners first.
    pub fn listeners_for(&self, target: EventTarget, kind: EventKind) -> Vec<ListenerId> {
        let mut matched: Vec<(bool, ListenerId)> = self
            .listeners
            .iter()
            .filter(|(_, l)| l.target == target && l.kind == kind)
            .map(|(id, l)| (!l.capture, *id))
            .collect();
        matched.sort();
        matched.into_iter().map(|(_, id)| id).collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // ---- mutations & queries ----

    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.mutations)
    }

    pub fn pending_mutations(&self) -> usize {
        self.mutations.len()
    }

    pub fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, DomError> {
        let parsed = Selector::parse(selector)?;
        Ok(self
            .descendants(self.root)
            .into_iter()
            .find(|id| parsed.matches(self, *id)))
    }

    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let parsed = Selector::parse(selector)?;
        Ok(self
            .descendants(self.root)
            .into_iter()
            .filter(|id| parsed.matches(self, *id))
            .collect())
    }
}

fn content_height(text: &str, box_height: f64) -> f64 {
    let lines = text.lines().count().max(1) as f64;
    (lines * LINE_HEIGHT).max(box_height)
}
