use crate::dom::dom_model::{Document, NodeId};

/// Attributes tried in order when the element has no usable id.
pub const IDENTITY_ATTRIBUTES: [&str; 5] = ["name", "data-testid", "aria-label", "placeholder", "role"];

/// Class fragments produced by CSS-in-JS toolchains; such classes change between builds.
const DYNAMIC_CLASS_MARKERS: [&str; 5] = ["css-", "sc-", "jsx-", "emotion-", "__"];

const MAX_STABLE_CLASSES: usize = 2;
const MAX_ANCESTOR_LEVELS: usize = 3;

/// Derive a locator that re-finds `element` after a reload.
///
/// Prefers human-stable identity (id, naming attributes, classes) over
/// position. Never fails: the worst case is a positional chain, which may
/// resolve to nothing or to a different element once the page changes.
pub fn generate_selector(doc: &Document, element: NodeId) -> String {
    let Some(tag) = doc.tag(element) else {
        return String::new();
    };

    if let Some(id) = doc.get_attribute(element, "id") {
        if is_css_safe_id(id) {
            return format!("#{}", id);
        }
    }

    for attr in IDENTITY_ATTRIBUTES {
        if let Some(value) = doc.get_attribute(element, attr) {
            return format!("{}[{}=\"{}\"]", tag, attr, escape_attribute_value(value));
        }
    }

    if tag == "textarea" || tag == "input" {
        let mut selector = tag.to_string();
        if let Some(t) = doc.get_attribute(element, "type") {
            selector.push_str(&format!("[type=\"{}\"]", escape_attribute_value(t)));
        }
        for class in doc
            .classes(element)
            .into_iter()
            .filter(|c| is_stable_class(c))
            .take(MAX_STABLE_CLASSES)
        {
            selector.push('.');
            selector.push_str(class);
        }
        return selector;
    }

    positional_chain(doc, element)
}

/// `^[a-zA-Z0-9_-]+$`
pub fn is_css_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub fn is_stable_class(class: &str) -> bool {
    class.len() >= 3
        && !class.contains("--")
        && !class.chars().any(|c| c.is_ascii_digit())
        && !DYNAMIC_CLASS_MARKERS.iter().any(|m| class.contains(m))
        && class.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

pub fn escape_attribute_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn positional_segment(doc: &Document, node: NodeId) -> String {
    let tag = doc.tag(node).unwrap_or("*");
    match doc.child_position(node) {
        Some(n) => format!("{}:nth-child({})", tag, n),
        None => tag.to_string(),
    }
}

fn positional_chain(doc: &Document, element: NodeId) -> String {
    let mut segments = vec![positional_segment(doc, element)];
    let mut current = doc.parent(element);

    for _ in 0..MAX_ANCESTOR_LEVELS {
        let Some(ancestor) = current else {
            break;
        };
        if ancestor == doc.body() || ancestor == doc.root() {
            segments.push(doc.tag(ancestor).unwrap_or("body").to_string());
            break;
        }
        if let Some(id) = doc.get_attribute(ancestor, "id").filter(|id| is_css_safe_id(id)) {
            segments.push(format!("#{}", id));
            break;
        }
        segments.push(positional_segment(doc, ancestor));
        current = doc.parent(ancestor);
    }

    segments.reverse();
    segments.join(" > ")
}
