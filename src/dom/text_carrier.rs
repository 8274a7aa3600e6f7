use crate::dom::dom_model::{Document, NodeId};
use crate::dom::error::DomError;

/// Read/write access to the editable text of one element.
///
/// The concrete carrier is chosen once, when the element is registered.
pub trait TextCarrier {
    fn element(&self) -> NodeId;
    fn read(&self, doc: &Document) -> String;
    fn write(&self, doc: &mut Document, text: &str) -> Result<(), DomError>;
    fn scroll_to_end(&self, doc: &mut Document) -> Result<(), DomError>;
}

/// `textarea` and `input` elements: text lives in the control's value.
#[derive(Debug, Clone, Copy)]
pub struct InputCarrier {
    node: NodeId,
}

/// Content-editable hosts: text lives in the element's text content.
///
/// Writing replaces the element's children with a single text run, so a
/// rollback restores the original text but not its markup.
#[derive(Debug, Clone, Copy)]
pub struct EditableCarrier {
    node: NodeId,
}

impl TextCarrier for InputCarrier {
    fn element(&self) -> NodeId {
        self.node
    }

    fn read(&self, doc: &Document) -> String {
        doc.value(self.node).unwrap_or_default().to_string()
    }

    fn write(&self, doc: &mut Document, text: &str) -> Result<(), DomError> {
        doc.set_value(self.node, text)
    }

    fn scroll_to_end(&self, doc: &mut Document) -> Result<(), DomError> {
        let height = doc.scroll_height(self.node);
        doc.set_scroll_top(self.node, height)
    }
}

impl TextCarrier for EditableCarrier {
    fn element(&self) -> NodeId {
        self.node
    }

    fn read(&self, doc: &Document) -> String {
        doc.text_content(self.node)
    }

    fn write(&self, doc: &mut Document, text: &str) -> Result<(), DomError> {
        doc.set_text_content(self.node, text)
    }

    fn scroll_to_end(&self, doc: &mut Document) -> Result<(), DomError> {
        let height = doc.scroll_height(self.node);
        doc.set_scroll_top(self.node, height)
    }
}

pub fn is_content_editable(doc: &Document, node: NodeId) -> bool {
    matches!(
        doc.get_attribute(node, "contenteditable"),
        Some(v) if !v.eq_ignore_ascii_case("false")
    )
}

/// Probe the element's capabilities and pick a carrier for it.
pub fn carrier_for(doc: &Document, node: NodeId) -> Result<Box<dyn TextCarrier>, DomError> {
    let tag = doc.tag(node).ok_or(DomError::NodeGone(node))?;
    match tag {
        "textarea" | "input" => Ok(Box::new(InputCarrier { node })),
        _ if is_content_editable(doc, node) => Ok(Box::new(EditableCarrier { node })),
        other => Err(DomError::NotTextCarrier { tag: other.to_string() }),
    }
}
