use thiserror::Error;

use crate::dom::dom_model::NodeId;

#[derive(Debug, Error)]
pub enum DomError {
    /// The node handle no longer refers to a live node (freed by the page)
    #[error("node {0} is no longer part of the page")]
    NodeGone(NodeId),

    /// A selector string could not be parsed
    #[error("invalid selector '{selector}': {reason}")]
    SelectorParse { selector: String, reason: String },

    /// Structural edit that would create a cycle or touch the root
    #[error("invalid tree operation on {node}: {reason}")]
    Hierarchy { node: NodeId, reason: String },

    /// Element cannot carry editable text (no value, not content-editable)
    #[error("<{tag}> cannot hold editable text")]
    NotTextCarrier { tag: String },
}
