#![allow(dead_code)]

use std::rc::Rc;

use page_assist::completion::client::ReplayBackend;
use page_assist::dom::dom_model::{Document, NodeId, Rect};
use page_assist::settings::store::{MemoryStore, StoreMap};
use serde_json::{Value, json};

pub const PAGE_URL: &str = "https://example.com/compose";
pub const DOMAIN: &str = "example.com";

pub fn page() -> Document {
    Document::new(PAGE_URL)
}

/// Create an element with attributes and append it under `parent`.
pub fn element(doc: &mut Document, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
    let node = doc.create_element(tag);
    for (name, value) in attrs {
        doc.set_attribute(node, name, value).unwrap();
    }
    doc.append_child(parent, node).unwrap();
    node
}

/// A 300x100 textarea at (200, 50) directly under body.
pub fn textarea(doc: &mut Document, id: &str) -> NodeId {
    let body = doc.body();
    let node = element(doc, body, "textarea", &[("id", id)]);
    doc.set_rect(node, Rect::new(200.0, 50.0, 300.0, 100.0)).unwrap();
    node
}

pub fn values(value: Value) -> StoreMap {
    value.as_object().cloned().unwrap_or_default()
}

pub fn store_with(value: Value) -> Rc<MemoryStore> {
    Rc::new(MemoryStore::with_values(values(value)))
}

/// Credentials set, no selectors.
pub fn configured_store() -> Rc<MemoryStore> {
    store_with(json!({ "apiKey": "sk-test", "model": "gpt-test" }))
}

/// Credentials plus one record for `selector` on the test page.
pub fn store_with_selector(selector: &str) -> Rc<MemoryStore> {
    store_with(json!({
        "apiKey": "sk-test",
        "model": "gpt-test",
        "domainSelectors": {
            (DOMAIN): [{ "selector": selector, "url": PAGE_URL }]
        }
    }))
}

/// One SSE record carrying `text` as a content delta.
pub fn sse_record(text: &str) -> String {
    let chunk = json!({ "choices": [{ "delta": { "content": text } }] });
    format!("data: {}\n\n", chunk)
}

/// Full streamed body: one record per fragment, then the sentinel.
pub fn sse_body(fragments: &[&str]) -> String {
    let mut body: String = fragments.iter().map(|f| sse_record(f)).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

pub fn replay(fragments: &[&str]) -> ReplayBackend {
    ReplayBackend::new(fragments.iter().map(|f| sse_record(f)))
}
